use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_revguard"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "revguard init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".revguard.toml");
    assert!(config_path.exists(), ".revguard.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[github]"));
    assert!(content.contains("[grc]"));
    assert!(content.contains("[report]"));

    let config: revguard_core::AuditConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.grc.control_id, "CTRL-1234");
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".revguard.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_revguard"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".revguard.toml")).unwrap();
    assert_eq!(content, "# existing");
}
