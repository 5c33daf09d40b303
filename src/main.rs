mod telemetry;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, WrapErr};

use revguard_compliance::ViolationSummary;
use revguard_core::{AuditConfig, OutputFormat, RepoRef};
use revguard_evidence::ErambaClient;
use revguard_report::summary::ReportSummary;
use revguard_report::PdfReportRenderer;
use revguard_runner::{AuditRunner, RunObserver, RunOptions, RunState};
use revguard_source::github::GitHubSource;

const CONFIG_FILE: &str = ".revguard.toml";

/// Exit code of `check --fail-on-violation` when violations exist.
const EXIT_VIOLATIONS: i32 = 2;

#[derive(Parser)]
#[command(
    name = "revguard",
    version,
    about = "Merged pull request approval audit",
    long_about = "revguard checks that every merged pull request was approved by someone other\n\
                   than its author, renders a PDF compliance report, and files the results as\n\
                   evidence on an Eramba GRC control.\n\n\
                   Examples:\n  \
                     revguard check --repo acme/api         List self-approved merges\n  \
                     revguard report --output-dir out       Render the PDF report only\n  \
                     revguard run                           Full audit with evidence upload\n  \
                     revguard run --dry-run                 Full audit without uploading\n  \
                     revguard doctor                        Check configuration and credentials"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .revguard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full audit and submit evidence
    #[command(long_about = "Run the full audit and submit evidence.\n\n\
        Lists merged pull requests, classifies each by its reviews, renders the PDF\n\
        report, uploads it to the GRC control, then files one record per violation.\n\
        Exits 0 when everything was accepted, 1 on a fatal error, 2 when at least one\n\
        evidence submission was rejected.\n\n\
        Examples:\n  revguard run\n  revguard run --repo acme/api --control-id CTRL-42\n  revguard run --dry-run --output-dir reports")]
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Control to file evidence under (overrides ERAMBA_CONTROL_ID)
        #[arg(long)]
        control_id: Option<String>,

        /// Directory for the PDF report
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Render the report but do not submit evidence
        #[arg(long)]
        dry_run: bool,
    },
    /// List merged pull requests without external approval
    #[command(long_about = "List merged pull requests without external approval.\n\n\
        Nothing is rendered or submitted.\n\n\
        Examples:\n  revguard check --repo acme/api\n  revguard check --fail-on-violation --format json")]
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// Exit with code 2 if any violation is found
        #[arg(long)]
        fail_on_violation: bool,
    },
    /// Render the PDF report without submitting evidence
    Report {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory for the PDF report
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Create a default .revguard.toml configuration file
    #[command(long_about = "Create a default .revguard.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .revguard.toml already exists.")]
    Init,
    /// Check configuration and credentials
    #[command(long_about = "Check configuration and credentials.\n\n\
        Reports the config file, repository, GitHub token, Eramba URL and token,\n\
        control id, and output directory. No network calls are made.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Flags that pick what to audit.
#[derive(Args)]
struct TargetArgs {
    /// Repository to audit, as owner/repo (overrides GITHUB_OWNER/GITHUB_REPO)
    #[arg(long)]
    repo: Option<RepoRef>,

    /// Stop listing after this many pages and mark the result truncated
    #[arg(long)]
    max_pages: Option<u32>,
}

impl TargetArgs {
    fn apply(&self, config: &mut AuditConfig) {
        if let Some(repo) = &self.repo {
            config.github.owner = Some(repo.owner.clone());
            config.github.repo = Some(repo.repo.clone());
        }
        if self.max_pages.is_some() {
            config.github.max_pages = self.max_pages;
        }
    }
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mrevguard\x1b[0m v{version} — no change should be approved only by its author\n");

        println!("Quick start:");
        println!("  \x1b[36mrevguard init\x1b[0m                 Create a .revguard.toml config file");
        println!("  \x1b[36mrevguard check\x1b[0m                List self-approved merges");
        println!("  \x1b[36mrevguard run --dry-run\x1b[0m        Render the report without uploading\n");

        println!("All commands:");
        println!("  \x1b[32mrun\x1b[0m       Full audit: evaluate, report, submit evidence");
        println!("  \x1b[32mcheck\x1b[0m     Evaluate and list violations");
        println!("  \x1b[32mreport\x1b[0m    Evaluate and render the PDF report");
        println!("  \x1b[32mdoctor\x1b[0m    Check configuration and credentials");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("revguard v{version} — no change should be approved only by its author\n");

        println!("Quick start:");
        println!("  revguard init                 Create a .revguard.toml config file");
        println!("  revguard check                List self-approved merges");
        println!("  revguard run --dry-run        Render the report without uploading\n");

        println!("All commands:");
        println!("  run       Full audit: evaluate, report, submit evidence");
        println!("  check     Evaluate and list violations");
        println!("  report    Evaluate and render the PDF report");
        println!("  doctor    Check configuration and credentials");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'revguard <command> --help' for details.");
}

/// Config file, then environment (including `.env`), then flags.
fn load_config(path: Option<&Path>) -> Result<(AuditConfig, Option<PathBuf>)> {
    let (mut config, source) = match path {
        Some(path) => (
            AuditConfig::from_file(path).wrap_err(format!("loading {}", path.display()))?,
            Some(path.to_path_buf()),
        ),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                (
                    AuditConfig::from_file(default_path)?,
                    Some(default_path.to_path_buf()),
                )
            } else {
                (AuditConfig::default(), None)
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok((config, source))
}

/// Drives a spinner from runner progress when stderr is a terminal.
struct ProgressObserver {
    spinner: Option<indicatif::ProgressBar>,
}

impl ProgressObserver {
    fn new() -> Self {
        let spinner = std::io::stderr().is_terminal().then(|| {
            let pb = indicatif::ProgressBar::new_spinner();
            if let Ok(style) =
                indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        Self { spinner }
    }

    fn finish(&self) {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
    }
}

/// Console line for a stage, `None` for terminal states.
fn stage_message(state: RunState) -> Option<&'static str> {
    match state {
        RunState::Fetching => Some("Fetching merged pull requests..."),
        RunState::Evaluating => Some("Fetching reviews..."),
        RunState::Rendering => Some("Rendering report..."),
        RunState::Submitting => Some("Submitting evidence..."),
        RunState::Done | RunState::Failed => None,
    }
}

impl RunObserver for ProgressObserver {
    fn on_state(&self, state: RunState) {
        match (&self.spinner, stage_message(state)) {
            (Some(pb), Some(message)) => pb.set_message(message),
            (Some(pb), None) => pb.finish_and_clear(),
            (None, Some(message)) => eprintln!("{message}"),
            (None, None) => {}
        }
    }

    fn on_reviews_fetched(&self, done: usize, total: usize) {
        match &self.spinner {
            Some(pb) => pb.set_message(format!("Fetching reviews ({done}/{total})...")),
            None if done == total => eprintln!("Fetched reviews for {total} pull requests"),
            None => {}
        }
    }

    fn on_submission(&self, subject: &str, ok: bool) {
        if ok {
            return;
        }
        let line = format!("  failed to submit {subject}");
        match &self.spinner {
            Some(pb) => pb.println(line),
            None => eprintln!("{line}"),
        }
    }
}

fn build_runner(
    config: &AuditConfig,
    dry_run: bool,
    observer: Arc<ProgressObserver>,
) -> Result<AuditRunner> {
    let source = Arc::new(GitHubSource::new(&config.github)?);
    let renderer = Arc::new(PdfReportRenderer::new(&config.report));
    let started_at = Utc::now();
    let runner = AuditRunner::new(source, renderer, RunOptions::from_config(config, dry_run))
        .with_observer(observer)
        .with_run_started_at(started_at);
    if dry_run {
        return Ok(runner);
    }
    config.validate_for_submission()?;
    let sink = ErambaClient::new(&config.grc)?.with_run_started_at(started_at);
    Ok(runner.with_sink(Arc::new(sink)))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput<'a> {
    repo: String,
    summary: &'a ReportSummary,
    violations: &'a [ViolationSummary],
}

fn print_check(
    repo: &RepoRef,
    summary: &ReportSummary,
    violations: &[ViolationSummary],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = CheckOutput {
                repo: repo.to_string(),
                summary,
                violations,
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            print!("{}", summary.to_markdown(violations));
        }
        OutputFormat::Text => {
            if violations.is_empty() {
                println!("All merged PRs had proper approvals.");
            } else {
                println!(
                    "Found {} merged PRs without external approval:",
                    violations.len()
                );
                for v in violations {
                    println!("- {v} with no external approval");
                }
            }
            println!("\n{summary}");
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn doctor_checks(config: &AuditConfig, config_path: Option<&Path>) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    match config_path {
        Some(path) => checks.push(CheckResult::pass(
            "config_file",
            format!("loaded {}", path.display()),
        )),
        None => checks.push(CheckResult::info(
            "config_file",
            format!("no {CONFIG_FILE}; using defaults and environment"),
        )),
    }

    match config.repo_ref() {
        Ok(repo) => checks.push(CheckResult::pass("repository", repo.to_string())),
        Err(_) => checks.push(CheckResult::fail(
            "repository",
            "not configured",
            "set GITHUB_OWNER and GITHUB_REPO, [github] owner/repo, or pass --repo owner/repo",
        )),
    }

    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "not set",
            "export GITHUB_TOKEN=ghp_... (public repositories work without it, at a low rate limit)",
        ));
    }

    checks.push(CheckResult::info(
        "github_api",
        format!(
            "{} ({} per page, {})",
            config.github.api_url,
            config.github.effective_per_page(),
            match config.github.max_pages {
                Some(max) => format!("at most {max} pages"),
                None => "all pages".into(),
            }
        ),
    ));

    if config.grc.api_token.is_some() {
        checks.push(CheckResult::pass("eramba_token", "ERAMBA_API_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "eramba_token",
            "not set",
            "export ERAMBA_API_TOKEN=... (not needed for check, report, or run --dry-run)",
        ));
    }

    match config.validate_for_submission() {
        Err(e) if config.grc.api_token.is_some() => checks.push(CheckResult::fail(
            "eramba",
            e.to_string(),
            "set ERAMBA_URL and ERAMBA_CONTROL_ID",
        )),
        _ => checks.push(CheckResult::info(
            "eramba",
            format!("{} control {}", config.grc.url, config.grc.control_id),
        )),
    }

    let output_dir = &config.report.output_dir;
    if output_dir.is_dir() {
        checks.push(CheckResult::pass(
            "output_dir",
            format!("{} exists", output_dir.display()),
        ));
    } else if output_dir.exists() {
        checks.push(CheckResult::fail(
            "output_dir",
            format!("{} is not a directory", output_dir.display()),
            "set [report] output_dir or pass --output-dir",
        ));
    } else {
        checks.push(CheckResult::info(
            "output_dir",
            format!("{} will be created", output_dir.display()),
        ));
    }

    checks
}

fn run_doctor(
    config: &AuditConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let checks = doctor_checks(config, config_path);

    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("revguard v{version} — Configuration Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# revguard configuration
# Environment variables (and a .env file) override these values;
# command-line flags override both.

[github]
# owner = "acme"                       # GITHUB_OWNER
# repo = "api"                         # GITHUB_REPO
# per_page = 50                        # GITHUB_PER_PAGE, 1-100
# api_url = "https://api.github.com"   # GITHUB_API_URL
# max_pages = 20                       # unset = read every page
# timeout_secs = 30
# concurrency = 4                      # parallel review fetches
# The token is read from GITHUB_TOKEN; keep it out of this file.

[grc]
# url = "https://eramba.company.com"   # ERAMBA_URL
# control_id = "CTRL-1234"             # ERAMBA_CONTROL_ID
# source = "Erambot"
# timeout_secs = 30
# max_retries = 2
# backoff_base_ms = 500
# The token is read from ERAMBA_API_TOKEN; keep it out of this file.

[report]
# output_dir = "."
# pdf_name = "pr_compliance_report.pdf"
# chart_name = "pr_compliance_pie.png"
# keep_chart = false
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, telemetry::level_for(cli.verbose));

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Run {
            ref target,
            ref control_id,
            ref output_dir,
            dry_run,
        }) => {
            let (mut config, _) = load_config(cli.config.as_deref())?;
            target.apply(&mut config);
            if let Some(control_id) = control_id {
                config.grc.control_id = control_id.clone();
            }
            if let Some(dir) = output_dir {
                config.report.output_dir = dir.clone();
            }
            let repo = config.repo_ref()?;

            let observer = Arc::new(ProgressObserver::new());
            let runner = build_runner(&config, dry_run, observer.clone())?;
            let outcome = runner.run(&repo).await;
            observer.finish();

            let code = outcome.exit_code();
            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&outcome.summary).into_diagnostic()?
                    );
                }
                OutputFormat::Markdown | OutputFormat::Text => {
                    if let Some(err) = outcome.error {
                        return Err(err.into());
                    }
                    if cli.format == OutputFormat::Markdown {
                        print!("{}", outcome.summary.to_markdown());
                    } else {
                        print!("{}", outcome.summary);
                    }
                }
            }
            if code != 0 {
                std::process::exit(code);
            }
        }
        Some(Command::Check {
            ref target,
            fail_on_violation,
        }) => {
            let (mut config, _) = load_config(cli.config.as_deref())?;
            target.apply(&mut config);
            let repo = config.repo_ref()?;

            let observer = Arc::new(ProgressObserver::new());
            let runner = build_runner(&config, true, observer.clone())?;
            let result = runner.evaluate(&repo).await;
            observer.finish();
            let result = result?;

            let summary = ReportSummary::from_result(&result);
            let violations = ViolationSummary::all(&result);
            print_check(&repo, &summary, &violations, cli.format)?;

            if fail_on_violation && !violations.is_empty() {
                std::process::exit(EXIT_VIOLATIONS);
            }
        }
        Some(Command::Report {
            ref target,
            ref output_dir,
        }) => {
            let (mut config, _) = load_config(cli.config.as_deref())?;
            target.apply(&mut config);
            if let Some(dir) = output_dir {
                config.report.output_dir = dir.clone();
            }
            let repo = config.repo_ref()?;

            let observer = Arc::new(ProgressObserver::new());
            let runner = build_runner(&config, true, observer.clone())?;
            let outcome = runner.run(&repo).await;
            observer.finish();

            if let Some(err) = outcome.error {
                return Err(err.into());
            }
            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&outcome.summary).into_diagnostic()?
                    );
                }
                OutputFormat::Markdown => print!("{}", outcome.summary.to_markdown()),
                OutputFormat::Text => print!("{}", outcome.summary),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_doctor(&config, path.as_deref(), cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "revguard", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_working_stage_has_a_console_line() {
        for state in [
            RunState::Fetching,
            RunState::Evaluating,
            RunState::Rendering,
            RunState::Submitting,
        ] {
            assert!(stage_message(state).is_some(), "{state}");
        }
        assert_eq!(stage_message(RunState::Done), None);
        assert_eq!(stage_message(RunState::Failed), None);
    }

    #[test]
    fn default_config_parses_to_defaults() {
        let config = AuditConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.github.per_page, 50);
        assert_eq!(config.grc.control_id, "CTRL-1234");
        assert!(!config.report.keep_chart);
    }

    #[test]
    fn repo_flag_overrides_config() {
        let cli = Cli::try_parse_from([
            "revguard",
            "check",
            "--repo",
            "acme/api",
            "--max-pages",
            "3",
        ])
        .unwrap();
        let Some(Command::Check { target, .. }) = cli.command else {
            panic!("expected check");
        };
        let mut config = AuditConfig::default();
        config.github.owner = Some("other".into());
        target.apply(&mut config);
        assert_eq!(config.repo_ref().unwrap(), RepoRef::new("acme", "api"));
        assert_eq!(config.github.max_pages, Some(3));
    }

    #[test]
    fn malformed_repo_flag_is_rejected() {
        assert!(Cli::try_parse_from(["revguard", "check", "--repo", "acme"]).is_err());
    }

    #[test]
    fn doctor_flags_missing_credentials() {
        let checks = doctor_checks(&AuditConfig::default(), None);
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| c.status == "fail")
            .map(|c| c.name)
            .collect();
        assert!(failed.contains(&"repository"));
        assert!(failed.contains(&"github_token"));
        assert!(failed.contains(&"eramba_token"));
    }
}
