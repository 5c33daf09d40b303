//! RFC 5988 `Link` header handling for GitHub list endpoints.

/// Extract the `rel="next"` target from a `Link` header value.
///
/// Returns `None` on the last page or when the header is malformed.
///
/// # Examples
///
/// ```
/// use revguard_source::pagination::next_link;
///
/// let header = r#"<https://api.github.com/repositories/1/pulls?page=2>; rel="next", <https://api.github.com/repositories/1/pulls?page=5>; rel="last""#;
/// assert_eq!(
///     next_link(header).as_deref(),
///     Some("https://api.github.com/repositories/1/pulls?page=2")
/// );
/// ```
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            let Some((key, value)) = param.trim().split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel == "next")
        });
        (is_next && !url.is_empty()).then(|| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_has_no_next() {
        let header = r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=1>; rel="first""#;
        assert_eq!(next_link(header), None);
    }

    #[test]
    fn next_in_middle_of_header() {
        let header = r#"<https://h/x?page=1>; rel="prev", <https://h/x?page=3>; rel="next", <https://h/x?page=9>; rel="last""#;
        assert_eq!(next_link(header).as_deref(), Some("https://h/x?page=3"));
    }

    #[test]
    fn unquoted_rel_is_accepted() {
        let header = "<https://h/x?page=2>; rel=next";
        assert_eq!(next_link(header).as_deref(), Some("https://h/x?page=2"));
    }

    #[test]
    fn malformed_header_yields_none() {
        assert_eq!(next_link(""), None);
        assert_eq!(next_link("garbage"), None);
        assert_eq!(next_link("https://h/x; rel=\"next\""), None);
    }
}
