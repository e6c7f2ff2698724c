/// Checks if a host matches an allow-list pattern
///
/// `example.gov` matches only that host. `*.example.gov` matches the bare
/// domain and any subdomain at any depth.
///
/// # Examples
///
/// ```
/// use spider_walker::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.gov", "example.gov"));
/// assert!(matches_wildcard("*.example.gov", "example.gov"));
/// assert!(matches_wildcard("*.example.gov", "api.v2.example.gov"));
/// assert!(!matches_wildcard("*.example.gov", "badexample.gov"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}
