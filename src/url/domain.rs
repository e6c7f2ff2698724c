use std::net::IpAddr;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use spider_walker::url::extract_domain;
///
/// let url = Url::parse("https://Data.Example.GOV/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("data.example.gov".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Reduces a host to its registrable domain
///
/// The public suffix list decides where the suffix ends, so `www.example.gov`,
/// `data.example.gov` and `example.gov` compare equal while `a.github.io` and
/// `b.github.io` stay apart. IP addresses are returned unchanged, and hosts
/// with no listed registrable part (`localhost`) are kept whole.
///
/// # Examples
///
/// ```
/// use spider_walker::url::registrable_domain;
///
/// assert_eq!(registrable_domain("www.example.gov"), "example.gov");
/// assert_eq!(registrable_domain("data.ons.gov.uk"), "ons.gov.uk");
/// assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    match psl::domain_str(&host) {
        Some(domain) => domain.to_string(),
        None => host,
    }
}

/// Returns the registrable domain of a URL's host
pub fn url_registrable_domain(url: &Url) -> Option<String> {
    url.host_str().map(registrable_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain_lowercases() {
        let url = Url::parse("https://EXAMPLE.GOV/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.gov".to_string()));
    }

    #[test]
    fn test_extract_domain_ignores_port() {
        let url = Url::parse("https://example.gov:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.gov".to_string()));
    }

    #[test]
    fn test_registrable_strips_subdomains() {
        assert_eq!(registrable_domain("example.gov"), "example.gov");
        assert_eq!(registrable_domain("www.example.gov"), "example.gov");
        assert_eq!(registrable_domain("a.b.example.gov"), "example.gov");
    }

    #[test]
    fn test_registrable_country_suffix() {
        assert_eq!(registrable_domain("www.gov.uk"), "www.gov.uk");
        assert_eq!(registrable_domain("ons.gov.uk"), "ons.gov.uk");
        assert_eq!(registrable_domain("www.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(registrable_domain("abs.gov.au"), "abs.gov.au");
    }

    #[test]
    fn test_registrable_deep_public_suffix() {
        assert_ne!(
            registrable_domain("ci.boston.ma.us"),
            registrable_domain("www.cambridge.ma.us")
        );
        assert_ne!(registrable_domain("ci.boston.ma.us"), "ma.us");
    }

    #[test]
    fn test_registrable_private_suffix() {
        assert_eq!(registrable_domain("a.github.io"), "a.github.io");
        assert_ne!(
            registrable_domain("a.github.io"),
            registrable_domain("b.github.io")
        );
        assert_eq!(registrable_domain("docs.a.github.io"), "a.github.io");
    }

    #[test]
    fn test_registrable_ip_and_localhost() {
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn test_url_registrable_domain() {
        let url = Url::parse("https://www.example.gov/page").unwrap();
        assert_eq!(url_registrable_domain(&url), Some("example.gov".to_string()));
    }
}
