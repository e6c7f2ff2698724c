//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with transparent, bounded redirect following
//! - Error classification into network, HTTP and rate-limit failures
//! - Backoff computation for rate-limited targets

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::FetchTarget;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// A successfully fetched resource
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// The URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    /// Content-Type header value, empty when absent
    pub content_type: String,
    /// Response headers, lowercase names
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// Ways a fetch can fail
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout, TLS, redirect or body read failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success status other than 429
    #[error("HTTP error {status}")]
    HttpError { status: u16 },

    /// HTTP 429, with the server's Retry-After if it sent one
    #[error("Too many requests (retry after {retry_after:?})")]
    TooManyRequests { retry_after: Option<Duration> },
}

impl FetchError {
    /// Short label used to group errors in the run summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::HttpError { .. } => "http_error",
            Self::TooManyRequests { .. } => "too_many_requests",
        }
    }
}

/// Fetches one target
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedResource, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Timeout and redirect limits
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use spider_walker::config::{CrawlerConfig, UserAgentConfig};
/// use spider_walker::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "SpiderWalker".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let agent = format!(
        "{}/{} (+{}; {})",
        user_agent.crawler_name,
        user_agent.crawler_version,
        user_agent.contact_url,
        user_agent.contact_email
    );

    Client::builder()
        .user_agent(agent)
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(crawler.redirect_limit as usize))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses a Retry-After header given either as seconds or as an HTTP date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = when.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Delay before retry number `attempt` (0-based)
///
/// Uses the server's Retry-After when given, otherwise `base * 2^attempt`;
/// either way capped at `max`.
pub fn backoff_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let delay = retry_after.unwrap_or_else(|| {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        base.saturating_mul(factor)
    });
    delay.min(max)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn classify_reqwest_error(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network("Request timeout".to_string())
    } else if e.is_redirect() {
        FetchError::Network(format!("Redirect error: {}", e))
    } else if e.is_connect() {
        FetchError::Network(format!("Connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &UserAgentConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, crawler)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedResource, FetchError> {
        let response = self
            .client
            .get(&target.url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::TooManyRequests {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(FetchError::HttpError {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let headers = header_map(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        Ok(FetchedResource {
            url: target.url.clone(),
            final_url,
            status_code: status.as_u16(),
            content_type,
            headers,
            body: body.to_vec(),
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&create_test_config(), &CrawlerConfig::default()).unwrap()
    }

    fn target(url: String) -> FetchTarget {
        FetchTarget {
            url,
            depth: 0,
            originating_url: None,
            attempt: 0,
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config(), &CrawlerConfig::default()).is_ok());
    }

    #[test]
    fn test_backoff_exponential_and_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(backoff_delay(0, base, max, None), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, base, max, None), Duration::from_millis(400));
        assert_eq!(backoff_delay(10, base, max, None), max);
        assert_eq!(backoff_delay(40, base, max, None), max);
    }

    #[test]
    fn test_backoff_prefers_retry_after() {
        let delay = backoff_delay(
            0,
            Duration::from_millis(100),
            Duration::from_secs(60),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_retry_after_past_date() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(FetchError::HttpError { status: 404 }.kind(), "http_error");
        assert_eq!(FetchError::HttpError { status: 503 }.kind(), "http_error");
        assert_eq!(FetchError::Network("x".to_string()).kind(), "network");
        assert_eq!(
            FetchError::TooManyRequests { retry_after: None }.kind(),
            "too_many_requests"
        );
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let resource = fetcher()
            .fetch(&target(format!("{}/page", server.uri())))
            .await
            .unwrap();

        assert_eq!(resource.status_code, 200);
        assert_eq!(resource.content_type, "text/html; charset=utf-8");
        assert_eq!(resource.body, b"<html><body>hi</body></html>");
        assert!(resource.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/new", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let url = format!("{}/old", server.uri());
        let resource = fetcher().fetch(&target(url.clone())).await.unwrap();

        assert_eq!(resource.url, url);
        assert_eq!(resource.final_url, format!("{}/new", server.uri()));
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = fetcher().fetch(&target(format!("{}/missing", server.uri()))).await;
        assert_eq!(result.unwrap_err(), FetchError::HttpError { status: 404 });
    }

    #[tokio::test]
    async fn test_fetch_too_many_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let result = fetcher().fetch(&target(format!("{}/busy", server.uri()))).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::TooManyRequests {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        // Nothing listens on port 9 of localhost in the test environment
        let result = fetcher().fetch(&target("http://127.0.0.1:9/".to_string())).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
