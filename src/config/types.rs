use serde::Deserialize;

/// Main configuration structure for Spider-Walker
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,

    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs (0 = seeds only)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of concurrent fetch workers
    pub workers: u32,

    /// Maximum number of requeues after HTTP 429
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff when no Retry-After is sent (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on any single retry delay (milliseconds)
    #[serde(rename = "max-retry-delay-ms", default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Maximum number of redirect hops followed per fetch
    #[serde(rename = "redirect-limit", default = "default_redirect_limit")]
    pub redirect_limit: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Wall-clock budget for the whole run (seconds)
    #[serde(rename = "time-budget-secs", default)]
    pub time_budget_secs: Option<u64>,

    /// Maximum number of fetch targets processed in one run
    #[serde(rename = "step-budget", default)]
    pub step_budget: Option<u64>,

    /// Time in-flight work is given to finish after cancellation (seconds)
    #[serde(rename = "shutdown-grace-secs", default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            workers: 4,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            redirect_limit: default_redirect_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            time_budget_secs: None,
            step_budget: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

fn default_redirect_limit() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Which discovered URLs are allowed into the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeMode {
    /// Any http(s) URL
    Unrestricted,
    /// URLs sharing a registrable domain with one of the seeds
    #[default]
    SameDomainAsSeed,
    /// URLs whose host matches one of the `allow` patterns
    AllowList,
}

/// Domain scope configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScopeConfig {
    #[serde(default)]
    pub mode: ScopeMode,

    /// Domain patterns (e.g. "example.gov" or "*.example.gov") for allow-list mode
    #[serde(default)]
    pub allow: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Extraction tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Words per section chunk
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared between consecutive chunks
    #[serde(rename = "chunk-overlap", default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Data rows kept per sheet / CSV file after the header row
    #[serde(rename = "preview-rows", default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_chunk_size() -> usize {
    250
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_preview_rows() -> usize {
    5
}

/// Embedding backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackendKind {
    /// Local feature-hashing embedder, no network access
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackendKind,

    /// Vector length produced by the backend
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Embeddings endpoint (http backend)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name sent to the endpoint (http backend)
    #[serde(default)]
    pub model: Option<String>,

    /// Name of the environment variable holding the API key (http backend)
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Hashing,
            dimensions: default_dimensions(),
            endpoint: None,
            model: None,
            api_key_env: None,
        }
    }
}

fn default_dimensions() -> usize {
    256
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the append-only resume log (JSON lines)
    #[serde(rename = "resume-log-path")]
    pub resume_log_path: String,

    /// Where serialized documents are mirrored
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Document sink selector
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SinkConfig {
    /// Documents are only written to the database
    #[default]
    None,

    /// `{path}/{fingerprint}.json` on the local filesystem
    Local { path: String },

    /// `PUT {endpoint}/{container}/{fingerprint}.json`
    Blob {
        endpoint: String,
        container: String,
        #[serde(rename = "token-env", default)]
        token_env: Option<String>,
    },
}
