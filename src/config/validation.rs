use crate::config::types::{
    Config, CrawlerConfig, EmbeddingBackendKind, EmbeddingConfig, ExtractionConfig, OutputConfig,
    ScopeConfig, ScopeMode, SinkConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawler_config(&config.crawler)?;
    validate_scope_config(&config.scope)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_extraction_config(&config.extraction)?;
    validate_embedding_config(&config.embedding)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates seed URLs: at least one, each an absolute http(s) URL with a host
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' has no host",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.max_retry_delay_ms < config.retry_base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_retry_delay_ms ({}) must be >= retry_base_delay_ms ({})",
            config.max_retry_delay_ms, config.retry_base_delay_ms
        )));
    }

    if config.redirect_limit < 1 {
        return Err(ConfigError::Validation(
            "redirect_limit must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.step_budget == Some(0) {
        return Err(ConfigError::Validation(
            "step_budget must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the scope section
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    if config.mode == ScopeMode::AllowList && config.allow.is_empty() {
        return Err(ConfigError::Validation(
            "allow-list scope needs at least one domain pattern".to_string(),
        ));
    }

    for pattern in &config.allow {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates chunking and preview settings
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk_size must be > 0".to_string(),
        ));
    }

    // step = size - overlap must stay positive
    if config.chunk_overlap >= config.chunk_size {
        return Err(ConfigError::Validation(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }

    if config.preview_rows == 0 {
        return Err(ConfigError::Validation(
            "preview_rows must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates embedding configuration
fn validate_embedding_config(config: &EmbeddingConfig) -> Result<(), ConfigError> {
    if config.dimensions == 0 {
        return Err(ConfigError::Validation(
            "embedding dimensions must be > 0".to_string(),
        ));
    }

    if config.backend == EmbeddingBackendKind::Http {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation("http embedding backend needs an endpoint".to_string())
        })?;
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid embedding endpoint '{}': {}", endpoint, e))
        })?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.resume_log_path.is_empty() {
        return Err(ConfigError::Validation(
            "resume_log_path cannot be empty".to_string(),
        ));
    }

    match &config.sink {
        SinkConfig::None => {}
        SinkConfig::Local { path } => {
            if path.is_empty() {
                return Err(ConfigError::Validation(
                    "local sink path cannot be empty".to_string(),
                ));
            }
        }
        SinkConfig::Blob {
            endpoint,
            container,
            ..
        } => {
            Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid blob endpoint '{}': {}", endpoint, e))
            })?;
            if container.is_empty() || container.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "blob container must be a single non-empty path segment, got '{}'",
                    container
                )));
            }
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.gov')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
