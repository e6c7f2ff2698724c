//! Configuration module for Spider-Walker
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use spider_walker::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("walker.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, EmbeddingBackendKind, EmbeddingConfig, ExtractionConfig, OutputConfig,
    ScopeConfig, ScopeMode, SinkConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
