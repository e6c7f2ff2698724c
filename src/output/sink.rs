//! Document sinks keyed by content fingerprint

use crate::config::SinkConfig;
use crate::extract::ExtractedDocument;
use crate::output::traits::{DocumentSink, SinkError, SinkResult};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Writes `{root}/{fingerprint}.json`
#[derive(Debug, Clone)]
pub struct LocalTreeSink {
    root: PathBuf,
}

impl LocalTreeSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File a document is written to
    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{}.json", fingerprint))
    }
}

#[async_trait]
impl DocumentSink for LocalTreeSink {
    async fn write(&self, document: &ExtractedDocument) -> SinkResult<()> {
        let body = serde_json::to_vec_pretty(document)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&document.content_fingerprint), body).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Uploads `PUT {endpoint}/{container}/{fingerprint}.json`
#[derive(Debug, Clone)]
pub struct HttpBlobSink {
    client: Client,
    endpoint: String,
    container: String,
    token: Option<String>,
}

impl HttpBlobSink {
    pub fn new(endpoint: &str, container: &str, token: Option<String>) -> SinkResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            container: container.trim_matches('/').to_string(),
            token,
        })
    }

    /// Blob URL a document is uploaded to
    pub fn url_for(&self, fingerprint: &str) -> String {
        format!("{}/{}/{}.json", self.endpoint, self.container, fingerprint)
    }
}

#[async_trait]
impl DocumentSink for HttpBlobSink {
    async fn write(&self, document: &ExtractedDocument) -> SinkResult<()> {
        let url = self.url_for(&document.content_fingerprint);
        let body = serde_json::to_vec(document)?;

        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Upload {
                url,
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "blob"
    }
}

/// Builds the configured sink, or None when output goes to the database only
///
/// The blob token is read from its environment variable here, once.
pub fn build_sink(config: &SinkConfig) -> Result<Option<Arc<dyn DocumentSink>>, ConfigError> {
    match config {
        SinkConfig::None => Ok(None),
        SinkConfig::Local { path } => {
            let sink: Arc<dyn DocumentSink> = Arc::new(LocalTreeSink::new(path));
            Ok(Some(sink))
        }
        SinkConfig::Blob {
            endpoint,
            container,
            token_env,
        } => {
            let token = match token_env {
                Some(var) => {
                    Some(std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?)
                }
                None => None,
            };
            let sink: Arc<dyn DocumentSink> = Arc::new(
                HttpBlobSink::new(endpoint, container, token).map_err(|e| {
                    ConfigError::Validation(format!("cannot build blob sink: {}", e))
                })?,
            );
            Ok(Some(sink))
        }
    }
}
