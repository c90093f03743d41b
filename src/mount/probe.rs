//! Opening a signed URL to find out whether its credential is honoured.

use async_trait::async_trait;
use reqwest::{StatusCode, header::RANGE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe answered with status {0}")]
    Status(StatusCode),
    #[error("probe request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProbeError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ProbeError::Status(StatusCode::FORBIDDEN))
    }
}

#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Open a stream against `url` and drop it; succeed only on a 2xx answer.
    async fn open(&self, url: &str) -> Result<(), ProbeError>;
}

#[derive(Clone, Default)]
pub struct HttpProbe {
    http: reqwest::Client,
}

impl HttpProbe {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn open(&self, url: &str) -> Result<(), ProbeError> {
        let response = self.http.get(url).header(RANGE, "bytes=0-0").send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }
}
