//! Client-side mount view.
//!
//! A [`context::MountStorageContext`] joins a snapshot of entity records with
//! a snapshot of object listings into a browsable file index and hands out
//! cached signed URLs for the files in it. [`view::MountView`] translates
//! path operations onto that index.

pub mod client;
pub mod context;
pub mod probe;
pub mod url_cache;
pub mod view;

use crate::services::download_service::{DownloadError, ObjectDownloadService};
use async_trait::async_trait;
use probe::ProbeError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("gateway returned {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("specification for object id `{0}` carries no url")]
    MissingUrl(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Anything that can hand out a signed whole-object URL for an object id.
#[async_trait]
pub trait DownloadUrlSource: Send + Sync {
    async fn get_url(&self, object_id: &str) -> Result<String, MountError>;
}

/// In-process: the external-use specification is a single unranged part.
#[async_trait]
impl DownloadUrlSource for ObjectDownloadService {
    async fn get_url(&self, object_id: &str) -> Result<String, MountError> {
        let spec = self.download(object_id, 0, -1, true).await?;
        spec.parts
            .into_iter()
            .next()
            .and_then(|part| part.url)
            .ok_or_else(|| MountError::MissingUrl(object_id.to_string()))
    }
}
