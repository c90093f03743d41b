//! Object-store capability consumed by the gateway.
//!
//! The gateway never assumes a particular backend: it needs to fetch small
//! metadata documents and list data objects, and every failure must be
//! classifiable as not-found, transient, or anything else.

pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::{self, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("transient failure reading `{key}` from bucket `{bucket}`: {source}")]
    Transient {
        bucket: String,
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failure reading `{key}` from bucket `{bucket}`: {source}")]
    Other {
        bucket: String,
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("invalid bucket name `{0}`")]
    InvalidBucket(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Map an I/O error from the backend onto the store taxonomy.
    pub fn from_io(bucket: &str, key: &str, err: io::Error) -> Self {
        let bucket = bucket.to_string();
        let key = key.to_string();
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound { bucket, key },
            ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted => StoreError::Transient {
                bucket,
                key,
                source: err,
            },
            _ => StoreError::Other {
                bucket,
                key,
                source: err,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

/// One entry of a bucket listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a whole object. Returns `StoreError::NotFound` if it is absent.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// List objects whose key starts with `prefix`, ordered by key.
    ///
    /// A bucket that does not exist lists as empty.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StoredObject>>;
}
