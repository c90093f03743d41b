//! Building download specifications.
//!
//! For a requested byte span it resolves the partition holding the object's
//! specification document, falls back to the unpartitioned base bucket for
//! objects written before partitioning (or during a migration), computes the
//! parts and signs one URL per part against wherever the bytes actually live.
//!
//! Failures are classified once, here, into not-found / retryable /
//! permanent / invalid-request. Nothing is retried beyond the single bucket
//! fallback; retrying transient failures is the caller's decision.

use crate::{
    models::specification::{ObjectSpecification, Part},
    services::{
        bucket_resolver::BucketResolver,
        object_keys,
        part_calculator::{PartCalculator, PartError},
        url_signer::{SignError, UrlSigner},
    },
    store::{ObjectStore, StoreError},
};
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("offset must not be negative (object id: {object_id}, offset: {offset})")]
    NegativeOffset { object_id: String, offset: i64 },
    #[error(
        "specified parameters exceed object size (object id: {object_id}, offset: {offset}, length: {length}, size: {object_size})"
    )]
    RangeExceedsObject {
        object_id: String,
        offset: u64,
        length: u64,
        object_size: u64,
    },
    #[error(transparent)]
    Parts(#[from] PartError),
    #[error("object id `{0}` not found")]
    IdNotFound(String),
    #[error("malformed specification for object id `{object_id}`: {source}")]
    MalformedSpecification {
        object_id: String,
        #[source]
        source: SpecificationDefect,
    },
    #[error("retryable failure fetching object id `{object_id}`: {source}")]
    Retryable {
        object_id: String,
        #[source]
        source: StoreError,
    },
    #[error("failure fetching object id `{object_id}`: {source}")]
    NotRetryable {
        object_id: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to sign url for object id `{object_id}`: {source}")]
    Signing {
        object_id: String,
        #[source]
        source: SignError,
    },
}

/// Why a persisted specification document cannot be used.
#[derive(Debug, Error)]
pub enum SpecificationDefect {
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
    #[error("part {part_number} at offset {offset} overruns object size {object_size}")]
    PartOutOfBounds {
        part_number: u32,
        offset: u64,
        object_size: u64,
    },
}

/// Every part must lie inside the object.
fn check_parts(spec: &ObjectSpecification) -> Result<(), SpecificationDefect> {
    for part in &spec.parts {
        let end = match part.part_size {
            Some(size) => part.offset.checked_add(size),
            None => Some(part.offset),
        };
        if end.is_none_or(|end| end > spec.object_size) {
            return Err(SpecificationDefect::PartOutOfBounds {
                part_number: part.part_number,
                offset: part.offset,
                object_size: spec.object_size,
            });
        }
    }
    Ok(())
}

/// What a caller may do about a failed download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// The object (or its specification) does not exist anywhere.
    NotFound,
    /// Transient backend failure; the caller may back off and retry.
    Retryable,
    /// Backend or data-integrity failure; retrying will not help.
    Permanent,
    /// The request itself is invalid.
    InvalidRequest,
}

impl DownloadError {
    pub fn class(&self) -> FailureClass {
        match self {
            DownloadError::NegativeOffset { .. }
            | DownloadError::RangeExceedsObject { .. }
            | DownloadError::Parts(_) => FailureClass::InvalidRequest,
            DownloadError::IdNotFound(_) => FailureClass::NotFound,
            DownloadError::Retryable { .. } => FailureClass::Retryable,
            DownloadError::MalformedSpecification { .. }
            | DownloadError::NotRetryable { .. }
            | DownloadError::Signing { .. } => FailureClass::Permanent,
        }
    }

    /// Classify a store failure after the bucket fallback has been exhausted.
    fn from_store(object_id: &str, err: StoreError) -> Self {
        let object_id = object_id.to_string();
        if err.is_not_found() {
            DownloadError::IdNotFound(object_id)
        } else if err.is_retryable() {
            DownloadError::Retryable {
                object_id,
                source: err,
            }
        } else {
            DownloadError::NotRetryable {
                object_id,
                source: err,
            }
        }
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;

/// Static addressing configuration for downloads.
#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Base bucket for data objects.
    pub data_bucket: String,
    /// Base bucket for specification documents.
    pub state_bucket: String,
    /// Key prefix under which objects live.
    pub data_dir: String,
    /// Lifetime of every signed URL handed out.
    pub url_expiration: TimeDelta,
}

/// A fetched specification document and where it was found.
struct FetchedDocument {
    bytes: Bytes,
    relocated: bool,
}

#[derive(Clone)]
pub struct ObjectDownloadService {
    config: DownloadConfig,
    resolver: BucketResolver,
    parts: PartCalculator,
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn UrlSigner>,
}

impl ObjectDownloadService {
    pub fn new(
        config: DownloadConfig,
        resolver: BucketResolver,
        parts: PartCalculator,
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn UrlSigner>,
    ) -> Self {
        Self {
            config,
            resolver,
            parts,
            store,
            signer,
        }
    }

    /// Build the specification for `[offset, offset + length)` of an object.
    ///
    /// A negative `length` means "to the end of the object". With
    /// `for_external_use` the result is a single whole-object part whose URL
    /// carries no range restriction.
    pub async fn download(
        &self,
        object_id: &str,
        offset: i64,
        length: i64,
        for_external_use: bool,
    ) -> DownloadResult<ObjectSpecification> {
        let result = self
            .build_specification(object_id, offset, length, for_external_use)
            .await;
        if let Err(err) = &result {
            error!(
                object_id,
                offset,
                length,
                for_external_use,
                class = ?err.class(),
                error = %err,
                "failed to download object"
            );
        }
        result
    }

    async fn build_specification(
        &self,
        object_id: &str,
        offset: i64,
        length: i64,
        for_external_use: bool,
    ) -> DownloadResult<ObjectSpecification> {
        let offset = u64::try_from(offset).map_err(|_| DownloadError::NegativeOffset {
            object_id: object_id.to_string(),
            offset,
        })?;

        let stored = self.get_specification(object_id).await?;

        // The whole object exactly as stored.
        if !for_external_use && offset == 0 && length < 0 {
            return Ok(stored);
        }

        let object_size = stored.object_size;
        let exceeds = |length| DownloadError::RangeExceedsObject {
            object_id: object_id.to_string(),
            offset,
            length,
            object_size,
        };
        let length = match u64::try_from(length) {
            Ok(length) => length,
            Err(_) => object_size.checked_sub(offset).ok_or_else(|| exceeds(0))?,
        };
        if offset.checked_add(length).is_none_or(|end| end > object_size) {
            return Err(exceeds(length));
        }

        let object_key = object_keys::object_key(&self.config.data_dir, object_id);
        let (mut parts, described_size) = if for_external_use {
            (vec![self.parts.specify(0, -1)], object_size)
        } else {
            (self.parts.divide(offset, length as i64)?, length)
        };
        self.fill_part_urls(
            object_id,
            &object_key,
            &mut parts,
            stored.relocated,
            for_external_use,
        )
        .await?;

        Ok(ObjectSpecification {
            object_key,
            object_id: object_id.to_string(),
            upload_id: object_id.to_string(),
            parts,
            object_size: described_size,
            object_md5: stored.object_md5,
            relocated: stored.relocated,
        })
    }

    /// Fetch and parse the persisted specification, with part URLs filled
    /// against the bucket the object was actually found in.
    pub async fn get_specification(&self, object_id: &str) -> DownloadResult<ObjectSpecification> {
        let object_key = object_keys::object_key(&self.config.data_dir, object_id);
        let meta_key = object_keys::object_meta_key(&self.config.data_dir, object_id);
        debug!(object_id, object_key = %object_key, meta_key = %meta_key, "getting specification");

        let fetched = self.fetch_document(object_id, &meta_key).await?;
        let mut spec = serde_json::from_slice::<ObjectSpecification>(&fetched.bytes)
            .map_err(SpecificationDefect::from)
            .and_then(|spec| check_parts(&spec).map(|()| spec))
            .map_err(|source| {
                error!(object_id, meta_key = %meta_key, error = %source, "malformed specification");
                DownloadError::MalformedSpecification {
                    object_id: object_id.to_string(),
                    source,
                }
            })?;
        spec.relocated = fetched.relocated;

        self.fill_part_urls(object_id, &object_key, &mut spec.parts, fetched.relocated, false)
            .await?;
        Ok(spec)
    }

    /// Read the `.meta` document from its partition, falling back once to
    /// the base state bucket when partitioning is enabled and it is missing.
    async fn fetch_document(&self, object_id: &str, meta_key: &str) -> DownloadResult<FetchedDocument> {
        let state_bucket = &self.config.state_bucket;
        let bucket = self.resolver.resolve(object_id, state_bucket);

        match self.store.get_object(&bucket, meta_key).await {
            Ok(bytes) => Ok(FetchedDocument {
                bytes,
                relocated: false,
            }),
            Err(err) if err.is_not_found() && self.resolver.is_partitioned() => {
                warn!(
                    object_id,
                    bucket = %bucket,
                    key = meta_key,
                    fallback = %state_bucket,
                    "specification not found in partition, trying base bucket"
                );
                match self.store.get_object(state_bucket, meta_key).await {
                    Ok(bytes) => Ok(FetchedDocument {
                        bytes,
                        relocated: true,
                    }),
                    Err(err) => {
                        error!(object_id, bucket = %state_bucket, key = meta_key, error = %err, "failed to get specification");
                        Err(DownloadError::from_store(object_id, err))
                    }
                }
            }
            Err(err) => {
                error!(object_id, bucket = %bucket, key = meta_key, error = %err, "failed to get specification");
                Err(DownloadError::from_store(object_id, err))
            }
        }
    }

    /// Sign one URL per part. Relocated objects are served from the base
    /// data bucket, everything else from the partition of their object key.
    async fn fill_part_urls(
        &self,
        object_id: &str,
        object_key: &str,
        parts: &mut [Part],
        relocated: bool,
        for_external_use: bool,
    ) -> DownloadResult<()> {
        let expires_at = Utc::now() + self.config.url_expiration;
        let bucket = if relocated {
            self.config.data_bucket.clone()
        } else {
            self.resolver.resolve(object_key, &self.config.data_bucket)
        };

        for part in parts.iter_mut() {
            let range = if for_external_use {
                None
            } else {
                part.byte_range()
            };
            let url = self
                .signer
                .presign(&bucket, object_key, expires_at, range)
                .await
                .map_err(|source| DownloadError::Signing {
                    object_id: object_id.to_string(),
                    source,
                })?;
            part.url = Some(url);
        }
        Ok(())
    }
}
