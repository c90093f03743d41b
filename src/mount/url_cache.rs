//! Bounded-lifetime cache of signed URLs.
//!
//! Each key owns a compute-once cell: concurrent loads of the same key share
//! one backend fetch, loads of other keys never wait on it. Expired cells are
//! swapped out on the next access; there is no background sweep.
//!
//! An entry lives for the configured lifetime, but never past one margin
//! before the `expires` the URL itself was signed with.

use crate::mount::MountError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Url;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::OnceCell, time::Instant};
use tracing::debug;

/// The finest granularity a URL expiration is configured in.
pub const EXPIRATION_MARGIN: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
struct CachedUrl {
    url: String,
    expires_at: Instant,
}

pub struct UrlCache {
    lifetime: Duration,
    entries: DashMap<String, Arc<OnceCell<CachedUrl>>>,
}

impl UrlCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            entries: DashMap::new(),
        }
    }

    /// A cache whose entries expire one margin before URLs signed for
    /// `url_expiration` do.
    pub fn for_url_expiration(url_expiration: Duration) -> Self {
        Self::new(url_expiration.saturating_sub(EXPIRATION_MARGIN))
    }

    /// The live cell for `key`, replacing an expired one.
    fn cell(&self, key: &str) -> Arc<OnceCell<CachedUrl>> {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_string()).or_default();
        if slot.value().get().is_some_and(|cached| cached.expires_at <= now) {
            *slot.value_mut() = Arc::new(OnceCell::new());
        }
        slot.value().clone()
    }

    /// The configured lifetime, shortened to end one margin before the
    /// URL's own signed expiry.
    fn entry_lifetime(&self, url: &str, now: DateTime<Utc>) -> Duration {
        let Some(signed_until) = signed_expiry(url) else {
            return self.lifetime;
        };
        let remaining = (signed_until - now)
            .to_std()
            .unwrap_or_default()
            .saturating_sub(EXPIRATION_MARGIN);
        if remaining < self.lifetime {
            debug!(signed_until = %signed_until, "url expires before cache lifetime");
        }
        remaining.min(self.lifetime)
    }

    /// Return the cached URL for `key`, or load it with `load`. A failed
    /// load leaves nothing behind, so the next caller tries again.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<String, MountError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, MountError>>,
    {
        let cell = self.cell(key);
        let cached = cell
            .get_or_try_init(|| async move {
                let url = load().await?;
                let expires_at = Instant::now() + self.entry_lifetime(&url, Utc::now());
                Ok::<_, MountError>(CachedUrl { url, expires_at })
            })
            .await?;
        Ok(cached.url.clone())
    }
}

/// The `expires` unix timestamp carried in a signed URL's query, if any.
fn signed_expiry(url: &str) -> Option<DateTime<Utc>> {
    let url = Url::parse(url).ok()?;
    let (_, expires) = url.query_pairs().find(|(name, _)| name == "expires")?;
    DateTime::from_timestamp(expires.parse().ok()?, 0)
}
