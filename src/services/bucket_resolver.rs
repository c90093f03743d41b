//! Deterministic bucket partitioning.
//!
//! Writers and readers agree on where an object lives without a shared
//! directory: the partition is a pure function of the object id.

use thiserror::Error;

/// Longest partition suffix (in digits) a deployment may configure.
pub const MAX_KEY_SIZE: usize = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketConfigError {
    #[error("bucket key size {key_size} exceeds maximum allowable ({max})")]
    KeySizeTooLarge { key_size: usize, max: usize },
    #[error("bucket pool size {pool_size} does not fit in {key_size} digits")]
    PoolTooLarge { pool_size: i32, key_size: usize },
}

/// Map `object_id` to a partition of `base_bucket`.
///
/// With `pool_size <= 0` partitioning is disabled and the base name is
/// returned unchanged. Otherwise the first eight bytes of MD5(object_id),
/// reduced modulo `pool_size`, are appended as a zero-padded suffix of
/// `key_size` digits, e.g. `state.007`.
pub fn resolve_bucket(object_id: &str, base_bucket: &str, pool_size: i32, key_size: usize) -> String {
    if pool_size <= 0 {
        return base_bucket.to_string();
    }

    let digest = md5::compute(object_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(prefix) % pool_size as u64;

    format!("{}.{:0width$}", base_bucket, index, width = key_size)
}

/// Validated partitioning settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketResolver {
    pool_size: i32,
    key_size: usize,
}

impl BucketResolver {
    /// Validate the configuration once, at startup.
    pub fn new(pool_size: i32, key_size: usize) -> Result<Self, BucketConfigError> {
        if key_size > MAX_KEY_SIZE {
            return Err(BucketConfigError::KeySizeTooLarge {
                key_size,
                max: MAX_KEY_SIZE,
            });
        }
        if pool_size > 0 && (pool_size as u64) > 10u64.pow(key_size as u32) {
            return Err(BucketConfigError::PoolTooLarge {
                pool_size,
                key_size,
            });
        }
        Ok(Self {
            pool_size,
            key_size,
        })
    }

    /// Partitioning disabled.
    #[cfg(test)]
    pub fn unpartitioned() -> Self {
        Self {
            pool_size: 0,
            key_size: 0,
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.pool_size > 0
    }

    pub fn resolve(&self, object_id: &str, base_bucket: &str) -> String {
        resolve_bucket(object_id, base_bucket, self.pool_size, self.key_size)
    }

    /// Every physical bucket behind `base_bucket`: each partition, then the
    /// base bucket itself (which still holds objects written before
    /// partitioning was enabled).
    pub fn all_buckets(&self, base_bucket: &str) -> Vec<String> {
        let mut buckets = (0..self.pool_size.max(0))
            .map(|index| format!("{}.{:0width$}", base_bucket, index, width = self.key_size))
            .collect::<Vec<_>>();
        buckets.push(base_bucket.to_string());
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 4] = [
        "5b845b9a-2ae9-5d14-a6b7-3a2a7ab2d5f7",
        "a1b2c3",
        "",
        "ffffffff-ffff-ffff-ffff-ffffffffffff",
    ];

    #[test]
    fn disabled_partitioning_returns_base() {
        for pool_size in [0, -1, -42] {
            for id in IDS {
                assert_eq!(resolve_bucket(id, "oicr.icgc", pool_size, 3), "oicr.icgc");
            }
        }
    }

    #[test]
    fn partitions_are_stable_and_in_range() {
        for id in IDS {
            let first = resolve_bucket(id, "state", 16, 2);
            assert_eq!(first, resolve_bucket(id, "state", 16, 2));

            let suffix = first.strip_prefix("state.").unwrap();
            assert_eq!(suffix.len(), 2);
            let index: u32 = suffix.parse().unwrap();
            assert!(index < 16);
        }
    }

    #[test]
    fn single_partition_pool_always_zero() {
        for id in IDS {
            assert_eq!(resolve_bucket(id, "data", 1, 3), "data.000");
        }
    }

    #[test]
    fn key_size_is_bounded() {
        assert_eq!(
            BucketResolver::new(10, MAX_KEY_SIZE + 1),
            Err(BucketConfigError::KeySizeTooLarge {
                key_size: MAX_KEY_SIZE + 1,
                max: MAX_KEY_SIZE,
            })
        );
        assert!(BucketResolver::new(10, MAX_KEY_SIZE).is_ok());
        assert!(matches!(
            BucketResolver::new(1000, 2),
            Err(BucketConfigError::PoolTooLarge { .. })
        ));
    }

    #[test]
    fn all_buckets_lists_partitions_then_base() {
        let resolver = BucketResolver::new(3, 1).unwrap();
        assert_eq!(resolver.all_buckets("data"), vec!["data.0", "data.1", "data.2", "data"]);
        assert_eq!(BucketResolver::unpartitioned().all_buckets("data"), vec!["data"]);
    }
}
