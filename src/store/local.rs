//! The object-store capability backed by local disk.
//!
//! Objects live beneath `base_path/{bucket}/{shard}/{shard}/{key}`, where the
//! two shard directories come from MD5(bucket/key). The upload pipeline writes
//! into the same layout; the gateway only reads.

use crate::store::{ObjectStore, StoreError, StoreResult, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind, SeekFrom},
    ops::Range,
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncSeekExt,
};
use tracing::debug;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const TEMP_PREFIX: &str = ".tmp-";

/// A byte window opened for streaming out.
#[derive(Debug)]
pub struct OpenedRange {
    pub file: File,
    pub range: Range<u64>,
    pub object_size: u64,
}

#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where buckets are rooted.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Rejects keys that are empty, absolute, contain `..` or control bytes.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let unsafe_key = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if unsafe_key {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Bucket names: 3–63 characters of lowercase letters, digits, dots and
    /// hyphens, starting and ending with a letter or digit.
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let len = name.len();
        let valid = (BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len)
            && name
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
            && !name.starts_with(['.', '-'])
            && !name.ends_with(['.', '-'])
            && !name.contains("..");
        if !valid {
            return Err(StoreError::InvalidBucket(name.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key)
    /// as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn checked_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        Ok(self.object_path(bucket, key))
    }

    /// Open an object positioned at the start of `range` (or the whole object).
    ///
    /// The range is clamped to the object size.
    pub async fn open_range(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> StoreResult<OpenedRange> {
        let path = self.checked_path(bucket, key)?;
        let mut file = File::open(&path)
            .await
            .map_err(|err| StoreError::from_io(bucket, key, err))?;
        let object_size = file
            .metadata()
            .await
            .map_err(|err| StoreError::from_io(bucket, key, err))?
            .len();

        let range = match range {
            Some(r) => r.start.min(object_size)..r.end.min(object_size),
            None => 0..object_size,
        };
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|err| StoreError::from_io(bucket, key, err))?;

        Ok(OpenedRange {
            file,
            range,
            object_size,
        })
    }

    /// Write an object atomically through a temp file and rename.
    #[cfg(test)]
    pub async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        use tokio::io::AsyncWriteExt;

        let path = self.checked_path(bucket, key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        let io_err = |err| StoreError::from_io(bucket, key, err);

        fs::create_dir_all(&parent).await.map_err(io_err)?;
        let tmp_path = parent.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await.map_err(io_err)?;
        file.write_all(data).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        fs::rename(&tmp_path, &path).await.map_err(io_err)?;
        Ok(())
    }

    /// Collect every regular file beneath `root`. A missing root yields nothing.
    async fn walk_files(root: &Path) -> io::Result<Vec<(PathBuf, std::fs::Metadata)>> {
        let mut pending = vec![root.to_path_buf()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else if metadata.is_file() {
                    files.push((entry.path(), metadata));
                }
            }
        }

        Ok(files)
    }

    /// Recover the object key from `bucket_root/{shard}/{shard}/{key}`.
    fn key_from_path(bucket_root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(bucket_root).ok()?;
        let parts = relative
            .components()
            .skip(2)
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() || parts.last()?.starts_with(TEMP_PREFIX) {
            return None;
        }
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let path = self.checked_path(bucket, key)?;
        debug!(bucket, key, path = %path.display(), "reading object");
        let data = fs::read(&path)
            .await
            .map_err(|err| StoreError::from_io(bucket, key, err))?;
        Ok(Bytes::from(data))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StoredObject>> {
        self.ensure_bucket_name_safe(bucket)?;
        let root = self.bucket_root(bucket);
        let files = Self::walk_files(&root)
            .await
            .map_err(|err| StoreError::from_io(bucket, prefix, err))?;

        let mut objects = files
            .into_iter()
            .filter_map(|(path, metadata)| {
                let key = Self::key_from_path(&root, &path)?;
                if !key.starts_with(prefix) {
                    return None;
                }
                let last_modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Some(StoredObject {
                    key,
                    size: metadata.len(),
                    last_modified,
                })
            })
            .collect::<Vec<_>>();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }
}
