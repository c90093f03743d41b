//! A read-only file index over one snapshot of
//! entities and object listings.
//!
//! The join and both indices are computed at most once, on first use, and
//! never change afterwards; a changed backend needs a new context. Signed
//! URLs are cached for strictly less than their own validity.

use crate::{
    models::{
        entity::Entity,
        listing::ObjectListing,
        storage_file::{IndexFileKind, StorageFile},
    },
    mount::{
        DownloadUrlSource, MountError,
        probe::UrlProbe,
        url_cache::UrlCache,
    },
};
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub struct MountStorageContext {
    download: Arc<dyn DownloadUrlSource>,
    probe: Arc<dyn UrlProbe>,

    entities: Vec<Entity>,
    objects: Vec<ObjectListing>,

    files: OnceLock<Vec<StorageFile>>,
    object_id_index: OnceLock<HashMap<String, usize>>,
    gnos_id_index: OnceLock<HashMap<String, Vec<usize>>>,
    url_cache: UrlCache,
    authorized: OnceCell<bool>,
    metrics: DashMap<String, u64>,
}

impl MountStorageContext {
    pub fn new(
        download: Arc<dyn DownloadUrlSource>,
        probe: Arc<dyn UrlProbe>,
        url_cache: UrlCache,
        entities: Vec<Entity>,
        objects: Vec<ObjectListing>,
    ) -> Self {
        Self {
            download,
            probe,
            entities,
            objects,
            files: OnceLock::new(),
            object_id_index: OnceLock::new(),
            gnos_id_index: OnceLock::new(),
            url_cache,
            authorized: OnceCell::new(),
            metrics: DashMap::new(),
        }
    }

    /// Every object that has both a listing and an entity, in listing order.
    /// Either side without a partner is left out.
    pub fn files(&self) -> &[StorageFile] {
        self.files.get_or_init(|| self.resolve_files())
    }

    fn resolve_files(&self) -> Vec<StorageFile> {
        let mut entity_index: HashMap<&str, &Entity> = HashMap::with_capacity(self.entities.len());
        for entity in &self.entities {
            entity_index.entry(entity.id.as_str()).or_insert(entity);
        }

        let files = self
            .objects
            .iter()
            .filter_map(|object| {
                let entity = entity_index.get(object.id.as_str())?;
                Some(StorageFile {
                    object_id: object.id.clone(),
                    file_name: entity.file_name.clone(),
                    gnos_id: entity.gnos_id.clone(),
                    last_modified: object.last_modified,
                    size: object.size,
                })
            })
            .collect::<Vec<_>>();

        debug!(
            entities = self.entities.len(),
            objects = self.objects.len(),
            files = files.len(),
            "resolved storage files"
        );
        files
    }

    fn object_id_index(&self) -> &HashMap<String, usize> {
        self.object_id_index.get_or_init(|| {
            let mut index = HashMap::new();
            for (position, file) in self.files().iter().enumerate() {
                index.entry(file.object_id.clone()).or_insert(position);
            }
            index
        })
    }

    fn gnos_id_index(&self) -> &HashMap<String, Vec<usize>> {
        self.gnos_id_index.get_or_init(|| {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (position, file) in self.files().iter().enumerate() {
                index.entry(file.gnos_id.clone()).or_default().push(position);
            }
            index
        })
    }

    pub fn get_file(&self, object_id: &str) -> Option<&StorageFile> {
        let position = *self.object_id_index().get(object_id)?;
        self.files().get(position)
    }

    /// Files of one group in index order; empty for an unknown group.
    pub fn files_by_group(&self, gnos_id: &str) -> Vec<&StorageFile> {
        let files = self.files();
        self.gnos_id_index()
            .get(gnos_id)
            .map(|positions| positions.iter().map(|&p| &files[p]).collect())
            .unwrap_or_default()
    }

    /// Group ids, sorted.
    pub fn group_ids(&self) -> Vec<&str> {
        let mut ids = self
            .gnos_id_index()
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    /// The first file in the same group named `{file_name}.{extension}`.
    pub fn get_index_file(&self, object_id: &str, kind: IndexFileKind) -> Option<&StorageFile> {
        let file = self.get_file(object_id)?;
        let index_name = kind.index_name_for(&file.file_name);
        self.files_by_group(&file.gnos_id)
            .into_iter()
            .find(|candidate| candidate.file_name == index_name)
    }

    /// A signed URL for the object, served from cache while it is fresh.
    pub async fn get_url(&self, object_id: &str) -> Result<String, MountError> {
        self.url_cache
            .get_or_load(object_id, || self.download.get_url(object_id))
            .await
    }

    /// Whether the current credentials may read data, probed once per
    /// context against the last listed object.
    ///
    /// With nothing listed there is nothing to probe and the answer is a
    /// vacuous `true`: it says no request was refused, not that one would
    /// succeed.
    pub async fn is_authorized(&self) -> Result<bool, MountError> {
        self.authorized
            .get_or_try_init(|| self.resolve_authorized())
            .await
            .copied()
    }

    async fn resolve_authorized(&self) -> Result<bool, MountError> {
        let Some(probe_object) = self.objects.last() else {
            debug!("no objects listed, nothing to probe");
            return Ok(true);
        };

        let url = self.download.get_url(&probe_object.id).await?;
        match self.probe.open(&url).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_forbidden() => {
                warn!(object_id = %probe_object.id, "authorization probe was denied");
                Ok(false)
            }
            Err(err) => Err(MountError::from(err)),
        }
    }

    pub fn increment_count(&self, name: &str, n: u64) {
        *self.metrics.entry(name.to_string()).or_insert(0) += n;
    }

    /// Snapshot of the usage counters.
    pub fn metrics(&self) -> HashMap<String, u64> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mount::probe::ProbeError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use reqwest::StatusCode;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    /// Hands out `url-{id}-{n}` and counts calls per source.
    #[derive(Default)]
    pub(crate) struct CountingSource {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl DownloadUrlSource for CountingSource {
        async fn get_url(&self, object_id: &str) -> Result<String, MountError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("url-{}-{}", object_id, n))
        }
    }

    pub(crate) struct FixedProbe {
        pub status: Option<StatusCode>,
        pub calls: AtomicUsize,
    }

    impl FixedProbe {
        pub fn answering(status: Option<StatusCode>) -> Self {
            Self {
                status,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UrlProbe for FixedProbe {
        async fn open(&self, _url: &str) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            match self.status {
                None => Ok(()),
                Some(status) => Err(ProbeError::Status(status)),
            }
        }
    }

    pub(crate) fn entity(id: &str, gnos_id: &str, file_name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            gnos_id: gnos_id.to_string(),
            file_name: file_name.to_string(),
            project_code: None,
            access: "controlled".to_string(),
        }
    }

    pub(crate) fn listing(id: &str, size: u64) -> ObjectListing {
        ObjectListing {
            id: id.to_string(),
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            size,
        }
    }

    pub(crate) fn sample_entities() -> Vec<Entity> {
        vec![
            entity("obj-a", "g1", "sample.bam"),
            entity("obj-b", "g1", "sample.bam.bai"),
            entity("obj-c", "g2", "calls.vcf.gz"),
            entity("obj-d", "g2", "calls.vcf.gz.tbi"),
        ]
    }

    pub(crate) fn sample_listings() -> Vec<ObjectListing> {
        vec![
            listing("obj-a", 1000),
            listing("obj-b", 10),
            listing("obj-c", 500),
            listing("obj-d", 5),
        ]
    }

    fn context_with(
        source: Arc<CountingSource>,
        probe: Arc<FixedProbe>,
        entities: Vec<Entity>,
        objects: Vec<ObjectListing>,
    ) -> MountStorageContext {
        MountStorageContext::new(
            source,
            probe,
            UrlCache::for_url_expiration(Duration::from_secs(24 * 3600)),
            entities,
            objects,
        )
    }

    fn sample_context() -> MountStorageContext {
        context_with(
            Arc::new(CountingSource::default()),
            Arc::new(FixedProbe::answering(None)),
            sample_entities(),
            sample_listings(),
        )
    }

    #[test]
    fn files_need_both_entity_and_listing() {
        let context = context_with(
            Arc::new(CountingSource::default()),
            Arc::new(FixedProbe::answering(None)),
            vec![entity("A", "g", "a.bam"), entity("B", "g", "b.bam"), entity("Z", "g", "z.bam")],
            vec![listing("A", 1), listing("B", 2), listing("C", 3)],
        );

        let ids = context
            .files()
            .iter()
            .map(|file| file.object_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(context.get_file("C").is_none());
        assert!(context.get_file("Z").is_none());
        assert_eq!(context.get_file("B").unwrap().size, 2);
    }

    #[test]
    fn groups_are_indexed() {
        let context = sample_context();
        assert_eq!(context.group_ids(), vec!["g1", "g2"]);

        let g2 = context
            .files_by_group("g2")
            .into_iter()
            .map(|file| file.file_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(g2, vec!["calls.vcf.gz", "calls.vcf.gz.tbi"]);
        assert!(context.files_by_group("missing").is_empty());
    }

    #[test]
    fn index_files_are_found_by_name_within_the_group() {
        let context = sample_context();

        let bai = context.get_index_file("obj-a", IndexFileKind::Bai).unwrap();
        assert_eq!(bai.object_id, "obj-b");
        let tbi = context.get_index_file("obj-c", IndexFileKind::Tbi).unwrap();
        assert_eq!(tbi.object_id, "obj-d");

        assert!(context.get_index_file("obj-a", IndexFileKind::Crai).is_none());
        assert!(context.get_index_file("obj-c", IndexFileKind::Bai).is_none());
        assert!(context.get_index_file("unknown", IndexFileKind::Bai).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn urls_are_refetched_only_after_the_cache_lifetime() {
        let source = Arc::new(CountingSource::default());
        let context = context_with(
            source.clone(),
            Arc::new(FixedProbe::answering(None)),
            sample_entities(),
            sample_listings(),
        );

        let first = context.get_url("obj-a").await.unwrap();
        tokio::time::advance(Duration::from_secs(22 * 3600)).await;
        assert_eq!(context.get_url("obj-a").await.unwrap(), first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let second = context.get_url("obj-a").await.unwrap();
        assert_ne!(second, first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forbidden_probe_means_unauthorized() {
        let context = context_with(
            Arc::new(CountingSource::default()),
            Arc::new(FixedProbe::answering(Some(StatusCode::FORBIDDEN))),
            sample_entities(),
            sample_listings(),
        );
        assert!(!context.is_authorized().await.unwrap());
    }

    #[tokio::test]
    async fn other_probe_failures_propagate() {
        let context = context_with(
            Arc::new(CountingSource::default()),
            Arc::new(FixedProbe::answering(Some(StatusCode::INTERNAL_SERVER_ERROR))),
            sample_entities(),
            sample_listings(),
        );
        let err = context.is_authorized().await.unwrap_err();
        assert!(matches!(err, MountError::Probe(ProbeError::Status(StatusCode::INTERNAL_SERVER_ERROR))));
    }

    #[tokio::test]
    async fn empty_listing_is_authorized_without_probing() {
        let probe = Arc::new(FixedProbe::answering(Some(StatusCode::FORBIDDEN)));
        let context = context_with(
            Arc::new(CountingSource::default()),
            probe.clone(),
            sample_entities(),
            Vec::new(),
        );
        assert!(context.is_authorized().await.unwrap());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn authorization_is_probed_once() {
        let source = Arc::new(CountingSource::default());
        let probe = Arc::new(FixedProbe::answering(None));
        let context = Arc::new(context_with(
            source.clone(),
            probe.clone(),
            sample_entities(),
            sample_listings(),
        ));

        let tasks = (0..16)
            .map(|_| {
                let context = context.clone();
                tokio::spawn(async move { context.is_authorized().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn counters_survive_concurrent_increments() {
        let context = Arc::new(sample_context());

        let tasks = (0..8)
            .map(|_| {
                let context = context.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        context.increment_count("lookup", 1);
                    }
                    context.increment_count("open", 2);
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        let metrics = context.metrics();
        assert_eq!(metrics["lookup"], 800);
        assert_eq!(metrics["open"], 16);
    }
}
