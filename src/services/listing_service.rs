//! Lists the data objects held across every partition of the data bucket.

use crate::{
    models::listing::ObjectListing,
    services::{bucket_resolver::BucketResolver, object_keys},
    store::{ObjectStore, StoreResult},
};
use futures::future::try_join_all;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

#[derive(Clone)]
pub struct ObjectListingService {
    store: Arc<dyn ObjectStore>,
    resolver: BucketResolver,
    data_bucket: String,
    data_dir: String,
}

impl ObjectListingService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        resolver: BucketResolver,
        data_bucket: impl Into<String>,
        data_dir: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            data_bucket: data_bucket.into(),
            data_dir: data_dir.into(),
        }
    }

    /// One listing per object id, ordered by id. Partitions are consulted
    /// before the base bucket and the first sighting of an id wins.
    pub async fn list(&self) -> StoreResult<Vec<ObjectListing>> {
        let prefix = format!("{}/", self.data_dir);
        let buckets = self.resolver.all_buckets(&self.data_bucket);
        let per_bucket = try_join_all(
            buckets
                .iter()
                .map(|bucket| self.store.list_objects(bucket, &prefix)),
        )
        .await?;

        let mut listings = BTreeMap::new();
        for object in per_bucket.into_iter().flatten() {
            let Some(id) = object_keys::object_id_from_key(&self.data_dir, &object.key) else {
                continue;
            };
            listings
                .entry(id.to_string())
                .or_insert_with(|| ObjectListing {
                    id: id.to_string(),
                    last_modified: object.last_modified,
                    size: object.size,
                });
        }

        debug!(buckets = buckets.len(), objects = listings.len(), "listed data objects");
        Ok(listings.into_values().collect())
    }
}
