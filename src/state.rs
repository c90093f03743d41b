//! Shared application state handed to every handler.

use crate::{
    metadata::MetadataRepository,
    services::{
        download_service::ObjectDownloadService, listing_service::ObjectListingService,
        url_signer::HmacUrlSigner,
    },
    store::local::LocalObjectStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub downloads: ObjectDownloadService,
    pub listings: ObjectListingService,
    pub metadata: MetadataRepository,
    /// Serves the bytes behind signed URLs.
    pub blobs: LocalObjectStore,
    pub signer: Arc<HmacUrlSigner>,
}
