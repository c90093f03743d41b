//! Download specifications and object listings.

use crate::{
    errors::AppError,
    models::{listing::ObjectListing, specification::ObjectSpecification},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

fn whole_object() -> i64 {
    -1
}

/// Query params for `GET /download/{object_id}`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub offset: i64,
    /// Negative means "to the end of the object".
    #[serde(default = "whole_object")]
    pub length: i64,
    #[serde(default)]
    pub external: bool,
}

pub async fn download(
    State(state): State<AppState>,
    Path(object_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<ObjectSpecification>, AppError> {
    let spec = state
        .downloads
        .download(&object_id, query.offset, query.length, query.external)
        .await?;
    Ok(Json(spec))
}

pub async fn list_objects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ObjectListing>>, AppError> {
    Ok(Json(state.listings.list().await?))
}
