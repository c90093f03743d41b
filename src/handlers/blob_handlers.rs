//! Serves the bytes behind signed URLs.
//! Streams object bodies to avoid buffering in memory; the signature is the
//! only credential checked.

use crate::{errors::AppError, services::url_signer::SignedParams, state::AppState};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

/// Signed query parameters of a blob URL.
#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub expires: i64,
    pub range: Option<String>,
    pub signature: String,
}

/// `GET /blob/{bucket}/{*key}`: stream the granted window of an object.
pub async fn get_blob(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<BlobQuery>,
) -> Result<Response, AppError> {
    let params = SignedParams {
        expires: query.expires,
        range: query.range.as_deref(),
        signature: &query.signature,
    };
    let granted = state.signer.verify(&bucket, &key, &params, Utc::now())?;

    let ranged = granted.is_some();
    let opened = state.blobs.open_range(&bucket, &key, granted).await?;
    let len = opened.range.end.saturating_sub(opened.range.start);
    let body = Body::from_stream(ReaderStream::new(opened.file.take(len)));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if ranged && len > 0 {
        let content_range = format!(
            "bytes {}-{}/{}",
            opened.range.start,
            opened.range.end - 1,
            opened.object_size
        );
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            headers.insert(header::CONTENT_RANGE, value);
        }
        *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    }

    Ok(response)
}
