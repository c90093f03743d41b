//! Defines the gateway's HTTP surface.
//!
//! ## Structure
//! - **Token-gated endpoints** (bearer token with the download scope)
//!   - `GET /download/{object_id}?offset=&length=&external=` download specification
//!   - `GET /listing` object listings across every data partition
//!   - `GET /entities?gnosId=` entity records
//!
//! - **Signed endpoints** (the URL is the credential)
//!   - `GET /blob/{bucket}/{*key}?expires=&range=&signature=`
//!
//! - **Health**
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    auth::{AuthState, require_scope},
    handlers::{
        blob_handlers::get_blob,
        download_handlers::{download, list_objects},
        entity_handlers::find_entities,
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

/// Build the full router with its state applied.
pub fn routes(state: AppState, auth: AuthState) -> Router {
    if auth.tokens.is_empty() {
        tracing::warn!("No access tokens configured; gateway API is open to every caller");
    }

    let gated = Router::new()
        .route("/download/{object_id}", get(download))
        .route("/listing", get(list_objects))
        .route("/entities", get(find_entities))
        .route_layer(middleware::from_fn_with_state(auth, require_scope));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/blob/{bucket}/{*key}", get(get_blob))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
