use crate::{errors::AppError, models::entity::Entity, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityQuery {
    pub gnos_id: Option<String>,
}

/// `GET /entities[?gnosId=]`
pub async fn find_entities(
    State(state): State<AppState>,
    Query(query): Query<EntityQuery>,
) -> Result<Json<Vec<Entity>>, AppError> {
    let entities = state
        .metadata
        .find_entities(query.gnos_id.as_deref())
        .await?;
    Ok(Json(entities))
}
