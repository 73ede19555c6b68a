//! Detection statistics and linking API

use aviary_common::db::models::DetectionStats;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::cache::{invalidation, keys};
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/users/:user_id/detections/stats
///
/// Read through the cache under `detection-stats:{user_id}`.
pub async fn get_detection_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<DetectionStats>> {
    let store = state.store.clone();
    let stats = state
        .cache
        .get_or_fetch_shared(
            &keys::detection_stats(&user_id),
            || async { store.detection_stats(&user_id).await },
            state.cache.default_ttl(),
        )
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub linked: usize,
    pub invalidated: usize,
}

/// POST /api/users/:user_id/detections/link
///
/// Resolve unlinked detection records to species, then drop cached detection
/// read models of the user.
pub async fn link_detections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<LinkResponse>> {
    let linked = state.suggestions.link_detections(&user_id).await?;
    let invalidated = if linked > 0 {
        invalidation::invalidate_detections(&state.cache, &user_id)?
    } else {
        0
    };

    info!(user_id = %user_id, linked, invalidated, "Linked detections");
    Ok(Json(LinkResponse { linked, invalidated }))
}
