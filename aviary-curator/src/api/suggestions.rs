//! Photo suggestion API

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::suggestions::{Suggestion, MAX_SUGGESTIONS};
use crate::AppState;

pub const DEFAULT_SUGGESTIONS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResponse {
    pub user_id: String,
    pub suggestions: Vec<Suggestion>,
}

/// GET /api/users/:user_id/suggestions?limit=
///
/// `limit` defaults to 10 and must lie in 1..=50.
pub async fn get_suggestions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<SuggestionsQuery>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTIONS);
    if !(1..=MAX_SUGGESTIONS).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}, got {}",
            MAX_SUGGESTIONS, limit
        )));
    }

    let suggestions = state.suggestions.get_photo_suggestions(&user_id, limit).await?;

    Ok(Json(SuggestionsResponse {
        user_id,
        suggestions,
    }))
}
