//! Capacity check API
//!
//! Upload and assignment flows ask here before writing. A full gallery or inbox
//! answers 200 with `allowed: false`; it is not an error.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::capacity::CapacityCheck;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SpeciesCapacityQuery {
    pub replace_photo_id: Option<String>,
}

fn parse_id(name: &str, value: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", name, value)))
}

/// GET /api/users/:user_id/capacity/species/:species_id?replace_photo_id=
pub async fn check_species_capacity(
    State(state): State<AppState>,
    Path((user_id, species_id)): Path<(String, String)>,
    Query(query): Query<SpeciesCapacityQuery>,
) -> ApiResult<Json<CapacityCheck>> {
    let species_id = parse_id("species_id", &species_id)?;
    let replace_photo_id = query
        .replace_photo_id
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| parse_id("replace_photo_id", v))
        .transpose()?;

    let check = state
        .capacity
        .check_species_limit(species_id, &user_id, replace_photo_id)
        .await?;
    Ok(Json(check))
}

/// GET /api/users/:user_id/capacity/inbox
pub async fn check_inbox_capacity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CapacityCheck>> {
    Ok(Json(state.capacity.check_unassigned_limit(&user_id).await?))
}
