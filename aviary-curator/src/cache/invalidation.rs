//! Domain cache-coherence rules
//!
//! Mutation handlers call these right after a successful write. The rules are
//! coarse on purpose: whole per-user namespaces are cleared instead of
//! tracking which cached listing embeds which row.
//!
//! - species change: species keys and every photo listing (listings join species)
//! - photo change: photo listings and the photo's own key
//! - detection change: detection statistics and every detection listing
//!
//! "Every listing" means every listing of the acting user. Species, photos and
//! detections are owned per user, so no other user's keys can embed the row.

use aviary_common::{Error, Result};
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use super::keys;
use super::TtlCache;

/// Pattern matching `{namespace}:{user_id}` and anything below it
fn user_namespace(namespace: &str, user_id: &str) -> Result<Regex> {
    let pattern = format!("^{}:{}(:|$)", regex::escape(namespace), regex::escape(user_id));
    Regex::new(&pattern).map_err(|e| Error::Internal(format!("Invalid cache pattern: {}", e)))
}

/// Invalidate after a species is created, edited or deleted
pub fn invalidate_species(cache: &TtlCache, user_id: &str) -> Result<usize> {
    let removed = cache.delete_pattern(&user_namespace(keys::SPECIES, user_id)?)
        + cache.delete_pattern(&user_namespace(keys::PHOTOS, user_id)?);
    debug!(user_id = %user_id, removed, "Invalidated species cache");
    Ok(removed)
}

/// Invalidate after a photo is uploaded, assigned, favorited or deleted
pub fn invalidate_photos(cache: &TtlCache, user_id: &str, photo_id: Option<Uuid>) -> Result<usize> {
    let mut removed = cache.delete_pattern(&user_namespace(keys::PHOTOS, user_id)?);
    if let Some(photo_id) = photo_id {
        if cache.delete(&keys::photo(photo_id)) {
            removed += 1;
        }
    }
    debug!(user_id = %user_id, removed, "Invalidated photo cache");
    Ok(removed)
}

/// Invalidate after detection records are ingested or relinked
pub fn invalidate_detections(cache: &TtlCache, user_id: &str) -> Result<usize> {
    let mut removed = cache.delete_pattern(&user_namespace(keys::DETECTIONS, user_id)?);
    if cache.delete(&keys::detection_stats(user_id)) {
        removed += 1;
    }
    debug!(user_id = %user_id, removed, "Invalidated detection cache");
    Ok(removed)
}

/// Invalidate every namespace of one user
pub fn invalidate_user(cache: &TtlCache, user_id: &str) -> Result<usize> {
    Ok(invalidate_species(cache, user_id)?
        + invalidate_photos(cache, user_id, None)?
        + invalidate_detections(cache, user_id)?)
}
