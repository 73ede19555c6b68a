//! Capacity manager for species galleries and the inbox
//!
//! Each species keeps a curated gallery of at most
//! [`MAX_PHOTOS_PER_SPECIES`] photos; once full, a new photo is only accepted
//! as a swap for one the user chose to drop. Unassigned photos are capped at
//! [`MAX_UNASSIGNED_PHOTOS`] with no swap option.
//!
//! Hitting a ceiling is an expected, user-facing outcome, so checks return a
//! [`CapacityCheck`] with `allowed: false` rather than an error. The check and
//! the caller's subsequent write are separate store round trips; the schema's
//! capacity triggers are what actually guarantee the ceilings under races.

pub use aviary_common::db::models::{MAX_PHOTOS_PER_SPECIES, MAX_UNASSIGNED_PHOTOS};

use aviary_common::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::store::CatalogStore;

/// Result of a capacity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityCheck {
    pub allowed: bool,
    pub current_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapacityCheck {
    fn allowed(current_count: i64) -> Self {
        Self {
            allowed: true,
            current_count,
            error: None,
        }
    }

    fn rejected(current_count: i64, error: String) -> Self {
        Self {
            allowed: false,
            current_count,
            error: Some(error),
        }
    }
}

/// Decides whether a photo may be added to a gallery or the inbox
#[derive(Clone)]
pub struct CapacityManager {
    store: Arc<dyn CatalogStore>,
}

impl CapacityManager {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn species_photo_count(&self, species_id: Uuid, user_id: &str) -> Result<i64> {
        self.store.count_species_photos(species_id, user_id).await
    }

    pub async fn unassigned_photo_count(&self, user_id: &str) -> Result<i64> {
        self.store.count_unassigned_photos(user_id).await
    }

    /// Check whether one more photo may join the species gallery
    ///
    /// At the ceiling, passing `replace_photo_id` authorizes a swap; the caller
    /// performs the delete and insert atomically.
    pub async fn check_species_limit(
        &self,
        species_id: Uuid,
        user_id: &str,
        replace_photo_id: Option<Uuid>,
    ) -> Result<CapacityCheck> {
        let current_count = self.species_photo_count(species_id, user_id).await?;

        if current_count < MAX_PHOTOS_PER_SPECIES {
            return Ok(CapacityCheck::allowed(current_count));
        }

        if let Some(replace_photo_id) = replace_photo_id {
            debug!(
                species_id = %species_id,
                replace_photo_id = %replace_photo_id,
                "Gallery full, swap authorized"
            );
            return Ok(CapacityCheck::allowed(current_count));
        }

        Ok(CapacityCheck::rejected(
            current_count,
            format!(
                "This species already has the maximum of {} photos. Choose a photo to swap out.",
                MAX_PHOTOS_PER_SPECIES
            ),
        ))
    }

    /// Check whether one more unassigned photo may be uploaded
    pub async fn check_unassigned_limit(&self, user_id: &str) -> Result<CapacityCheck> {
        let current_count = self.unassigned_photo_count(user_id).await?;

        if current_count < MAX_UNASSIGNED_PHOTOS {
            return Ok(CapacityCheck::allowed(current_count));
        }

        Ok(CapacityCheck::rejected(
            current_count,
            format!(
                "Your inbox is full ({} unassigned photos). Assign photos to a species before uploading more.",
                MAX_UNASSIGNED_PHOTOS
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;

    fn manager(species_count: i64, inbox_count: i64) -> CapacityManager {
        CapacityManager::new(Arc::new(FakeStore {
            species_photo_count: species_count,
            unassigned_photo_count: inbox_count,
            ..FakeStore::default()
        }))
    }

    #[tokio::test]
    async fn test_below_species_ceiling_allowed() {
        let check = manager(7, 0)
            .check_species_limit(Uuid::new_v4(), "u", None)
            .await
            .unwrap();
        assert_eq!(check, CapacityCheck::allowed(7));
    }

    #[tokio::test]
    async fn test_at_species_ceiling_rejected_without_replacement() {
        let check = manager(8, 0)
            .check_species_limit(Uuid::new_v4(), "u", None)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.current_count, 8);
        let message = check.error.unwrap();
        assert!(message.contains("8"), "message should mention the ceiling: {}", message);
    }

    #[tokio::test]
    async fn test_at_species_ceiling_allowed_with_replacement() {
        let check = manager(8, 0)
            .check_species_limit(Uuid::new_v4(), "u", Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.current_count, 8);
        assert!(check.error.is_none());
    }

    #[tokio::test]
    async fn test_above_species_ceiling_still_needs_replacement() {
        // Counts past the ceiling can appear transiently during a swap
        let check = manager(9, 0)
            .check_species_limit(Uuid::new_v4(), "u", None)
            .await
            .unwrap();
        assert!(!check.allowed);
    }

    #[tokio::test]
    async fn test_inbox_below_ceiling_allowed() {
        let check = manager(0, 23).check_unassigned_limit("u").await.unwrap();
        assert_eq!(check, CapacityCheck::allowed(23));
    }

    #[tokio::test]
    async fn test_inbox_at_ceiling_rejected() {
        let check = manager(0, 24).check_unassigned_limit("u").await.unwrap();
        assert!(!check.allowed);
        assert_eq!(check.current_count, 24);
        assert!(check.error.unwrap().contains("24"));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let manager = CapacityManager::new(Arc::new(FakeStore {
            fail: true,
            ..FakeStore::default()
        }));
        assert!(manager.check_unassigned_limit("u").await.is_err());
        assert!(manager
            .check_species_limit(Uuid::new_v4(), "u", Some(Uuid::new_v4()))
            .await
            .is_err());
    }

    #[test]
    fn test_check_serializes_camel_case_without_empty_error() {
        let json = serde_json::to_value(CapacityCheck::allowed(3)).unwrap();
        assert_eq!(json["allowed"], true);
        assert_eq!(json["currentCount"], 3);
        assert!(json.get("error").is_none());
    }
}
