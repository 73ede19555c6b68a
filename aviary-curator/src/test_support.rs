//! In-memory catalog store for unit tests

use async_trait::async_trait;
use aviary_common::db::models::{
    DetectionRecord, DetectionStats, Rarity, Species, SpeciesPhotoCount,
};
use aviary_common::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::store::CatalogStore;

/// Canned answers for [`CatalogStore`]; `fail` turns every call into an error
#[derive(Default)]
pub struct FakeStore {
    pub species_photo_count: i64,
    pub unassigned_photo_count: i64,
    pub species: Vec<SpeciesPhotoCount>,
    pub detections: Vec<DetectionRecord>,
    pub fail: bool,
    /// Calls to `link_detection_species` as (species_name, data_year, species_id)
    pub links: Mutex<Vec<(String, i32, Uuid)>>,
}

impl FakeStore {
    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(Error::Internal("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for FakeStore {
    async fn count_species_photos(&self, _species_id: Uuid, _user_id: &str) -> Result<i64> {
        self.check()?;
        Ok(self.species_photo_count)
    }

    async fn count_unassigned_photos(&self, _user_id: &str) -> Result<i64> {
        self.check()?;
        Ok(self.unassigned_photo_count)
    }

    async fn list_species_with_photo_counts(&self, _user_id: &str) -> Result<Vec<SpeciesPhotoCount>> {
        self.check()?;
        Ok(self.species.clone())
    }

    async fn list_detections(&self, _user_id: &str) -> Result<Vec<DetectionRecord>> {
        self.check()?;
        Ok(self.detections.clone())
    }

    async fn link_detection_species(
        &self,
        _user_id: &str,
        species_name: &str,
        data_year: i32,
        species_id: Uuid,
    ) -> Result<()> {
        self.check()?;
        self.links
            .lock()
            .unwrap()
            .push((species_name.to_string(), data_year, species_id));
        Ok(())
    }

    async fn detection_stats(&self, _user_id: &str) -> Result<DetectionStats> {
        self.check()?;
        let total_records = self.detections.len() as i64;
        let matched_records = self
            .detections
            .iter()
            .filter(|d| d.species_id.is_some())
            .count() as i64;
        Ok(DetectionStats {
            total_records,
            total_detections: self.detections.iter().map(|d| d.yearly_count).sum(),
            matched_records,
            unmatched_records: total_records - matched_records,
            last_heard_at: self.detections.iter().filter_map(|d| d.last_heard_at).max(),
        })
    }
}

pub fn species(common_name: &str, rarity: Rarity, photo_count: i64) -> SpeciesPhotoCount {
    SpeciesPhotoCount {
        species: Species {
            id: Uuid::new_v4(),
            user_id: "u".to_string(),
            common_name: common_name.to_string(),
            rarity,
            cover_photo_id: None,
        },
        photo_count,
    }
}

pub fn detection(
    species_name: &str,
    yearly_count: i64,
    last_heard_at: Option<DateTime<Utc>>,
    data_year: i32,
) -> DetectionRecord {
    DetectionRecord {
        user_id: "u".to_string(),
        species_name: species_name.to_string(),
        yearly_count,
        last_heard_at,
        data_year,
        species_id: None,
    }
}
