//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Maximum photos kept in one species' curated gallery
pub const MAX_PHOTOS_PER_SPECIES: i64 = 8;

/// Maximum unassigned ("inbox") photos per user
pub const MAX_UNASSIGNED_PHOTOS: i64 = 24;

/// Expected photographic difficulty of a species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(Rarity::Common),
            "uncommon" => Ok(Rarity::Uncommon),
            "rare" => Ok(Rarity::Rare),
            other => Err(Error::InvalidInput(format!("Unknown rarity: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: Uuid,
    pub user_id: String,
    pub common_name: String,
    pub rarity: Rarity,
    pub cover_photo_id: Option<Uuid>,
}

/// A photo; `species_id = None` means it sits in the user's inbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub user_id: String,
    pub species_id: Option<Uuid>,
    pub is_favorite: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// Yearly acoustic detection aggregate, keyed by the device's raw species name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub user_id: String,
    pub species_name: String,
    pub yearly_count: i64,
    pub last_heard_at: Option<DateTime<Utc>>,
    pub data_year: i32,
    pub species_id: Option<Uuid>,
}

/// A species together with the size of its gallery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesPhotoCount {
    pub species: Species,
    pub photo_count: i64,
}

/// Aggregate detection figures for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total_records: i64,
    pub total_detections: i64,
    pub matched_records: i64,
    pub unmatched_records: i64,
    pub last_heard_at: Option<DateTime<Utc>>,
}

/// Parse a TEXT uuid column
pub fn parse_uuid(column: &str, value: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in {}: {} ({})", column, value, e)))
}
