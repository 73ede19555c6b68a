//! Read access to the catalog store
//!
//! The decision layer never owns persistence; it issues queries through
//! [`CatalogStore`]. Store errors propagate unchanged, with no retry.

use async_trait::async_trait;
use aviary_common::db::models::{
    parse_uuid, DetectionRecord, DetectionStats, Rarity, Species, SpeciesPhotoCount,
};
use aviary_common::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Queries the decision layer issues against the relational store
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Photos referencing `species_id` owned by `user_id`
    async fn count_species_photos(&self, species_id: Uuid, user_id: &str) -> Result<i64>;

    /// Photos owned by `user_id` with no species
    async fn count_unassigned_photos(&self, user_id: &str) -> Result<i64>;

    /// Every species of the user with its gallery size
    async fn list_species_with_photo_counts(&self, user_id: &str) -> Result<Vec<SpeciesPhotoCount>>;

    /// Every detection record of the user, all years
    async fn list_detections(&self, user_id: &str) -> Result<Vec<DetectionRecord>>;

    /// Record the resolved species of a detection record
    async fn link_detection_species(
        &self,
        user_id: &str,
        species_name: &str,
        data_year: i32,
        species_id: Uuid,
    ) -> Result<()>;

    async fn detection_stats(&self, user_id: &str) -> Result<DetectionStats>;
}

/// [`CatalogStore`] over the SQLite catalog
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

type SpeciesCountRow = (String, String, String, String, Option<String>, i64);
type DetectionRow = (String, String, i64, Option<DateTime<Utc>>, i32, Option<String>);

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn count_species_photos(&self, species_id: Uuid, user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE species_id = ? AND user_id = ?")
                .bind(species_id.to_string())
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_unassigned_photos(&self, user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE user_id = ? AND species_id IS NULL")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_species_with_photo_counts(&self, user_id: &str) -> Result<Vec<SpeciesPhotoCount>> {
        let rows = sqlx::query_as::<_, SpeciesCountRow>(
            r#"
            SELECT s.id, s.user_id, s.common_name, s.rarity, s.cover_photo_id,
                   COUNT(p.id) AS photo_count
            FROM species s
            LEFT JOIN photos p ON p.species_id = s.id AND p.user_id = s.user_id
            WHERE s.user_id = ?
            GROUP BY s.id
            ORDER BY s.common_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, user_id, common_name, rarity, cover_photo_id, photo_count)| -> Result<SpeciesPhotoCount> {
                Ok(SpeciesPhotoCount {
                    species: Species {
                        id: parse_uuid("species.id", &id)?,
                        user_id,
                        common_name,
                        rarity: rarity.parse::<Rarity>()?,
                        cover_photo_id: cover_photo_id
                            .as_deref()
                            .map(|v| parse_uuid("species.cover_photo_id", v))
                            .transpose()?,
                    },
                    photo_count,
                })
            })
            .collect()
    }

    async fn list_detections(&self, user_id: &str) -> Result<Vec<DetectionRecord>> {
        let rows = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT user_id, species_name, yearly_count, last_heard_at, data_year, species_id
            FROM detections
            WHERE user_id = ?
            ORDER BY data_year DESC, species_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(user_id, species_name, yearly_count, last_heard_at, data_year, species_id)| -> Result<DetectionRecord> {
                Ok(DetectionRecord {
                    user_id,
                    species_name,
                    yearly_count,
                    last_heard_at,
                    data_year,
                    species_id: species_id
                        .as_deref()
                        .map(|v| parse_uuid("detections.species_id", v))
                        .transpose()?,
                })
            })
            .collect()
    }

    async fn link_detection_species(
        &self,
        user_id: &str,
        species_name: &str,
        data_year: i32,
        species_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE detections SET species_id = ?
            WHERE user_id = ? AND species_name = ? AND data_year = ?
            "#,
        )
        .bind(species_id.to_string())
        .bind(user_id)
        .bind(species_name)
        .bind(data_year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn detection_stats(&self, user_id: &str) -> Result<DetectionStats> {
        let (total_records, total_detections, matched_records, last_heard_at): (
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(yearly_count), 0),
                   COUNT(species_id),
                   MAX(last_heard_at)
            FROM detections
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DetectionStats {
            total_records,
            total_detections,
            matched_records,
            unmatched_records: total_records - matched_records,
            last_heard_at,
        })
    }
}
