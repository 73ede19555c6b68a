//! Catalog write commands
//!
//! Thin inserts/updates used by the catalog's CRUD handlers and by fixtures.
//! Gallery swaps go through [`replace_photo`], which deletes and inserts inside
//! one transaction so the capacity triggers see a consistent count.

use crate::db::models::{DetectionRecord, Photo, Species};
use crate::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn insert_species(pool: &SqlitePool, species: &Species) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO species (id, user_id, common_name, rarity, cover_photo_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(species.id.to_string())
    .bind(&species.user_id)
    .bind(&species.common_name)
    .bind(species.rarity.as_str())
    .bind(species.cover_photo_id.map(|id| id.to_string()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_photo(pool: &SqlitePool, photo: &Photo) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO photos (id, user_id, species_id, is_favorite, uploaded_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(photo.id.to_string())
    .bind(&photo.user_id)
    .bind(photo.species_id.map(|id| id.to_string()))
    .bind(photo.is_favorite)
    .bind(photo.uploaded_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a photo into a species gallery, or back to the inbox with `None`
pub async fn assign_photo(
    pool: &SqlitePool,
    photo_id: Uuid,
    user_id: &str,
    species_id: Option<Uuid>,
) -> Result<()> {
    let result = sqlx::query("UPDATE photos SET species_id = ? WHERE id = ? AND user_id = ?")
        .bind(species_id.map(|id| id.to_string()))
        .bind(photo_id.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Photo {}", photo_id)));
    }

    Ok(())
}

/// Atomically swap `old_photo_id` out of the gallery and insert `new_photo`
pub async fn replace_photo(pool: &SqlitePool, old_photo_id: Uuid, new_photo: &Photo) -> Result<()> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM photos WHERE id = ? AND user_id = ?")
        .bind(old_photo_id.to_string())
        .bind(&new_photo.user_id)
        .execute(&mut *tx)
        .await?;

    if deleted.rows_affected() == 0 {
        // Dropping the transaction rolls it back
        return Err(Error::NotFound(format!("Photo {}", old_photo_id)));
    }

    sqlx::query(
        r#"
        INSERT INTO photos (id, user_id, species_id, is_favorite, uploaded_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(new_photo.id.to_string())
    .bind(&new_photo.user_id)
    .bind(new_photo.species_id.map(|id| id.to_string()))
    .bind(new_photo.is_favorite)
    .bind(new_photo.uploaded_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Insert or refresh a detection aggregate, keyed by (user, raw name, year)
pub async fn upsert_detection(pool: &SqlitePool, record: &DetectionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO detections (user_id, species_name, yearly_count, last_heard_at, data_year, species_id)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, species_name, data_year) DO UPDATE SET
            yearly_count = excluded.yearly_count,
            last_heard_at = excluded.last_heard_at,
            species_id = COALESCE(excluded.species_id, detections.species_id)
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.species_name)
    .bind(record.yearly_count)
    .bind(record.last_heard_at)
    .bind(record.data_year)
    .bind(record.species_id.map(|id| id.to_string()))
    .execute(pool)
    .await?;

    Ok(())
}
