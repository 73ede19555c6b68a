//! Database initialization
//!
//! Creates the catalog tables on first run. Capacity ceilings are also enforced
//! here by triggers, so concurrent writers that both passed an application-level
//! capacity check cannot push a gallery or inbox past its ceiling.

use crate::db::models::{MAX_PHOTOS_PER_SPECIES, MAX_UNASSIGNED_PHOTOS};
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Error text raised by the species gallery trigger
pub const SPECIES_LIMIT_ABORT: &str = "species photo limit reached";

/// Error text raised by the inbox trigger
pub const INBOX_LIMIT_ABORT: &str = "unassigned photo limit reached";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all catalog tables, indexes and triggers (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_species_table(pool).await?;
    create_photos_table(pool).await?;
    create_detections_table(pool).await?;
    create_capacity_triggers(pool).await?;
    Ok(())
}

async fn create_species_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS species (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            common_name TEXT NOT NULL,
            rarity TEXT NOT NULL DEFAULT 'common'
                CHECK (rarity IN ('common', 'uncommon', 'rare')),
            cover_photo_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_species_user_id ON species(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_photos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            species_id TEXT REFERENCES species(id),
            is_favorite INTEGER NOT NULL DEFAULT 0,
            uploaded_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_user_species ON photos(user_id, species_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_detections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            species_name TEXT NOT NULL,
            yearly_count INTEGER NOT NULL DEFAULT 0,
            last_heard_at TIMESTAMP,
            data_year INTEGER NOT NULL,
            species_id TEXT REFERENCES species(id) ON DELETE SET NULL,
            UNIQUE (user_id, species_name, data_year)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_detections_user_id ON detections(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Triggers capping photos per (user, species) and unassigned photos per user
async fn create_capacity_triggers(pool: &SqlitePool) -> Result<()> {
    let species_count = format!(
        "(SELECT COUNT(*) FROM photos WHERE user_id = NEW.user_id AND species_id = NEW.species_id) >= {}",
        MAX_PHOTOS_PER_SPECIES
    );
    let inbox_count = format!(
        "(SELECT COUNT(*) FROM photos WHERE user_id = NEW.user_id AND species_id IS NULL) >= {}",
        MAX_UNASSIGNED_PHOTOS
    );

    let statements = [
        format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_photos_species_limit_insert
            BEFORE INSERT ON photos
            WHEN NEW.species_id IS NOT NULL AND {species_count}
            BEGIN
                SELECT RAISE(ABORT, '{SPECIES_LIMIT_ABORT}');
            END
            "#
        ),
        format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_photos_species_limit_update
            BEFORE UPDATE OF species_id ON photos
            WHEN NEW.species_id IS NOT NULL
                AND NEW.species_id IS NOT OLD.species_id
                AND {species_count}
            BEGIN
                SELECT RAISE(ABORT, '{SPECIES_LIMIT_ABORT}');
            END
            "#
        ),
        format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_photos_inbox_limit_insert
            BEFORE INSERT ON photos
            WHEN NEW.species_id IS NULL AND {inbox_count}
            BEGIN
                SELECT RAISE(ABORT, '{INBOX_LIMIT_ABORT}');
            END
            "#
        ),
        format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_photos_inbox_limit_update
            BEFORE UPDATE OF species_id ON photos
            WHEN NEW.species_id IS NULL
                AND OLD.species_id IS NOT NULL
                AND {inbox_count}
            BEGIN
                SELECT RAISE(ABORT, '{INBOX_LIMIT_ABORT}');
            END
            "#
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
