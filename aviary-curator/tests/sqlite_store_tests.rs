//! Tests for the SQLite catalog store and the decision layer on top of it
//!
//! Covers:
//! - Photo counts scoped by user and species
//! - Species listing with gallery sizes
//! - Detection listing, linking and statistics
//! - Suggestions and capacity checks against a real database

use aviary_common::db::init_database;
use aviary_common::db::models::{DetectionRecord, Photo, Rarity, Species};
use aviary_common::db::queries;
use aviary_common::ManualClock;
use aviary_curator::capacity::CapacityManager;
use aviary_curator::store::{CatalogStore, SqliteCatalogStore};
use aviary_curator::suggestions::SuggestionEngine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const USER: &str = "user_1";
const OTHER: &str = "user_2";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 15, 18, 0, 0).unwrap()
}

async fn setup() -> (tempfile::TempDir, SqlitePool, Arc<SqliteCatalogStore>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("aviary.db")).await.unwrap();
    let store = Arc::new(SqliteCatalogStore::new(pool.clone()));
    (dir, pool, store)
}

async fn add_species(pool: &SqlitePool, user_id: &str, name: &str, rarity: Rarity) -> Uuid {
    let species = Species {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        common_name: name.to_string(),
        rarity,
        cover_photo_id: None,
    };
    queries::insert_species(pool, &species).await.unwrap();
    species.id
}

async fn add_photos(pool: &SqlitePool, user_id: &str, species_id: Option<Uuid>, count: usize) {
    for _ in 0..count {
        let photo = Photo {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            species_id,
            is_favorite: false,
            uploaded_at: now(),
        };
        queries::insert_photo(pool, &photo).await.unwrap();
    }
}

async fn add_detection(
    pool: &SqlitePool,
    user_id: &str,
    name: &str,
    yearly_count: i64,
    last_heard_at: Option<DateTime<Utc>>,
    data_year: i32,
) {
    let record = DetectionRecord {
        user_id: user_id.to_string(),
        species_name: name.to_string(),
        yearly_count,
        last_heard_at,
        data_year,
        species_id: None,
    };
    queries::upsert_detection(pool, &record).await.unwrap();
}

#[tokio::test]
async fn test_photo_counts_are_scoped_to_user() {
    let (_dir, pool, store) = setup().await;
    let jay = add_species(&pool, USER, "Blue Jay", Rarity::Common).await;
    add_photos(&pool, USER, Some(jay), 3).await;
    add_photos(&pool, USER, None, 2).await;
    add_photos(&pool, OTHER, None, 5).await;

    assert_eq!(store.count_species_photos(jay, USER).await.unwrap(), 3);
    assert_eq!(store.count_species_photos(jay, OTHER).await.unwrap(), 0);
    assert_eq!(store.count_unassigned_photos(USER).await.unwrap(), 2);
    assert_eq!(store.count_unassigned_photos(OTHER).await.unwrap(), 5);
}

#[tokio::test]
async fn test_list_species_with_photo_counts() {
    let (_dir, pool, store) = setup().await;
    let wren = add_species(&pool, USER, "Carolina Wren", Rarity::Uncommon).await;
    add_species(&pool, USER, "American Robin", Rarity::Common).await;
    add_species(&pool, OTHER, "Barred Owl", Rarity::Rare).await;
    add_photos(&pool, USER, Some(wren), 4).await;

    let listed = store.list_species_with_photo_counts(USER).await.unwrap();
    let summary: Vec<(&str, Rarity, i64)> = listed
        .iter()
        .map(|s| (s.species.common_name.as_str(), s.species.rarity, s.photo_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("American Robin", Rarity::Common, 0),
            ("Carolina Wren", Rarity::Uncommon, 4),
        ]
    );
}

#[tokio::test]
async fn test_link_and_stats() {
    let (_dir, pool, store) = setup().await;
    let jay = add_species(&pool, USER, "Blue Jay", Rarity::Common).await;
    let heard = now() - Duration::hours(3);
    add_detection(&pool, USER, "  BLUE jay", 40, Some(heard), 2024).await;
    add_detection(&pool, USER, "Mystery Bird", 12, None, 2024).await;

    let stats = store.detection_stats(USER).await.unwrap();
    assert_eq!(stats.total_records, 2);
    assert_eq!(stats.total_detections, 52);
    assert_eq!(stats.matched_records, 0);
    assert_eq!(stats.last_heard_at, Some(heard));

    let engine = SuggestionEngine::new(store.clone(), Arc::new(ManualClock::new(now())));
    assert_eq!(engine.link_detections(USER).await.unwrap(), 1);
    // Already linked records are left alone
    assert_eq!(engine.link_detections(USER).await.unwrap(), 0);

    let detections = store.list_detections(USER).await.unwrap();
    let linked = detections
        .iter()
        .find(|d| d.species_name == "  BLUE jay")
        .unwrap();
    assert_eq!(linked.species_id, Some(jay));

    let stats = store.detection_stats(USER).await.unwrap();
    assert_eq!(stats.matched_records, 1);
    assert_eq!(stats.unmatched_records, 1);
}

#[tokio::test]
async fn test_stats_for_user_without_detections() {
    let (_dir, _pool, store) = setup().await;
    let stats = store.detection_stats(USER).await.unwrap();
    assert_eq!(stats.total_records, 0);
    assert_eq!(stats.total_detections, 0);
    assert_eq!(stats.last_heard_at, None);
}

#[tokio::test]
async fn test_suggestions_end_to_end() {
    let (_dir, pool, store) = setup().await;
    let robin = add_species(&pool, USER, "American Robin", Rarity::Common).await;
    let owl = add_species(&pool, USER, "Barred Owl", Rarity::Rare).await;
    let jay = add_species(&pool, USER, "Blue Jay", Rarity::Common).await;
    // Another user's species of the same name is never a candidate
    add_species(&pool, OTHER, "Snowy Owl", Rarity::Rare).await;

    add_photos(&pool, USER, Some(jay), 8).await;
    add_detection(&pool, USER, "American Robin", 120, Some(now() - Duration::hours(30)), 2024).await;
    add_detection(&pool, USER, "barred owl", 60, Some(now() - Duration::hours(2)), 2024).await;
    add_detection(&pool, USER, "Blue Jay", 80, None, 2024).await;
    add_detection(&pool, USER, "Snowy Owl", 300, None, 2024).await;
    // Older year for the robin is ignored in favor of 2024
    add_detection(&pool, USER, "American Robin", 5, None, 2023).await;

    let engine = SuggestionEngine::new(store.clone(), Arc::new(ManualClock::new(now())));
    let suggestions = engine.get_photo_suggestions(USER, 10).await.unwrap();

    // robin: 19.2 + 40 + 5 + 5 = 69.2, owl: 9.6 + 40 + 15 - 5 = 59.6,
    // jay: 12.8 + 0 + 0 + 5 = 17.8
    let ranked: Vec<(Uuid, u8)> = suggestions.iter().map(|s| (s.species_id, s.score)).collect();
    assert_eq!(ranked, vec![(robin, 69), (owl, 60), (jay, 18)]);
    assert_eq!(suggestions[0].yearly_count, 120);
    assert!(suggestions[1].reason.contains("Not photographed"));

    let top = engine.get_photo_suggestions(USER, 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].species_id, robin);
}

#[tokio::test]
async fn test_capacity_against_database() {
    let (_dir, pool, store) = setup().await;
    let jay = add_species(&pool, USER, "Blue Jay", Rarity::Common).await;
    add_photos(&pool, USER, Some(jay), 8).await;
    add_photos(&pool, USER, None, 24).await;

    let capacity = CapacityManager::new(store);

    let check = capacity.check_species_limit(jay, USER, None).await.unwrap();
    assert!(!check.allowed);
    assert_eq!(check.current_count, 8);

    let check = capacity
        .check_species_limit(jay, USER, Some(Uuid::new_v4()))
        .await
        .unwrap();
    assert!(check.allowed);

    let check = capacity.check_unassigned_limit(USER).await.unwrap();
    assert!(!check.allowed);
    assert_eq!(check.current_count, 24);

    let check = capacity.check_unassigned_limit(OTHER).await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.current_count, 0);
}
