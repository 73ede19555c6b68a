//! Photo suggestion engine
//!
//! Ranks which cataloged species a user should photograph next, from yearly
//! acoustic detection counts and the size of each species' gallery.
//!
//! The priority score (0..=100) is the clamped, rounded sum of four terms:
//!
//! | term       | value                                                  | range        |
//! |------------|--------------------------------------------------------|--------------|
//! | detection  | `min(yearly / 250, 1) * 40`                            | 0..=40       |
//! | deficit    | `max(0, (yearly - photos * 10) / yearly) * 40`         | 0..=40       |
//! | recency    | 15 if heard within 8h, 10 within 24h, 5 within 48h     | {0,5,10,15}  |
//! | difficulty | +5 common, 0 uncommon, -5 rare                         | {-5,0,5}     |

use aviary_common::db::models::{DetectionRecord, Rarity, SpeciesPhotoCount};
use aviary_common::{normalize, Clock, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::CatalogStore;

/// Species detected fewer times than this in a year are never suggested
pub const MIN_YEARLY_DETECTIONS: i64 = 10;

/// Yearly detections at which the detection term saturates
pub const DETECTION_SATURATION: f64 = 250.0;

pub const DETECTION_WEIGHT: f64 = 40.0;
pub const DEFICIT_WEIGHT: f64 = 40.0;

/// Detections one existing photo offsets in the deficit ratio
pub const DETECTIONS_PER_PHOTO: f64 = 10.0;

/// Score nudge for common (+) and rare (-) species
pub const DIFFICULTY_MODIFIER: f64 = 5.0;

/// (heard within, bonus) tiers, checked in order
pub const RECENCY_TIERS: [(i64, f64); 3] = [(8, 15.0), (24, 10.0), (48, 5.0)];

/// Capture rate (percent) below which a species counts as under-documented
pub const LOW_CAPTURE_RATE_PERCENT: f64 = 5.0;

pub const MAX_SUGGESTIONS: usize = 50;

/// The four score terms before summing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub detection: f64,
    pub deficit: f64,
    pub recency: f64,
    pub difficulty: f64,
}

impl ScoreBreakdown {
    /// Sum of the terms, clamped to 0..=100 and rounded
    pub fn total(&self) -> u8 {
        let sum = self.detection + self.deficit + self.recency + self.difficulty;
        sum.clamp(0.0, 100.0).round() as u8
    }
}

/// Signals for one candidate species
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestionInput {
    pub yearly_count: i64,
    pub photo_count: i64,
    pub last_heard_at: Option<DateTime<Utc>>,
    pub rarity: Rarity,
}

/// A ranked species to photograph next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub species_id: Uuid,
    pub common_name: String,
    pub rarity: Rarity,
    pub yearly_count: i64,
    pub photo_count: i64,
    pub last_heard_at: Option<DateTime<Utc>>,
    pub score: u8,
    pub reason: String,
}

fn detection_score(yearly_count: i64) -> f64 {
    let yearly = yearly_count.max(0) as f64;
    (yearly / DETECTION_SATURATION).min(1.0) * DETECTION_WEIGHT
}

fn deficit_score(yearly_count: i64, photo_count: i64) -> f64 {
    if yearly_count <= 0 {
        return 0.0;
    }
    let yearly = yearly_count as f64;
    let offset = photo_count.max(0) as f64 * DETECTIONS_PER_PHOTO;
    ((yearly - offset) / yearly).max(0.0) * DEFICIT_WEIGHT
}

/// Time since last heard; a future timestamp counts as just heard
fn heard_ago(last_heard_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    last_heard_at.map(|heard| (now - heard).max(Duration::zero()))
}

fn recency_bonus(last_heard_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(ago) = heard_ago(last_heard_at, now) else {
        return 0.0;
    };

    RECENCY_TIERS
        .iter()
        .find(|(hours, _)| ago <= Duration::hours(*hours))
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0.0)
}

fn difficulty_modifier(rarity: Rarity) -> f64 {
    match rarity {
        Rarity::Common => DIFFICULTY_MODIFIER,
        Rarity::Uncommon => 0.0,
        Rarity::Rare => -DIFFICULTY_MODIFIER,
    }
}

pub fn score_breakdown(
    yearly_count: i64,
    photo_count: i64,
    last_heard_at: Option<DateTime<Utc>>,
    rarity: Rarity,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        detection: detection_score(yearly_count),
        deficit: deficit_score(yearly_count, photo_count),
        recency: recency_bonus(last_heard_at, now),
        difficulty: difficulty_modifier(rarity),
    }
}

/// Priority score in 0..=100
pub fn calculate_priority_score(
    yearly_count: i64,
    photo_count: i64,
    last_heard_at: Option<DateTime<Utc>>,
    rarity: Rarity,
    now: DateTime<Utc>,
) -> u8 {
    score_breakdown(yearly_count, photo_count, last_heard_at, rarity, now).total()
}

/// One-line explanation of why a species is suggested
///
/// The first matching rule wins: no photos yet, low capture rate, heard
/// recently, then a generic frequent-visitor line.
pub fn generate_reason(data: &SuggestionInput, now: DateTime<Utc>) -> String {
    let yearly = data.yearly_count;
    let photos = data.photo_count;

    if photos == 0 {
        return format!("Not photographed yet, heard {} times this year", yearly);
    }

    if yearly > 0 {
        let capture_rate = photos as f64 / (yearly as f64 / DETECTIONS_PER_PHOTO) * 100.0;
        if capture_rate < LOW_CAPTURE_RATE_PERCENT {
            let noun = if photos == 1 { "photo" } else { "photos" };
            return format!("Heard {}× but only {} {}", yearly, photos, noun);
        }
    }

    if let Some(ago) = heard_ago(data.last_heard_at, now) {
        if ago <= Duration::hours(8) {
            return "Active right now, heard in the last 8 hours".to_string();
        }
        if ago <= Duration::hours(24) {
            return "Heard today, good chance it is still around".to_string();
        }
    }

    format!("Frequent visitor with {} detections this year", yearly)
}

/// Highest score first; ties broken by more detections, then species id
fn rank(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.yearly_count.cmp(&a.yearly_count))
        .then_with(|| a.species_id.cmp(&b.species_id))
}

/// Computes suggestions from the catalog store
#[derive(Clone)]
pub struct SuggestionEngine {
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
}

impl SuggestionEngine {
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Top `limit` suggestions for a user, best first
    ///
    /// `limit` is clamped into 1..=[`MAX_SUGGESTIONS`].
    pub async fn get_photo_suggestions(&self, user_id: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let limit = limit.clamp(1, MAX_SUGGESTIONS);
        let now = self.clock.now();

        let mut suggestions: Vec<Suggestion> = self
            .candidates(user_id)
            .await?
            .into_iter()
            .map(|(entry, detection)| {
                let input = SuggestionInput {
                    yearly_count: detection.yearly_count,
                    photo_count: entry.photo_count,
                    last_heard_at: detection.last_heard_at,
                    rarity: entry.species.rarity,
                };
                Suggestion {
                    species_id: entry.species.id,
                    common_name: entry.species.common_name,
                    rarity: input.rarity,
                    yearly_count: input.yearly_count,
                    photo_count: input.photo_count,
                    last_heard_at: input.last_heard_at,
                    score: calculate_priority_score(
                        input.yearly_count,
                        input.photo_count,
                        input.last_heard_at,
                        input.rarity,
                        now,
                    ),
                    reason: generate_reason(&input, now),
                }
            })
            .collect();

        suggestions.sort_by(rank);
        suggestions.truncate(limit);

        debug!(user_id = %user_id, count = suggestions.len(), "Computed photo suggestions");
        Ok(suggestions)
    }

    /// Resolve unlinked detection records to species by normalized name
    ///
    /// Returns how many records were linked.
    pub async fn link_detections(&self, user_id: &str) -> Result<usize> {
        let species = self.store.list_species_with_photo_counts(user_id).await?;
        let index = SpeciesIndex::new(&species);
        let detections = self.store.list_detections(user_id).await?;

        let mut linked = 0;
        for detection in &detections {
            if detection
                .species_id
                .is_some_and(|id| index.by_id.contains_key(&id))
            {
                continue;
            }
            if let Some(entry) = index.by_name.get(&normalize(&detection.species_name)) {
                self.store
                    .link_detection_species(
                        user_id,
                        &detection.species_name,
                        detection.data_year,
                        entry.species.id,
                    )
                    .await?;
                linked += 1;
            }
        }

        if linked > 0 {
            info!(user_id = %user_id, linked, "Linked detection records to species");
        }
        Ok(linked)
    }

    /// Species with their most recent detection record, above the noise floor
    async fn candidates(&self, user_id: &str) -> Result<Vec<(SpeciesPhotoCount, DetectionRecord)>> {
        let species = self.store.list_species_with_photo_counts(user_id).await?;
        let detections = self.store.list_detections(user_id).await?;
        let index = SpeciesIndex::new(&species);

        let mut latest: HashMap<Uuid, (&SpeciesPhotoCount, &DetectionRecord)> = HashMap::new();
        for detection in &detections {
            let Some(entry) = index.resolve(detection) else {
                continue;
            };
            latest
                .entry(entry.species.id)
                .and_modify(|current| {
                    let newer = (detection.data_year, detection.yearly_count)
                        > (current.1.data_year, current.1.yearly_count);
                    if newer {
                        current.1 = detection;
                    }
                })
                .or_insert((entry, detection));
        }

        Ok(latest
            .into_values()
            .filter(|(_, detection)| detection.yearly_count >= MIN_YEARLY_DETECTIONS)
            .map(|(entry, detection)| (entry.clone(), detection.clone()))
            .collect())
    }
}

/// Lookup of a user's species by id and by normalized common name
struct SpeciesIndex<'a> {
    by_id: HashMap<Uuid, &'a SpeciesPhotoCount>,
    by_name: HashMap<String, &'a SpeciesPhotoCount>,
}

impl<'a> SpeciesIndex<'a> {
    fn new(species: &'a [SpeciesPhotoCount]) -> Self {
        let mut by_id = HashMap::with_capacity(species.len());
        let mut by_name = HashMap::with_capacity(species.len());
        for entry in species {
            by_id.insert(entry.species.id, entry);
            by_name
                .entry(normalize(&entry.species.common_name))
                .or_insert(entry);
        }
        Self { by_id, by_name }
    }

    /// Species a detection refers to: its stored reference if it belongs to
    /// this user, else a normalized-name match
    fn resolve(&self, detection: &DetectionRecord) -> Option<&'a SpeciesPhotoCount> {
        detection
            .species_id
            .and_then(|id| self.by_id.get(&id).copied())
            .or_else(|| self.by_name.get(&normalize(&detection.species_name)).copied())
    }
}
