//! Cache key scheme
//!
//! Keys are `:`-separated with the owning user right after the namespace, so
//! invalidation can clear a namespace for one user with a prefix pattern.

use uuid::Uuid;

pub const SPECIES: &str = "species";
pub const PHOTOS: &str = "photos";
pub const PHOTO: &str = "photo";
pub const DETECTIONS: &str = "detections";
pub const DETECTION_STATS: &str = "detection-stats";

/// Species listing for a user
pub fn species_list(user_id: &str) -> String {
    format!("{}:{}", SPECIES, user_id)
}

/// One species of a user
pub fn species_detail(user_id: &str, species_id: Uuid) -> String {
    format!("{}:{}:{}", SPECIES, user_id, species_id)
}

/// A photo listing for a user, e.g. `photos_list(u, "inbox")`
pub fn photos_list(user_id: &str, view: &str) -> String {
    format!("{}:{}:{}", PHOTOS, user_id, view)
}

/// Photo listing of one species gallery
pub fn species_gallery(user_id: &str, species_id: Uuid) -> String {
    photos_list(user_id, &format!("species:{}", species_id))
}

pub fn photo(photo_id: Uuid) -> String {
    format!("{}:{}", PHOTO, photo_id)
}

/// A detection listing for a user
pub fn detections_list(user_id: &str, view: &str) -> String {
    format!("{}:{}:{}", DETECTIONS, user_id, view)
}

pub fn detection_stats(user_id: &str) -> String {
    format!("{}:{}", DETECTION_STATS, user_id)
}
