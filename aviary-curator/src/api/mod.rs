//! HTTP API handlers for aviary-curator

pub mod capacity;
pub mod detections;
pub mod health;
pub mod rate_limit;
pub mod suggestions;

pub use capacity::{check_inbox_capacity, check_species_capacity};
pub use detections::{get_detection_stats, link_detections};
pub use health::health_routes;
pub use rate_limit::rate_limit_middleware;
pub use suggestions::get_suggestions;
