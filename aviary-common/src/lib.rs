//! # Aviary Common Library
//!
//! Shared code for the aviary catalog services including:
//! - Database models and schema initialization
//! - Configuration loading
//! - Clock abstraction used by time-sensitive components
//! - Species name normalization

pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod time;

pub use error::{Error, Result};
pub use normalize::normalize;
pub use time::{Clock, ManualClock, SystemClock};
