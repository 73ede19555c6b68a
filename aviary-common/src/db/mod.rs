//! Database models, schema initialization and catalog write commands

pub mod init;
pub mod models;
pub mod queries;

pub use init::*;
pub use models::*;
