//! Database models, schema and settings

pub mod init;
pub mod models;
pub mod settings;

pub use init::*;
pub use models::*;
