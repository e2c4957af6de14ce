//! # tfeed Common Library
//!
//! Shared code for the feed services:
//! - Feed ledger and catalog models
//! - Database initialization and runtime settings
//! - Domain event types (FeedEvent enum) and the durable event bus
//! - Scoring policy shared by the ingestor and the reader
//! - Repository traits for the feed store and its collaborators
//! - Media URL signing
//! - HTTP error and health types shared by both services

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod scoring;
pub mod signer;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use events::FeedEvent;
pub use scoring::FeedPolicy;
