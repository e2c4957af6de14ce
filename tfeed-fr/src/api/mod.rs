//! HTTP API handlers for tfeed-fr

pub mod feed;
pub mod health;

pub use feed::feed_routes;
pub use health::health_routes;
