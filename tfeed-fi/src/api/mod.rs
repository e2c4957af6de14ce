//! HTTP API handlers for tfeed-fi

pub mod events;
pub mod health;

pub use events::event_routes;
pub use health::health_routes;
