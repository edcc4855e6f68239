//! # NFC Mock
//!
//! Stand-in Model Service for development and integration tests. Speaks the
//! same HTTP and WebSocket protocol as the real acquisition backend with
//! simulated latencies, random predictions and configurable failures.

pub mod api;
pub mod config;
pub mod error;
pub mod store;

pub use api::{build_router, AppState};
pub use config::MockConfig;
