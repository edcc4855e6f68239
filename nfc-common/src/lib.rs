//! # NFC Common Library
//!
//! Shared code for the Neural Feature Calibration client and mock service:
//! - Model Service wire types (HTTP JSON bodies, WebSocket push messages)
//! - Event types (CalibrationEvent enum) and the EventBus
//! - Configuration loading and logging setup
//! - Timestamp helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use api::types::Prediction;
pub use error::{Error, Result};
