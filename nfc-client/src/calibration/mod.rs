//! Feature calibration: registry, countdown and the controller sequencing them

pub mod controller;
pub mod registry;
pub mod timer;

pub use controller::CalibrationController;
pub use registry::{Feature, FeatureRegistry};
pub use timer::{RecordingSession, RecordingTimer, TickOutcome, DEFAULT_RECORDING_SECS};
