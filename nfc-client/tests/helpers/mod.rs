//! Test helpers for nfc-client integration tests
//!
//! - TestSession: orchestrator over a simulated Model Service, with an
//!   event recorder
//! - MockServer: nfc-mock bound to an ephemeral port

#![allow(dead_code)]

pub mod mock_server;
pub mod test_session;

pub use mock_server::MockServer;
pub use test_session::TestSession;
