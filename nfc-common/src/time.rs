//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Scale a nominal latency by a floating point factor
///
/// Negative and non-finite factors collapse to zero so a misconfigured
/// scale can never produce a panicking `Duration`.
pub fn scale_duration(nominal: std::time::Duration, factor: f64) -> std::time::Duration {
    if !factor.is_finite() || factor <= 0.0 {
        return std::time::Duration::ZERO;
    }
    nominal.mul_f64(factor)
}
