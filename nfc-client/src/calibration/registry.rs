//! Feature Registry
//!
//! Ordered set of named features with their calibration marks. Insertion
//! order is display order.

use crate::error::{CalibrationError, Result};
use serde::{Deserialize, Serialize};

/// A registered feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub calibrated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an uncalibrated feature
    ///
    /// Fails with `DuplicateFeature` when `name` is empty or already present.
    /// Surrounding whitespace is not part of the name.
    pub fn add(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return Err(CalibrationError::DuplicateFeature(name.to_string()));
        }
        self.features.push(Feature {
            name: name.to_string(),
            calibrated: false,
        });
        Ok(())
    }

    /// Remove a feature and its calibration mark; returns whether it existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.features.len();
        self.features.retain(|f| f.name != name);
        self.features.len() != before
    }

    /// Mark `name` calibrated; no-op when absent
    pub fn mark_calibrated(&mut self, name: &str) {
        if let Some(feature) = self.features.iter_mut().find(|f| f.name == name) {
            feature.calibrated = true;
        }
    }

    pub fn is_fully_calibrated(&self) -> bool {
        !self.features.is_empty() && self.features.iter().all(|f| f.calibrated)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name)
    }

    pub fn is_calibrated(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name && f.calibrated)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
