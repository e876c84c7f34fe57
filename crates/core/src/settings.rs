use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::SessionMillis;

/// Minimum gap between two progress writes.
pub const DEFAULT_MIN_INTERVAL_MS: SessionMillis = 1_000;

/// Percent movement that counts as a new reading position.
pub const DEFAULT_CHANGE_THRESHOLD_PERCENT: f64 = 1.0;

/// How far ahead of a page's top edge the viewport top may sit and still
/// select that page, in scroll units.
pub const DEFAULT_BOUNDARY_TOLERANCE: f64 = 50.0;

/// Scroll-settle window after jumping to a saved page.
pub const DEFAULT_RESUME_SETTLE_MS: SessionMillis = 600;

/// Scroll-settle window after jumping back to page 1.
pub const DEFAULT_RESTART_SETTLE_MS: SessionMillis = 500;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("minimum write interval must be > 0 ms")]
    ZeroInterval,

    #[error("change threshold must be finite and >= 0, got {provided}")]
    InvalidThreshold { provided: f64 },

    #[error("boundary tolerance must be finite and >= 0, got {provided}")]
    InvalidTolerance { provided: f64 },
}

/// Tunables of the tracking loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub min_interval_ms: SessionMillis,
    pub change_threshold_percent: f64,
    pub boundary_tolerance: f64,
    pub resume_settle_ms: SessionMillis,
    pub restart_settle_ms: SessionMillis,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            change_threshold_percent: DEFAULT_CHANGE_THRESHOLD_PERCENT,
            boundary_tolerance: DEFAULT_BOUNDARY_TOLERANCE,
            resume_settle_ms: DEFAULT_RESUME_SETTLE_MS,
            restart_settle_ms: DEFAULT_RESTART_SETTLE_MS,
        }
    }
}

impl TrackerSettings {
    /// Check that the settings describe a usable tracker.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for a zero interval or a negative / non-finite
    /// threshold or tolerance.
    pub fn validate(self) -> Result<Self, SettingsError> {
        if self.min_interval_ms == 0 {
            return Err(SettingsError::ZeroInterval);
        }
        if !self.change_threshold_percent.is_finite() || self.change_threshold_percent < 0.0 {
            return Err(SettingsError::InvalidThreshold {
                provided: self.change_threshold_percent,
            });
        }
        if !self.boundary_tolerance.is_finite() || self.boundary_tolerance < 0.0 {
            return Err(SettingsError::InvalidTolerance {
                provided: self.boundary_tolerance,
            });
        }
        Ok(self)
    }
}
