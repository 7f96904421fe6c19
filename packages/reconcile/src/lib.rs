#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hierarchical reconciliation of site forecasts.
//!
//! Site-level volumes are rescaled per (date, district) so that they add up
//! to an authoritative district forecast, within clipping bounds on the
//! scale factor. Anything that prevents an exact match is reported as a
//! warning rather than an error.

pub mod proportional;
pub mod qa;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation options are out of range.
    #[error("Invalid reconcile options: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },

    /// QA summary serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scaling method used to match district totals.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReconcileMethod {
    /// Every site in a district-day is multiplied by the same factor.
    #[default]
    Proportional,
}

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Relative difference, in percent, above which a district-day is
    /// reported as out of tolerance.
    pub tolerance_pct: f64,
    /// Scaling method.
    pub method: ReconcileMethod,
    /// Lower bound on the scale factor.
    pub clip_min: f64,
    /// Upper bound on the scale factor.
    pub clip_max: f64,
    /// Capacity used to recompute `fill_pct` for sites whose registry
    /// capacity is missing or zero.
    pub default_capacity_liters: f64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance_pct: 50.0,
            method: ReconcileMethod::Proportional,
            clip_min: 0.5,
            clip_max: 2.0,
            default_capacity_liters: 1100.0,
        }
    }
}

impl ReconcileOptions {
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the tolerance is
    /// negative, a clip bound is not positive, `clip_min > clip_max`, or the
    /// default capacity is not positive.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let invalid = |message: String| Err(ReconcileError::InvalidConfig { message });

        if !self.tolerance_pct.is_finite() || self.tolerance_pct < 0.0 {
            return invalid(format!(
                "tolerance_pct must be non-negative, got {}",
                self.tolerance_pct
            ));
        }
        if !(self.clip_min.is_finite() && self.clip_min > 0.0)
            || !(self.clip_max.is_finite() && self.clip_max > 0.0)
        {
            return invalid(format!(
                "clip bounds must be positive, got [{}, {}]",
                self.clip_min, self.clip_max
            ));
        }
        if self.clip_min > self.clip_max {
            return invalid(format!(
                "clip_min {} is greater than clip_max {}",
                self.clip_min, self.clip_max
            ));
        }
        if !(self.default_capacity_liters.is_finite() && self.default_capacity_liters > 0.0) {
            return invalid(format!(
                "default_capacity_liters must be positive, got {}",
                self.default_capacity_liters
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReconcileOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_clip_bounds() {
        let options = ReconcileOptions {
            clip_min: 2.0,
            clip_max: 1.0,
            ..ReconcileOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("clip_min"));
    }

    #[test]
    fn rejects_negative_tolerance_and_zero_clip() {
        let options = ReconcileOptions {
            tolerance_pct: -1.0,
            ..ReconcileOptions::default()
        };
        assert!(options.validate().is_err());

        let options = ReconcileOptions {
            clip_min: 0.0,
            ..ReconcileOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn method_parses_from_name() {
        assert_eq!(
            "proportional".parse::<ReconcileMethod>().unwrap(),
            ReconcileMethod::Proportional
        );
        assert!("top_down".parse::<ReconcileMethod>().is_err());
    }
}
