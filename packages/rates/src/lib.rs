#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weekday accumulation rate estimation.
//!
//! Turns sparse, irregular service events into a per-site, per-weekday
//! daily accumulation rate. Each event's volume is divided by the number of
//! days since the previous event at the same site, and the resulting
//! contributions are averaged per weekday, falling back to a single
//! site-wide mean when the data is too sparse.

pub mod estimate;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur during rate estimation.
#[derive(Debug, Error)]
pub enum RatesError {
    /// Estimation options are out of range.
    #[error("Invalid rate options: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },

    /// The produced rows violated the seven-weekday invariant.
    #[error(transparent)]
    InvalidTable(#[from] waste_forecast_sites_models::InvalidRateTableError),
}

/// Rate estimation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateOptions {
    /// Length of the training window ending at the cutoff, in days.
    pub window_days: i64,
    /// Minimum contributions every weekday needs before per-weekday means
    /// are used instead of the site-wide fallback.
    pub min_obs: usize,
    /// Gap assumed before a site's first event in the window. Clamped to
    /// `[1, window_days]`.
    pub first_gap_days: i64,
}

impl Default for RateOptions {
    fn default() -> Self {
        Self {
            window_days: 56,
            min_obs: 10,
            first_gap_days: 7,
        }
    }
}

impl RateOptions {
    /// Checks that the options describe a usable window.
    ///
    /// # Errors
    ///
    /// Returns [`RatesError::InvalidConfig`] if `window_days` is not
    /// positive or `min_obs` is zero.
    pub fn validate(&self) -> Result<(), RatesError> {
        if self.window_days <= 0 {
            return Err(RatesError::InvalidConfig {
                message: format!("window_days must be positive, got {}", self.window_days),
            });
        }
        if self.min_obs == 0 {
            return Err(RatesError::InvalidConfig {
                message: "min_obs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Gap used for a site's first event, bounded to `[1, window_days]`.
    #[must_use]
    pub fn bounded_first_gap(&self) -> i64 {
        self.first_gap_days.clamp(1, self.window_days.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_window() {
        let options = RateOptions {
            window_days: 0,
            ..RateOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(RatesError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_zero_min_obs() {
        let options = RateOptions {
            min_obs: 0,
            ..RateOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn first_gap_is_bounded_by_window() {
        let options = RateOptions {
            window_days: 5,
            first_gap_days: 7,
            ..RateOptions::default()
        };
        assert_eq!(options.bounded_first_gap(), 5);

        let options = RateOptions {
            first_gap_days: -3,
            ..RateOptions::default()
        };
        assert_eq!(options.bounded_first_gap(), 1);
    }
}
