#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Day-by-day fill simulation.
//!
//! Accumulates each site's weekday rate into a cumulative volume, converts
//! it to a fill fraction of site capacity, and flags days on which the fill
//! crosses the overflow threshold. Optionally models an emptying the day
//! after capacity is reached.

pub mod fill;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur during fill simulation.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Simulation options or the date range are out of range.
    #[error("Invalid simulation options: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },

    /// The weekday rate table violated the seven-weekday invariant.
    #[error(transparent)]
    InvalidRates(#[from] waste_forecast_sites_models::InvalidRateTableError),
}

/// Fill simulation settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// Capacity applied uniformly to every site, replacing the registry's
    /// `bin_count * bin_size_liters`.
    pub capacity_liters: Option<f64>,
    /// Capacity for sites missing from the registry when no override is set.
    pub default_capacity_liters: f64,
    /// Fill fraction at or above which a day is flagged as overflowing.
    pub overflow_threshold: f64,
    /// Empty the site the day after its cumulative volume reaches capacity.
    pub reset_on_near_capacity: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            capacity_liters: None,
            default_capacity_liters: 1100.0,
            overflow_threshold: 0.8,
            reset_on_near_capacity: false,
        }
    }
}

impl SimulationOptions {
    /// Checks the threshold and capacity override.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError::InvalidConfig`] if the threshold is not in
    /// `(0, 1]`, or the capacity override or default is not a positive
    /// number.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if !(self.overflow_threshold > 0.0 && self.overflow_threshold <= 1.0) {
            return Err(SimulatorError::InvalidConfig {
                message: format!(
                    "overflow_threshold must be in (0, 1], got {}",
                    self.overflow_threshold
                ),
            });
        }
        if let Some(capacity) = self.capacity_liters
            && !(capacity.is_finite() && capacity > 0.0)
        {
            return Err(SimulatorError::InvalidConfig {
                message: format!("capacity_liters must be positive, got {capacity}"),
            });
        }
        if !(self.default_capacity_liters.is_finite() && self.default_capacity_liters > 0.0) {
            return Err(SimulatorError::InvalidConfig {
                message: format!(
                    "default_capacity_liters must be positive, got {}",
                    self.default_capacity_liters
                ),
            });
        }
        Ok(())
    }
}
