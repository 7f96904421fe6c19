#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rolling site fill forecast.
//!
//! Chains the components for one cutoff date and horizon: weekday rate
//! estimation, optional holiday uplift, fill simulation, optional
//! service-day adjustment and optional reconciliation to district totals.
//! Also scores a past forecast against the events that actually happened.

pub mod accuracy;
pub mod config;
pub mod holidays;
pub mod rolling;

use thiserror::Error;

/// Errors that can occur while running a forecast.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rate estimation failed.
    #[error(transparent)]
    Rates(#[from] waste_forecast_rates::RatesError),

    /// Fill simulation failed.
    #[error(transparent)]
    Simulator(#[from] waste_forecast_simulator::SimulatorError),

    /// Service-day adjustment failed.
    #[error(transparent)]
    ServiceDays(#[from] waste_forecast_service_days::ServiceDayError),

    /// Reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] waste_forecast_reconcile::ReconcileError),

    /// Scenario file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Result serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error reading a scenario file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline-level scenario setting is out of range.
    #[error("Invalid scenario: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },

    /// The forecast request is out of range.
    #[error("Invalid forecast request: {message}")]
    InvalidRequest {
        /// Description of what went wrong.
        message: String,
    },
}
