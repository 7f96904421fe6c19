#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Service-day adjustment ("spikeify").
//!
//! Smooth daily forecasts spread volume evenly over the week, but sites are
//! only emptied on a few weekdays. This crate moves each week's volume onto
//! the weekdays a site is actually serviced, keeping the weekly total, and
//! provides the helpers to build the service-day pattern from a free-text
//! schedule or from historical event counts.

pub mod calendar;
pub mod inference;
pub mod schedule;
pub mod spikeify;
pub mod stats;
pub mod weights;

use thiserror::Error;

/// Errors that can occur while adjusting series onto service days.
#[derive(Debug, Error)]
pub enum ServiceDayError {
    /// `dates` and `values` do not line up.
    #[error("Series length mismatch: {dates} dates but {values} values")]
    LengthMismatch {
        /// Number of dates supplied.
        dates: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// A week group refers to a position past the end of the series.
    #[error("Group index {index} out of range for series of length {len}")]
    GroupIndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Series length.
        len: usize,
    },

    /// Inference options are out of range.
    #[error("Invalid service-day options: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },
}
