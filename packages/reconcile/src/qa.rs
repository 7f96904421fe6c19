//! Reconciliation quality summary.

use serde::Serialize;

use crate::{ReconcileError, proportional::Reconciliation};

/// Headline figures of one reconciliation run, for operators and
/// persisted QA artifacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileQa {
    /// Warnings of any kind.
    pub warn_count: usize,
    /// Tolerance the run was checked against, in percent.
    pub tolerance_pct: f64,
    /// Sites reconciled under the unmapped district.
    pub unmapped_sites: usize,
    /// District-days whose scale factor was clipped.
    pub clip_applied_count: usize,
    /// District-days with a zero district forecast.
    pub zero_district_total_days: usize,
    /// At least one site row was produced.
    pub coverage_ok: bool,
    /// No site volume is negative.
    pub nonnegative: bool,
}

impl ReconcileQa {
    /// Summarizes `run`, taking the running counters from its last debug
    /// row.
    #[must_use]
    pub fn from_run(run: &Reconciliation, tolerance_pct: f64) -> Self {
        let last = run.debug.last();
        Self {
            warn_count: run.warnings.len(),
            tolerance_pct,
            unmapped_sites: last.map_or(0, |row| row.unmapped_sites),
            clip_applied_count: last.map_or(0, |row| row.clip_applied_count),
            zero_district_total_days: last.map_or(0, |row| row.zero_district_total_days),
            coverage_ok: !run.sites.is_empty(),
            nonnegative: run.sites.iter().all(|s| s.pred_volume_m3 >= 0.0),
        }
    }

    /// Serializes the summary as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ReconcileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
