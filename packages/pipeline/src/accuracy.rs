//! Forecast accuracy against realized service events.
//!
//! Forecast rows carry cumulative volume, while events report what was
//! collected on a day. The comparable prediction for a day with an event is
//! therefore the growth of the cumulative forecast since the previous
//! event day at the same site.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use waste_forecast_service_days::spikeify::round_to;
use waste_forecast_sites_models::{ServiceEvent, SiteDayForecast};

/// A forecast row joined with the realized volume for its day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyRow {
    /// Site identifier.
    pub site_id: String,
    /// Forecast day.
    pub date: NaiveDate,
    /// Cumulative forecast volume.
    pub pred_volume_m3: f64,
    /// Forecast volume comparable to `actual_m3`, on matched rows.
    pub pred_delta_m3: Option<f64>,
    /// Collected volume on this day, if any event was recorded.
    pub actual_m3: Option<f64>,
    /// `|pred_delta - actual| / actual * 100`, when `actual > 0`.
    pub error_pct: Option<f64>,
}

/// Aggregate accuracy over a forecast window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracySummary {
    /// Forecast rows scored.
    pub rows: usize,
    /// Rows with a realized volume.
    pub matched_rows: usize,
    /// `matched_rows / rows * 100`, one decimal.
    pub coverage_pct: f64,
    /// Sum of comparable predictions over matched rows, two decimals.
    /// `None` when no row matched, as are the other totals.
    pub total_pred_m3: Option<f64>,
    /// Sum of realized volumes over matched rows, two decimals.
    pub total_actual_m3: Option<f64>,
    /// Weighted absolute percentage error, four decimals.
    pub wape: Option<f64>,
}

/// Scores `forecast_rows` against events in `(cutoff, cutoff + horizon]`.
///
/// Returns per-row details ordered by site then date, and the summary.
#[must_use]
pub fn compute_accuracy(
    forecast_rows: &[SiteDayForecast],
    events: &[ServiceEvent],
    cutoff: NaiveDate,
    horizon_days: u32,
) -> (Vec<AccuracyRow>, AccuracySummary) {
    if forecast_rows.is_empty() {
        return (
            Vec::new(),
            AccuracySummary {
                rows: 0,
                matched_rows: 0,
                coverage_pct: 0.0,
                total_pred_m3: None,
                total_actual_m3: None,
                wape: None,
            },
        );
    }

    let window_end = cutoff + Duration::days(i64::from(horizon_days));
    let mut actuals: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
    for event in events {
        if event.event_date <= cutoff || event.event_date > window_end {
            continue;
        }
        if let Some(volume) = event.volume_m3.filter(|v| v.is_finite()) {
            *actuals
                .entry((event.site_id.as_str(), event.event_date))
                .or_default() += volume;
        }
    }

    let mut ordered: Vec<&SiteDayForecast> = forecast_rows.iter().collect();
    ordered.sort_by(|a, b| a.site_id.cmp(&b.site_id).then_with(|| a.date.cmp(&b.date)));

    let mut rows = Vec::with_capacity(ordered.len());
    let mut previous_matched: Option<(&str, f64)> = None;
    let mut total_pred = 0.0;
    let mut total_actual = 0.0;
    let mut total_abs_error = 0.0;
    let mut matched_rows = 0_usize;

    for forecast in ordered {
        let actual = actuals
            .get(&(forecast.site_id.as_str(), forecast.date))
            .copied();

        let pred_delta = actual.map(|_| {
            let baseline = match previous_matched {
                Some((site, value)) if site == forecast.site_id => value,
                _ => 0.0,
            };
            forecast.pred_volume_m3 - baseline
        });

        let mut error_pct = None;
        if let (Some(actual), Some(pred)) = (actual, pred_delta) {
            previous_matched = Some((forecast.site_id.as_str(), forecast.pred_volume_m3));
            matched_rows += 1;
            total_pred += pred;
            total_actual += actual;
            total_abs_error += (pred - actual).abs();
            if actual > 0.0 {
                error_pct = Some((pred - actual).abs() / actual * 100.0);
            }
        }

        rows.push(AccuracyRow {
            site_id: forecast.site_id.clone(),
            date: forecast.date,
            pred_volume_m3: forecast.pred_volume_m3,
            pred_delta_m3: pred_delta,
            actual_m3: actual,
            error_pct,
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let coverage_pct = matched_rows as f64 / rows.len() as f64 * 100.0;
    let scored = matched_rows > 0;
    let wape = if total_actual > 0.0 {
        total_abs_error / total_actual
    } else {
        0.0
    };

    let summary = AccuracySummary {
        rows: rows.len(),
        matched_rows,
        coverage_pct: round_to(coverage_pct, 1),
        total_pred_m3: scored.then(|| round_to(total_pred, 2)),
        total_actual_m3: scored.then(|| round_to(total_actual, 2)),
        wape: scored.then(|| round_to(wape, 4)),
    };

    log::info!(
        "Accuracy over {} rows: {:.1}% matched, WAPE {:?}",
        summary.rows,
        summary.coverage_pct,
        summary.wape
    );

    (rows, summary)
}
