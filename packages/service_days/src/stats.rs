//! Spikeify over many sites with before/after impact statistics.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use serde::Serialize;
use waste_forecast_sites_models::ServiceDayPattern;

use crate::{ServiceDayError, calendar::week_groups, spikeify::spikeify_weekly_values};

/// How much a spikeify run moved volume around.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpikeifyStats {
    /// Site-day values processed.
    pub rows: usize,
    /// Sites that had a pattern applied.
    pub sites_adjusted: usize,
    /// Sum of all values before adjustment.
    pub total_before: f64,
    /// Sum of all values after adjustment.
    pub total_after: f64,
    /// `total_after - total_before`; rounding noise only.
    pub total_diff: f64,
    /// Sum of per-day absolute changes.
    pub sum_abs_delta: f64,
    /// `sum_abs_delta / total_before`, `None` when nothing was forecast.
    pub impact_ratio: Option<f64>,
    /// Volume moved onto service days (sum of per-day increases).
    pub modified_volume: f64,
    /// Largest absolute change of a site's monthly total.
    pub max_site_month_abs_diff: f64,
}

/// Result of [`spikeify_sites`].
pub type SpikeifiedSeries = (BTreeMap<String, Vec<f64>>, SpikeifyStats);

/// Applies [`spikeify_weekly_values`] to every site in `series` that has a
/// pattern, sharing one date axis and grouping.
///
/// Sites without a pattern are returned unchanged.
///
/// # Errors
///
/// Returns [`ServiceDayError`] if any site's series does not match `dates`
/// or a group is out of range.
pub fn spikeify_sites(
    dates: &[NaiveDate],
    series: &BTreeMap<String, Vec<f64>>,
    patterns: &BTreeMap<String, ServiceDayPattern>,
    groups: Option<&[Vec<usize>]>,
    decimals: u8,
) -> Result<SpikeifiedSeries, ServiceDayError> {
    let default_groups;
    let groups = if let Some(groups) = groups {
        groups
    } else {
        default_groups = week_groups(dates);
        default_groups.as_slice()
    };

    let mut stats = SpikeifyStats::default();
    let mut adjusted = BTreeMap::new();

    for (site_id, values) in series {
        let after = match patterns.get(site_id) {
            Some(pattern) => {
                stats.sites_adjusted += 1;
                spikeify_weekly_values(dates, values, pattern, Some(groups), decimals)?
            }
            None => values.clone(),
        };

        stats.rows += values.len();
        stats.total_before += values.iter().sum::<f64>();
        stats.total_after += after.iter().sum::<f64>();

        let mut monthly: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for ((before, after), date) in values.iter().zip(&after).zip(dates) {
            let delta = after - before;
            stats.sum_abs_delta += delta.abs();
            if delta > 0.0 {
                stats.modified_volume += delta;
            }
            *monthly.entry((date.year(), date.month())).or_default() += delta;
        }
        stats.max_site_month_abs_diff = monthly
            .values()
            .copied()
            .map(f64::abs)
            .fold(stats.max_site_month_abs_diff, f64::max);

        adjusted.insert(site_id.clone(), after);
    }

    stats.total_diff = stats.total_after - stats.total_before;
    stats.impact_ratio =
        (stats.total_before > 0.0).then(|| stats.sum_abs_delta / stats.total_before);

    log::info!(
        "Spikeified {} of {} sites: moved {:.3} m3 ({} site-days)",
        stats.sites_adjusted,
        series.len(),
        stats.modified_volume,
        stats.rows
    );

    Ok((adjusted, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{iter_dates, week_groups_split_by_month};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn adjusts_only_sites_with_patterns() {
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 19));
        let series = BTreeMap::from([
            ("A".to_string(), vec![1.0; 14]),
            ("B".to_string(), vec![2.0; 14]),
        ]);
        let patterns = BTreeMap::from([("A".to_string(), ServiceDayPattern::uniform([0]))]);

        let (adjusted, stats) = spikeify_sites(&dates, &series, &patterns, None, 6).unwrap();

        assert_eq!(adjusted["B"], series["B"]);
        assert!((adjusted["A"][0] - 7.0).abs() < 1e-9);
        assert!((adjusted["A"][7] - 7.0).abs() < 1e-9);

        assert_eq!(stats.rows, 28);
        assert_eq!(stats.sites_adjusted, 1);
        assert!(stats.total_diff.abs() < 1e-9);
        // Each week moves 6 m3 onto Monday.
        assert!((stats.modified_volume - 12.0).abs() < 1e-9);
        assert!((stats.sum_abs_delta - 24.0).abs() < 1e-9);
        assert!((stats.impact_ratio.unwrap() - 24.0 / 42.0).abs() < 1e-9);
    }

    #[test]
    fn month_split_keeps_monthly_totals() {
        let dates = iter_dates(d(2025, 1, 1), d(2025, 3, 31));
        let series = BTreeMap::from([("A".to_string(), vec![1.0; dates.len()])]);
        let patterns = BTreeMap::from([("A".to_string(), ServiceDayPattern::uniform([2, 5]))]);

        let split = week_groups_split_by_month(&dates);
        let (_, stats) =
            spikeify_sites(&dates, &series, &patterns, Some(split.as_slice()), 6).unwrap();
        assert!(stats.max_site_month_abs_diff < 1e-9);

        let (_, stats) = spikeify_sites(&dates, &series, &patterns, None, 6).unwrap();
        assert!(stats.max_site_month_abs_diff > 0.0);
    }

    #[test]
    fn empty_totals_have_no_impact_ratio() {
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 7));
        let series = BTreeMap::from([("A".to_string(), vec![0.0; 2])]);
        let (_, stats) = spikeify_sites(&dates, &series, &BTreeMap::new(), None, 6).unwrap();
        assert!(stats.impact_ratio.is_none());
    }
}
