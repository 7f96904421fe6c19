//! Proportional site-to-district reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use waste_forecast_sites_models::{
    DistrictForecast, ForecastWarning, LITERS_PER_M3, SiteDayForecast, SiteRegistryEntry,
    UNMAPPED_DISTRICT, WarningReason,
};

use crate::{ReconcileError, ReconcileOptions};

/// Site sums at or below this are treated as zero.
const SUM_EPS: f64 = 1e-12;

/// District forecasts at or below this count as zero-total days.
const ZERO_FORECAST_EPS: f64 = 1e-9;

/// One reconciled (date, district) group.
///
/// The counters are running totals over the groups processed so far, in
/// (date, district) order; `unmapped_sites` is the total for the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileDebugRow {
    /// Forecast day.
    pub date: NaiveDate,
    /// District, or `__unmapped__`.
    pub district: String,
    /// Site sum before scaling.
    pub s_before: f64,
    /// Scale factor applied, `None` when scaling was impossible or there
    /// was no district forecast.
    pub scale_applied: Option<f64>,
    /// Site sum after scaling.
    pub sites_sum_after_m3: f64,
    /// District forecast, if one exists for this day.
    pub forecast_m3: Option<f64>,
    /// Sites without a district mapping.
    pub unmapped_sites: usize,
    /// Groups whose scale factor was clipped.
    pub clip_applied_count: usize,
    /// Groups whose district forecast was zero.
    pub zero_district_total_days: usize,
}

/// Output of [`reconcile_sites_to_district`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Site rows with rescaled volumes, in input order.
    pub sites: Vec<SiteDayForecast>,
    /// One row per (date, district) group.
    pub debug: Vec<ReconcileDebugRow>,
    /// Soft anomalies found along the way.
    pub warnings: Vec<ForecastWarning>,
}

/// Rescales site volumes so each (date, district) sums to its district
/// forecast.
///
/// Sites with no registry district are reconciled under
/// [`UNMAPPED_DISTRICT`] and reported once each. For each group the scale
/// factor `forecast / s_before` is clipped to `[clip_min, clip_max]` and
/// applied to every site, and `fill_pct` is recomputed from site capacity
/// (capped at `1`). `overflow_prob` is left as simulated.
///
/// If `district_forecast` is empty the sites are returned unchanged.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidConfig`] if the options are invalid.
pub fn reconcile_sites_to_district(
    sites: &[SiteDayForecast],
    registry: &[SiteRegistryEntry],
    district_forecast: &[DistrictForecast],
    options: &ReconcileOptions,
) -> Result<Reconciliation, ReconcileError> {
    options.validate()?;

    if district_forecast.is_empty() {
        log::debug!("No district forecast supplied; skipping reconciliation");
        return Ok(Reconciliation {
            sites: sites.to_vec(),
            ..Reconciliation::default()
        });
    }

    let registry_by_site: BTreeMap<&str, &SiteRegistryEntry> = registry
        .iter()
        .map(|entry| (entry.site_id.as_str(), entry))
        .collect();

    let mut warnings = Vec::new();

    let unmapped: BTreeSet<&str> = sites
        .iter()
        .map(|row| row.site_id.as_str())
        .filter(|site_id| {
            registry_by_site
                .get(site_id)
                .and_then(|entry| entry.district_name())
                .is_none()
        })
        .collect();
    for site_id in &unmapped {
        log::warn!("Site {site_id} has no district mapping; reconciling under {UNMAPPED_DISTRICT}");
        warnings.push(ForecastWarning::new(WarningReason::SiteMissingDistrict).with_site(*site_id));
    }

    let mut forecasts: BTreeMap<(NaiveDate, &str), f64> = BTreeMap::new();
    for row in district_forecast {
        *forecasts
            .entry((row.date, row.district.trim()))
            .or_default() += row.forecast_m3;
    }

    let mut groups: BTreeMap<(NaiveDate, &str), Vec<usize>> = BTreeMap::new();
    for (idx, row) in sites.iter().enumerate() {
        let district = registry_by_site
            .get(row.site_id.as_str())
            .and_then(|entry| entry.district_name())
            .unwrap_or(UNMAPPED_DISTRICT);
        groups.entry((row.date, district)).or_default().push(idx);
    }

    let mut out = sites.to_vec();
    let mut debug = Vec::with_capacity(groups.len());
    let mut clip_applied_count = 0;
    let mut zero_district_total_days = 0;

    for ((date, district), indices) in groups {
        let s_before: f64 = indices.iter().map(|&i| sites[i].pred_volume_m3).sum();
        let forecast = forecasts.get(&(date, district)).copied();

        let mut row = ReconcileDebugRow {
            date,
            district: district.to_string(),
            s_before,
            scale_applied: None,
            sites_sum_after_m3: s_before,
            forecast_m3: forecast,
            unmapped_sites: unmapped.len(),
            clip_applied_count,
            zero_district_total_days,
        };

        let Some(forecast_m3) = forecast else {
            if district != UNMAPPED_DISTRICT {
                log::warn!("No district forecast for {district} on {date}; sites left as simulated");
                warnings.push(
                    ForecastWarning::new(WarningReason::DistrictForecastMissing)
                        .with_district_day(date, district),
                );
            }
            debug.push(row);
            continue;
        };

        if forecast_m3 <= ZERO_FORECAST_EPS {
            zero_district_total_days += 1;
        }

        if s_before.abs() <= SUM_EPS {
            if forecast_m3 > SUM_EPS {
                log::warn!(
                    "Sites in {district} sum to zero on {date} but the district forecast is {forecast_m3:.3}"
                );
                let mut warning = ForecastWarning::new(WarningReason::SiteSumZeroDistrictPositive)
                    .with_district_day(date, district);
                warning.s_before = Some(s_before);
                warning.forecast_m3 = Some(forecast_m3);
                warnings.push(warning);
            } else {
                row.scale_applied = Some(1.0);
            }
        } else {
            let raw_scale = forecast_m3 / s_before;
            let scale = raw_scale.clamp(options.clip_min, options.clip_max);
            if (scale - raw_scale).abs() > 0.0 {
                clip_applied_count += 1;
                log::debug!(
                    "Clipped scale for {district} on {date}: {raw_scale:.4} -> {scale:.4}"
                );
            }

            for &i in &indices {
                let site = &mut out[i];
                site.pred_volume_m3 *= scale;
                let capacity = registry_by_site
                    .get(site.site_id.as_str())
                    .map(|entry| entry.capacity_liters())
                    .filter(|c| c.is_finite() && *c > 0.0)
                    .unwrap_or(options.default_capacity_liters);
                site.fill_pct = (site.pred_volume_m3 * LITERS_PER_M3 / capacity).clamp(0.0, 1.0);
            }

            let after: f64 = indices.iter().map(|&i| out[i].pred_volume_m3).sum();
            let delta_pct = relative_delta_pct(after, forecast_m3);

            row.scale_applied = Some(scale);
            row.sites_sum_after_m3 = after;

            if delta_pct > options.tolerance_pct {
                log::warn!(
                    "Reconciled sum for {district} on {date} is {delta_pct:.2}% from the forecast"
                );
                let mut warning = ForecastWarning::new(WarningReason::DeltaAboveTolerance)
                    .with_district_day(date, district);
                warning.s_before = Some(s_before);
                warning.forecast_m3 = Some(forecast_m3);
                warning.sites_sum_after_m3 = Some(after);
                warning.delta_pct = Some(delta_pct);
                warnings.push(warning);
            }
        }

        row.clip_applied_count = clip_applied_count;
        row.zero_district_total_days = zero_district_total_days;
        debug.push(row);
    }

    log::info!(
        "Reconciled {} district-days ({clip_applied_count} clipped, {} unmapped sites, {} warnings)",
        debug.len(),
        unmapped.len(),
        warnings.len()
    );

    Ok(Reconciliation {
        sites: out,
        debug,
        warnings,
    })
}

/// `|after - forecast| / forecast * 100`, infinite when the forecast is zero
/// but the sites are not.
fn relative_delta_pct(after: f64, forecast: f64) -> f64 {
    let diff = (after - forecast).abs();
    if forecast > SUM_EPS {
        diff / forecast * 100.0
    } else if diff > SUM_EPS {
        f64::INFINITY
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn site(id: &str, day: u32, volume: f64) -> SiteDayForecast {
        SiteDayForecast {
            site_id: id.to_string(),
            date: d(day),
            pred_volume_m3: volume,
            fill_pct: 0.0,
            overflow_prob: 0.0,
        }
    }

    fn forecast(day: u32, district: &str, value: f64) -> DistrictForecast {
        DistrictForecast {
            date: d(day),
            district: district.to_string(),
            forecast_m3: value,
        }
    }

    fn registry() -> Vec<SiteRegistryEntry> {
        vec![
            SiteRegistryEntry::new("A", "North", 1, 1100.0),
            SiteRegistryEntry::new("B", "North", 2, 1100.0),
            SiteRegistryEntry::new("C", "South", 1, 1100.0),
        ]
    }

    #[test]
    fn empty_district_forecast_returns_sites_unchanged() {
        let sites = vec![site("A", 6, 1.0), site("X", 6, 2.0)];
        let result =
            reconcile_sites_to_district(&sites, &registry(), &[], &ReconcileOptions::default())
                .unwrap();
        assert_eq!(result.sites, sites);
        assert!(result.debug.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn exact_match_without_clipping() {
        let sites = vec![site("A", 6, 600.0), site("B", 6, 400.0)];
        let options = ReconcileOptions {
            clip_min: 0.9,
            clip_max: 1.1,
            ..ReconcileOptions::default()
        };
        let result = reconcile_sites_to_district(
            &sites,
            &registry(),
            &[forecast(6, "North", 1100.0)],
            &options,
        )
        .unwrap();

        let total: f64 = result.sites.iter().map(|s| s.pred_volume_m3).sum();
        assert!((total - 1100.0).abs() < 1e-9);
        assert!(result.warnings.is_empty());

        let row = &result.debug[0];
        assert!((row.scale_applied.unwrap() - 1.1).abs() < 1e-12);
        assert_eq!(row.clip_applied_count, 0);
        // Scaled volumes exceed capacity, so fill is capped.
        assert!((result.sites[0].fill_pct - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clipped_scale_and_tolerance_warning() {
        let sites = vec![site("A", 6, 1.0)];
        let options = ReconcileOptions {
            clip_max: 1.1,
            ..ReconcileOptions::default()
        };
        let district = [forecast(6, "North", 2.0)];

        let result = reconcile_sites_to_district(&sites, &registry(), &district, &options).unwrap();
        let row = &result.debug[0];
        assert!((row.scale_applied.unwrap() - 1.1).abs() < 1e-12);
        assert_eq!(row.clip_applied_count, 1);
        // 45% off, inside the default 50% tolerance.
        assert!(result.warnings.is_empty());

        let tight = ReconcileOptions {
            tolerance_pct: 10.0,
            ..options
        };
        let result = reconcile_sites_to_district(&sites, &registry(), &district, &tight).unwrap();
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.reason, WarningReason::DeltaAboveTolerance);
        assert!((warning.delta_pct.unwrap() - 45.0).abs() < 1e-9);
        assert_eq!(warning.district.as_deref(), Some("North"));
    }

    #[test]
    fn unmapped_sites_are_grouped_and_reported() {
        let sites = vec![site("A", 6, 1.0), site("X", 6, 2.0), site("X", 7, 3.0)];
        let result = reconcile_sites_to_district(
            &sites,
            &registry(),
            &[forecast(6, "North", 1.0)],
            &ReconcileOptions::default(),
        )
        .unwrap();

        let missing: Vec<&ForecastWarning> = result
            .warnings
            .iter()
            .filter(|w| w.reason == WarningReason::SiteMissingDistrict)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].site_id.as_deref(), Some("X"));

        assert!(result.debug.iter().any(|r| r.district == UNMAPPED_DISTRICT));
        assert!(result.debug.iter().all(|r| r.unmapped_sites == 1));
        // Unmapped groups have no forecast and are left alone, silently.
        assert!(
            !result
                .warnings
                .iter()
                .any(|w| w.reason == WarningReason::DistrictForecastMissing)
        );
        assert!((result.sites[1].pred_volume_m3 - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_site_sum_with_positive_forecast_warns() {
        let sites = vec![site("C", 6, 0.0), site("A", 6, 0.0)];
        let district = [forecast(6, "South", 5.0), forecast(6, "North", 0.0)];
        let result = reconcile_sites_to_district(
            &sites,
            &registry(),
            &district,
            &ReconcileOptions::default(),
        )
        .unwrap();

        assert!(result.sites.iter().all(|s| s.pred_volume_m3.abs() < f64::EPSILON));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0].reason,
            WarningReason::SiteSumZeroDistrictPositive
        );

        let north = result.debug.iter().find(|r| r.district == "North").unwrap();
        assert_eq!(north.scale_applied, Some(1.0));
        assert_eq!(north.zero_district_total_days, 1);
        let south = result.debug.iter().find(|r| r.district == "South").unwrap();
        assert!(south.scale_applied.is_none());
    }

    #[test]
    fn missing_district_forecast_is_reported() {
        let sites = vec![site("C", 6, 4.0)];
        let result = reconcile_sites_to_district(
            &sites,
            &registry(),
            &[forecast(6, "North", 1.0)],
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert_eq!(
            result.warnings[0].reason,
            WarningReason::DistrictForecastMissing
        );
        assert!((result.sites[0].pred_volume_m3 - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_forecast_rows_are_summed() {
        let sites = vec![site("C", 6, 1.0)];
        let district = [forecast(6, "South", 0.6), forecast(6, "South", 0.6)];
        let result = reconcile_sites_to_district(
            &sites,
            &registry(),
            &district,
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert!((result.sites[0].pred_volume_m3 - 1.2).abs() < 1e-12);
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let sites = vec![site("A", 6, 3.0), site("B", 6, 1.0), site("C", 7, 2.0)];
        let district = [forecast(6, "North", 5.0), forecast(7, "South", 1.5)];
        let options = ReconcileOptions::default();
        let a = reconcile_sites_to_district(&sites, &registry(), &district, &options).unwrap();
        let b = reconcile_sites_to_district(&sites, &registry(), &district, &options).unwrap();
        assert_eq!(a, b);
    }
}
