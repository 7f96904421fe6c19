//! One rolling forecast run for a cutoff date and horizon.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use waste_forecast_rates::estimate::estimate_weekday_rates;
use waste_forecast_reconcile::{
    proportional::{ReconcileDebugRow, reconcile_sites_to_district},
    qa::ReconcileQa,
};
use waste_forecast_service_days::{
    calendar::{iter_dates, week_groups, week_groups_split_by_month},
    stats::{SpikeifyStats, spikeify_sites},
};
use waste_forecast_simulator::{
    SimulatorError,
    fill::{InflowSeries, Simulation, simulate_fill, simulate_inflows},
};
use waste_forecast_sites_models::{
    DistrictForecast, ForecastWarning, ServiceDayPattern, ServiceEvent, SiteDayForecast,
    SiteRegistryEntry, WeekdayRateTable, weekday_index,
};

use crate::{
    PipelineError,
    config::{RollingConfig, ScenarioConfig},
    holidays::apply_holiday_multiplier,
};

/// Longest horizon a request may ask for, in days.
pub const MAX_HORIZON_DAYS: u32 = 365;

/// What to forecast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    /// Last day of observed data used for training.
    pub cutoff_date: NaiveDate,
    /// Number of days to forecast after the cutoff.
    pub horizon_days: u32,
    /// Restrict the returned rows to these sites.
    pub site_ids: Option<Vec<String>>,
}

/// Output filters applied after the forecast is computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastFilters {
    /// Keep sites whose district starts with this, ignoring case.
    pub district: Option<String>,
    /// Keep sites whose id contains this, ignoring case.
    pub search: Option<String>,
}

/// Input tables for a run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    /// Observed service events.
    pub events: &'a [ServiceEvent],
    /// Site registry.
    pub registry: &'a [SiteRegistryEntry],
    /// Authoritative district forecast; empty to skip reconciliation.
    pub district_forecast: &'a [DistrictForecast],
    /// Service-day patterns per site; `None` to skip adjustment.
    pub patterns: Option<&'a BTreeMap<String, ServiceDayPattern>>,
}

/// Reconciliation artifacts of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// One row per (date, district).
    pub debug: Vec<ReconcileDebugRow>,
    /// Headline QA figures.
    pub qa: ReconcileQa,
}

/// Result of [`run_forecast`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    /// Training cutoff.
    pub cutoff_date: NaiveDate,
    /// First forecast day.
    pub start_date: NaiveDate,
    /// Last forecast day.
    pub end_date: NaiveDate,
    /// Distinct sites in `rows`.
    pub site_count: usize,
    /// Forecast rows, ordered by site then date.
    pub rows: Vec<SiteDayForecast>,
    /// Warnings from every stage.
    pub warnings: Vec<ForecastWarning>,
    /// Forecast days that received the holiday uplift.
    pub holiday_days: usize,
    /// Service-day adjustment statistics, if the stage ran.
    pub spikeify: Option<SpikeifyStats>,
    /// Reconciliation artifacts, if the stage ran.
    pub reconcile: Option<ReconcileReport>,
}

impl ForecastResult {
    /// Serializes the result as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Checks a request and returns its forecast window `[start, end]`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] if the horizon is outside
/// `1..=365` or the cutoff is past `max_cutoff_date`.
pub fn validate_request(
    request: &ForecastRequest,
    rolling: &RollingConfig,
) -> Result<(NaiveDate, NaiveDate), PipelineError> {
    if !(1..=MAX_HORIZON_DAYS).contains(&request.horizon_days) {
        return Err(PipelineError::InvalidRequest {
            message: format!(
                "horizon_days must be between 1 and {MAX_HORIZON_DAYS}, got {}",
                request.horizon_days
            ),
        });
    }
    if let Some(max_cutoff) = rolling.max_cutoff_date
        && request.cutoff_date > max_cutoff
    {
        return Err(PipelineError::InvalidRequest {
            message: format!(
                "cutoff_date {} is after the latest allowed cutoff {max_cutoff}",
                request.cutoff_date
            ),
        });
    }

    let start = request.cutoff_date + Duration::days(1);
    let end = start + Duration::days(i64::from(request.horizon_days) - 1);
    Ok((start, end))
}

/// Runs the forecast for one request.
///
/// Rates are estimated from events up to the cutoff and simulated over the
/// horizon. When the holiday uplift is enabled, inflows on holiday dates
/// are multiplied first. When spikeify is enabled and patterns are
/// supplied, each site's daily inflows are moved onto its service days
/// before simulating. When reconciliation is enabled and a district forecast is supplied, the
/// simulated volumes are rescaled to district totals. Filters are applied
/// last so reconciliation always sees every site.
///
/// # Errors
///
/// Returns [`PipelineError`] if the request or scenario is invalid, or a
/// component fails.
pub fn run_forecast(
    request: &ForecastRequest,
    inputs: &PipelineInputs<'_>,
    scenario: &ScenarioConfig,
    filters: &ForecastFilters,
) -> Result<ForecastResult, PipelineError> {
    scenario.validate()?;
    let (start_date, end_date) = validate_request(request, &scenario.rolling)?;

    let mut result = ForecastResult {
        cutoff_date: request.cutoff_date,
        start_date,
        end_date,
        site_count: 0,
        rows: Vec::new(),
        warnings: Vec::new(),
        holiday_days: 0,
        spikeify: None,
        reconcile: None,
    };

    if inputs.events.is_empty() {
        log::info!("No service events; returning an empty forecast");
        return Ok(result);
    }

    let estimate = estimate_weekday_rates(inputs.events, request.cutoff_date, &scenario.rates)?;
    result.warnings.extend(estimate.warnings);

    let patterns = inputs
        .patterns
        .filter(|p| scenario.flags.enable_spikeify && !p.is_empty());

    let uplift_holidays = scenario.holidays.enabled && !scenario.holidays.dates.is_empty();

    let simulation = if patterns.is_some() || uplift_holidays {
        let adjusted = simulate_adjusted(
            inputs.registry,
            &estimate.rates,
            patterns,
            start_date,
            end_date,
            scenario,
        )?;
        result.spikeify = adjusted.spikeify;
        result.holiday_days = adjusted.holiday_days;
        adjusted.simulation
    } else {
        simulate_fill(
            inputs.registry,
            &estimate.rates,
            start_date,
            end_date,
            &scenario.simulator,
        )?
    };
    result.warnings.extend(simulation.warnings);
    let mut rows = simulation.rows;

    if scenario.flags.enable_reconcile && !inputs.district_forecast.is_empty() {
        let run = reconcile_sites_to_district(
            &rows,
            inputs.registry,
            inputs.district_forecast,
            &scenario.reconcile,
        )?;
        let qa = ReconcileQa::from_run(&run, scenario.reconcile.tolerance_pct);
        rows = run.sites;
        result.warnings.extend(run.warnings);
        result.reconcile = Some(ReconcileReport {
            debug: run.debug,
            qa,
        });
    }

    result.rows = apply_filters(rows, request, inputs.registry, filters);
    result.site_count = result
        .rows
        .iter()
        .map(|row| row.site_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    log::info!(
        "Forecast {start_date}..={end_date}: {} rows for {} sites, {} warnings",
        result.rows.len(),
        result.site_count,
        result.warnings.len()
    );

    Ok(result)
}

/// Simulation over inflows adjusted for holidays and service days.
struct AdjustedSimulation {
    simulation: Simulation,
    spikeify: Option<SpikeifyStats>,
    holiday_days: usize,
}

/// Spreads each site's weekday rate over the horizon, applies the holiday
/// uplift, moves the inflows onto service days when patterns are given and
/// simulates the result.
fn simulate_adjusted(
    registry: &[SiteRegistryEntry],
    rates: &WeekdayRateTable,
    patterns: Option<&BTreeMap<String, ServiceDayPattern>>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    scenario: &ScenarioConfig,
) -> Result<AdjustedSimulation, PipelineError> {
    let dates = iter_dates(start_date, end_date);

    let mut series: BTreeMap<String, Vec<f64>> = rates
        .by_site()
        .map_err(SimulatorError::from)?
        .into_iter()
        .map(|(site_id, weekday_rates)| {
            let values = dates
                .iter()
                .map(|&day| weekday_rates[usize::from(weekday_index(day))])
                .collect();
            (site_id, values)
        })
        .collect();

    let holiday_days = if scenario.holidays.enabled {
        apply_holiday_multiplier(&dates, &mut series, &scenario.holidays)
    } else {
        0
    };

    let mut spikeify = None;
    if let Some(patterns) = patterns {
        let groups = if scenario.service_days.split_by_month {
            week_groups_split_by_month(&dates)
        } else {
            week_groups(&dates)
        };
        let (adjusted, stats) = spikeify_sites(
            &dates,
            &series,
            patterns,
            Some(groups.as_slice()),
            scenario.service_days.decimals,
        )?;
        series = adjusted;
        spikeify = Some(stats);
    }

    let inflows: BTreeMap<String, InflowSeries> = series
        .into_iter()
        .map(|(site_id, values)| (site_id, dates.iter().copied().zip(values).collect()))
        .collect();

    Ok(AdjustedSimulation {
        simulation: simulate_inflows(registry, &inflows, &scenario.simulator)?,
        spikeify,
        holiday_days,
    })
}

fn apply_filters(
    rows: Vec<SiteDayForecast>,
    request: &ForecastRequest,
    registry: &[SiteRegistryEntry],
    filters: &ForecastFilters,
) -> Vec<SiteDayForecast> {
    let site_ids: Option<BTreeSet<&str>> = request
        .site_ids
        .as_ref()
        .map(|ids| ids.iter().map(String::as_str).collect());
    let district_prefix = filters
        .district
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_lowercase);
    let search = filters
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let districts: BTreeMap<&str, String> = registry
        .iter()
        .filter_map(|entry| {
            entry
                .district_name()
                .map(|d| (entry.site_id.as_str(), d.to_lowercase()))
        })
        .collect();

    rows.into_iter()
        .filter(|row| {
            site_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(row.site_id.as_str()))
        })
        .filter(|row| {
            district_prefix.as_ref().is_none_or(|prefix| {
                districts
                    .get(row.site_id.as_str())
                    .is_some_and(|district| district.starts_with(prefix.as_str()))
            })
        })
        .filter(|row| {
            search
                .as_ref()
                .is_none_or(|term| row.site_id.to_lowercase().contains(term.as_str()))
        })
        .collect()
}
