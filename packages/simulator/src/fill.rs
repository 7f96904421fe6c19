//! Per-site fill state machine.
//!
//! State is the cumulative volume since the last emptying. Each simulated
//! day adds that day's inflow, unless an emptying was scheduled by the
//! previous day, in which case the day starts and ends empty.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use waste_forecast_sites_models::{
    ForecastWarning, LITERS_PER_M3, SiteDayForecast, SiteRegistryEntry, WarningReason,
    WeekdayRateTable, weekday_index,
};

use crate::{SimulationOptions, SimulatorError};

/// Rows produced by one simulation run, plus sites that could not be
/// simulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Simulation {
    /// One row per simulated site per day, ordered by site then date.
    pub rows: Vec<SiteDayForecast>,
    /// Sites that were skipped or simulated at the default capacity.
    pub warnings: Vec<ForecastWarning>,
}

/// Daily inflow series for one site, in cubic meters per day.
pub type InflowSeries = Vec<(NaiveDate, f64)>;

/// Simulates fill levels for every site in `weekday_rates` over
/// `[start_date, end_date]`.
///
/// Capacity comes from `options.capacity_liters` when set, otherwise from
/// the site's registry entry. Sites missing from the registry are reported
/// and simulated at `options.default_capacity_liters`. Sites whose registry
/// capacity is not positive are reported and skipped.
///
/// # Errors
///
/// Returns [`SimulatorError`] if the options are invalid, the date range is
/// inverted, or the rate table is missing weekdays for a site.
pub fn simulate_fill(
    registry: &[SiteRegistryEntry],
    weekday_rates: &WeekdayRateTable,
    start_date: NaiveDate,
    end_date: NaiveDate,
    options: &SimulationOptions,
) -> Result<Simulation, SimulatorError> {
    if start_date > end_date {
        return Err(SimulatorError::InvalidConfig {
            message: format!("start_date {start_date} is after end_date {end_date}"),
        });
    }

    let days: Vec<NaiveDate> = start_date
        .iter_days()
        .take_while(|day| *day <= end_date)
        .collect();

    let inflows: BTreeMap<String, InflowSeries> = weekday_rates
        .by_site()?
        .into_iter()
        .map(|(site_id, rates)| {
            let series = days
                .iter()
                .map(|&day| (day, rates[usize::from(weekday_index(day))]))
                .collect();
            (site_id, series)
        })
        .collect();

    simulate_inflows(registry, &inflows, options)
}

/// Simulates fill levels for arbitrary per-day inflow series.
///
/// This is the shared core of [`simulate_fill`]; callers that have already
/// redistributed daily inflows (for example onto service days) can run the
/// same state machine over their own series.
///
/// # Errors
///
/// Returns [`SimulatorError::InvalidConfig`] if the options are invalid.
pub fn simulate_inflows(
    registry: &[SiteRegistryEntry],
    inflows: &BTreeMap<String, InflowSeries>,
    options: &SimulationOptions,
) -> Result<Simulation, SimulatorError> {
    options.validate()?;

    let registry_by_site: BTreeMap<&str, &SiteRegistryEntry> = registry
        .iter()
        .map(|entry| (entry.site_id.as_str(), entry))
        .collect();

    let mut simulation = Simulation::default();
    let mut skipped = 0_usize;

    for (site_id, series) in inflows {
        let entry = registry_by_site.get(site_id.as_str()).copied();
        if entry.is_none() && options.capacity_liters.is_none() {
            log::warn!(
                "Site {site_id} is not in the registry, using {} L",
                options.default_capacity_liters
            );
            simulation
                .warnings
                .push(ForecastWarning::new(WarningReason::SiteMissingRegistry).with_site(site_id));
        }

        let Some(capacity) = resolve_capacity(entry, options) else {
            log::warn!("Skipping site {site_id}: {}", WarningReason::InvalidCapacity);
            simulation
                .warnings
                .push(ForecastWarning::new(WarningReason::InvalidCapacity).with_site(site_id));
            skipped += 1;
            continue;
        };

        simulation
            .rows
            .extend(simulate_site(site_id, series, capacity, options));
    }

    log::info!(
        "Simulated {} site-days across {} sites ({skipped} skipped)",
        simulation.rows.len(),
        inflows.len() - skipped,
    );

    Ok(simulation)
}

/// Resolves a site's capacity in liters: the global override if set,
/// otherwise the registry capacity when it is a positive number. Sites
/// missing from the registry get `default_capacity_liters`.
#[must_use]
pub fn resolve_capacity(
    entry: Option<&SiteRegistryEntry>,
    options: &SimulationOptions,
) -> Option<f64> {
    if let Some(capacity) = options.capacity_liters {
        return Some(capacity);
    }
    match entry {
        Some(entry) => Some(entry.capacity_liters())
            .filter(|capacity| capacity.is_finite() && *capacity > 0.0),
        None => Some(options.default_capacity_liters),
    }
}

/// Runs the fill state machine for a single site.
///
/// `fill_pct` is a pure function of the day's cumulative volume and
/// `overflow_prob` a pure function of `fill_pct`, so both drop back to zero
/// after an emptying.
#[must_use]
pub fn simulate_site(
    site_id: &str,
    series: &[(NaiveDate, f64)],
    capacity_liters: f64,
    options: &SimulationOptions,
) -> Vec<SiteDayForecast> {
    let mut cumulative_m3 = 0.0;
    let mut empty_next_day = false;

    series
        .iter()
        .map(|&(date, inflow_m3)| {
            if empty_next_day {
                cumulative_m3 = 0.0;
                empty_next_day = false;
            } else {
                cumulative_m3 += inflow_m3;
            }

            let cumulative_liters = cumulative_m3 * LITERS_PER_M3;
            let fill_pct = (cumulative_liters / capacity_liters).clamp(0.0, 1.0);
            let overflow_prob = if fill_pct >= options.overflow_threshold {
                1.0
            } else {
                0.0
            };

            if options.reset_on_near_capacity && cumulative_liters >= capacity_liters {
                empty_next_day = true;
            }

            SiteDayForecast {
                site_id: site_id.to_string(),
                date,
                pred_volume_m3: cumulative_m3,
                fill_pct,
                overflow_prob,
            }
        })
        .collect()
}
