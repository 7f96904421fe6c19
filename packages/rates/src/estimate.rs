//! Windowed weekday rate estimation with site-wide fallback.
//!
//! For each site, consecutive events inside the window are walked in date
//! order. An event contributes `volume / gap_days` to the weekday it falls
//! on, where the gap is the number of days since the previous event at the
//! same site (or a bounded default for the first event). Same-day repeats
//! have a zero gap and contribute nothing.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use waste_forecast_sites_models::{
    ForecastWarning, ServiceEvent, WEEKDAYS, WarningReason, WeekdayRate, WeekdayRateTable,
    weekday_index,
};

use crate::{RateOptions, RatesError};

/// Rates produced by one estimation run, plus the anomalies seen on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateEstimate {
    /// Seven rows per site with at least one usable event.
    pub rates: WeekdayRateTable,
    /// Soft anomalies (missing volumes, duplicate dates, fallbacks).
    pub warnings: Vec<ForecastWarning>,
}

/// Per-site rate contributions grouped by weekday.
#[derive(Debug, Default)]
struct SiteContributions {
    by_weekday: [Vec<f64>; WEEKDAYS],
    duplicates: u64,
}

impl SiteContributions {
    fn total_obs(&self) -> usize {
        self.by_weekday.iter().map(Vec::len).sum()
    }
}

/// Estimates per-weekday accumulation rates from service events.
///
/// Events are restricted to `[cutoff_date - window_days, cutoff_date]`.
/// Events without a usable volume are skipped and reported. If every
/// weekday of a site has at least `min_obs` contributions, each weekday
/// gets the mean of its own contributions; otherwise all seven weekdays
/// get the mean of every contribution for that site.
///
/// # Errors
///
/// Returns [`RatesError::InvalidConfig`] if the options are out of range
/// or the window start is not a representable date.
pub fn estimate_weekday_rates(
    events: &[ServiceEvent],
    cutoff_date: NaiveDate,
    options: &RateOptions,
) -> Result<RateEstimate, RatesError> {
    options.validate()?;

    let window_start = Duration::try_days(options.window_days)
        .and_then(|window| cutoff_date.checked_sub_signed(window))
        .ok_or_else(|| RatesError::InvalidConfig {
            message: format!(
                "window_days {} before {cutoff_date} is out of the date range",
                options.window_days
            ),
        })?;
    let first_gap = options.bounded_first_gap();

    let mut warnings = Vec::new();
    let mut missing_volume: BTreeMap<&str, u64> = BTreeMap::new();
    let mut by_site: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();

    for event in events {
        if event.event_date < window_start || event.event_date > cutoff_date {
            continue;
        }
        match event.volume_m3 {
            Some(volume) if volume.is_finite() && volume >= 0.0 => {
                by_site
                    .entry(event.site_id.as_str())
                    .or_default()
                    .push((event.event_date, volume));
            }
            _ => *missing_volume.entry(event.site_id.as_str()).or_default() += 1,
        }
    }

    for (site_id, count) in missing_volume {
        log::warn!("Skipped {count} events without a usable volume for site {site_id}");
        warnings.push(
            ForecastWarning::new(WarningReason::MissingVolume)
                .with_site(site_id)
                .with_count(count),
        );
    }

    let mut rows = Vec::with_capacity(by_site.len() * WEEKDAYS);
    let mut fallback_sites = 0_usize;

    for (site_id, mut site_events) in by_site {
        site_events.sort_by_key(|(date, _)| *date);
        let contributions = collect_contributions(&site_events, first_gap);

        if contributions.duplicates > 0 {
            log::warn!(
                "Site {site_id} has {} same-day repeat events; they contribute no rate",
                contributions.duplicates
            );
            warnings.push(
                ForecastWarning::new(WarningReason::DuplicateServiceDate)
                    .with_site(site_id)
                    .with_count(contributions.duplicates),
            );
        }

        let sufficient = contributions
            .by_weekday
            .iter()
            .all(|obs| obs.len() >= options.min_obs);

        let rates: [f64; WEEKDAYS] = if sufficient {
            std::array::from_fn(|wd| mean(&contributions.by_weekday[wd]))
        } else {
            fallback_sites += 1;
            let all: Vec<f64> = contributions.by_weekday.iter().flatten().copied().collect();
            let overall = mean(&all);
            log::debug!(
                "Site {site_id}: {} observations below min_obs={} per weekday, using overall mean {overall:.4}",
                contributions.total_obs(),
                options.min_obs
            );
            warnings.push(
                ForecastWarning::new(WarningReason::FallbackRate)
                    .with_site(site_id)
                    .with_count(u64::try_from(contributions.total_obs()).unwrap_or(u64::MAX)),
            );
            [overall; WEEKDAYS]
        };

        rows.extend(rates.iter().zip(0_u8..).map(|(&rate, weekday)| WeekdayRate {
            site_id: site_id.to_string(),
            weekday,
            rate_m3_per_day: rate,
        }));
    }

    let rates = WeekdayRateTable::from_rows(rows)?;
    log::info!(
        "Estimated weekday rates for {} sites ({fallback_sites} using the overall mean) with cutoff {cutoff_date}",
        rates.len() / WEEKDAYS
    );

    Ok(RateEstimate { rates, warnings })
}

/// Walks one site's date-sorted events and attributes `volume / gap` to
/// each event's weekday.
#[allow(clippy::cast_precision_loss)]
fn collect_contributions(events: &[(NaiveDate, f64)], first_gap: i64) -> SiteContributions {
    let mut contributions = SiteContributions::default();
    let mut previous: Option<NaiveDate> = None;

    for &(date, volume) in events {
        let gap = previous.map_or(first_gap, |prev| (date - prev).num_days());
        previous = Some(date);

        if gap <= 0 {
            contributions.duplicates += 1;
            continue;
        }

        let wd = usize::from(weekday_index(date));
        contributions.by_weekday[wd].push(volume / gap as f64);
    }

    contributions
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let estimate = estimate_weekday_rates(&[], d(2025, 3, 1), &RateOptions::default()).unwrap();
        assert!(estimate.rates.is_empty());
        assert!(estimate.warnings.is_empty());
    }

    #[test]
    fn window_past_the_date_range_is_a_config_error() {
        let options = RateOptions {
            window_days: 200_000_000,
            ..RateOptions::default()
        };
        assert!(options.validate().is_ok());
        let err = estimate_weekday_rates(&[], d(2025, 1, 1), &options).unwrap_err();
        assert!(matches!(err, RatesError::InvalidConfig { .. }));

        let options = RateOptions {
            window_days: i64::MAX,
            ..RateOptions::default()
        };
        assert!(estimate_weekday_rates(&[], d(2025, 1, 1), &options).is_err());
    }

    #[test]
    fn sparse_site_falls_back_to_overall_mean() {
        let events = vec![
            ServiceEvent::new("S1", d(2025, 1, 1), 7.0),
            ServiceEvent::new("S1", d(2025, 1, 8), 14.0),
        ];
        let options = RateOptions {
            min_obs: 100,
            ..RateOptions::default()
        };

        let estimate = estimate_weekday_rates(&events, d(2025, 1, 10), &options).unwrap();
        let rates = estimate.rates.rates_for("S1").unwrap();

        for rate in rates {
            assert_close(rate, 1.5);
        }
        assert!(
            estimate
                .warnings
                .iter()
                .any(|w| w.reason == WarningReason::FallbackRate)
        );
    }

    #[test]
    fn single_event_uses_default_gap() {
        let events = vec![ServiceEvent::new("S1", d(2025, 2, 3), 3.5)];
        let estimate = estimate_weekday_rates(&events, d(2025, 2, 10), &RateOptions::default()).unwrap();
        assert_eq!(estimate.rates.len(), 7);
        for rate in estimate.rates.rates_for("S1").unwrap() {
            assert_close(rate, 0.5);
        }
    }

    #[test]
    fn dense_site_uses_per_weekday_means() {
        let cutoff = d(2025, 3, 31);
        let start = cutoff - Duration::days(69);
        let events: Vec<ServiceEvent> = start
            .iter_days()
            .take_while(|day| *day <= cutoff)
            .map(|day| ServiceEvent::new("S1", day, f64::from(weekday_index(day)) + 1.0))
            .collect();
        let options = RateOptions {
            min_obs: 5,
            ..RateOptions::default()
        };

        let estimate = estimate_weekday_rates(&events, cutoff, &options).unwrap();
        let rates = estimate.rates.rates_for("S1").unwrap();

        // The first event inside the window is divided by the default gap,
        // so only its weekday deviates from the daily volume.
        let first_wd = usize::from(weekday_index(cutoff - Duration::days(56)));
        for (wd, rate) in rates.iter().enumerate() {
            if wd != first_wd {
                assert_close(*rate, wd as f64 + 1.0);
            }
        }
        assert!(rates[first_wd] < first_wd as f64 + 1.0);
        assert!(estimate.warnings.is_empty());
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let events = vec![
            ServiceEvent::new("S1", d(2024, 1, 1), 1000.0),
            ServiceEvent::new("S1", d(2025, 1, 1), 7.0),
            ServiceEvent::new("S1", d(2025, 6, 1), 1000.0),
        ];
        let estimate =
            estimate_weekday_rates(&events, d(2025, 1, 10), &RateOptions::default()).unwrap();
        for rate in estimate.rates.rates_for("S1").unwrap() {
            assert_close(rate, 1.0);
        }
    }

    #[test]
    fn missing_volumes_and_duplicates_are_reported() {
        let events = vec![
            ServiceEvent::new("S1", d(2025, 1, 1), 7.0),
            ServiceEvent::new("S1", d(2025, 1, 1), 9.0),
            ServiceEvent {
                site_id: "S1".to_string(),
                event_date: d(2025, 1, 4),
                volume_m3: None,
            },
            ServiceEvent::new("S1", d(2025, 1, 8), 14.0),
        ];
        let options = RateOptions {
            min_obs: 100,
            ..RateOptions::default()
        };

        let estimate = estimate_weekday_rates(&events, d(2025, 1, 10), &options).unwrap();

        let reasons: Vec<WarningReason> = estimate.warnings.iter().map(|w| w.reason).collect();
        assert!(reasons.contains(&WarningReason::MissingVolume));
        assert!(reasons.contains(&WarningReason::DuplicateServiceDate));

        // The repeat on 2025-01-01 contributes nothing; rates match the
        // two-event case.
        for rate in estimate.rates.rates_for("S1").unwrap() {
            assert_close(rate, 1.5);
        }
    }

    #[test]
    fn sites_are_estimated_independently() {
        let events = vec![
            ServiceEvent::new("B", d(2025, 1, 1), 14.0),
            ServiceEvent::new("A", d(2025, 1, 1), 7.0),
        ];
        let estimate =
            estimate_weekday_rates(&events, d(2025, 1, 10), &RateOptions::default()).unwrap();
        assert_eq!(estimate.rates.site_ids(), vec!["A", "B"]);
        assert_close(estimate.rates.rates_for("A").unwrap()[0], 1.0);
        assert_close(estimate.rates.rates_for("B").unwrap()[0], 2.0);
    }

    #[test]
    fn estimation_is_idempotent() {
        let events = vec![
            ServiceEvent::new("S1", d(2025, 1, 1), 7.0),
            ServiceEvent::new("S1", d(2025, 1, 3), 4.0),
            ServiceEvent::new("S2", d(2025, 1, 2), 5.0),
        ];
        let options = RateOptions::default();
        let first = estimate_weekday_rates(&events, d(2025, 1, 10), &options).unwrap();
        let second = estimate_weekday_rates(&events, d(2025, 1, 10), &options).unwrap();
        assert_eq!(first, second);
    }
}
