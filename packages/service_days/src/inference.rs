//! Service-day pattern inference from schedules and event histograms.
//!
//! A parsed schedule is trusted only while the observed events agree with
//! it; otherwise the pattern is inferred from the weekdays that see the
//! most events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use waste_forecast_sites_models::{ServiceDayPattern, ServiceEvent, WEEKDAYS, weekday_index};

use crate::{
    ServiceDayError,
    weights::{mean_weights_from_sums_and_counts, pick_top_k_weekdays},
};

/// How a schedule covering all seven weekdays is handled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DailyMode {
    /// Daily sites keep their smooth series.
    #[default]
    Noop,
    /// Daily sites are redistributed by their weekday weights.
    Redistribute,
}

/// Where a site's pattern came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternSource {
    /// Daily schedule left untouched.
    DailyNoop,
    /// Parsed schedule.
    Schedule,
    /// Schedule disagreed with events; inferred from counts instead.
    GatedToInferred,
    /// Schedule disagreed with events and inference had too little data.
    GatedToNone,
    /// No schedule; inferred from counts.
    Inferred,
    /// No schedule and too little data.
    None,
}

/// Observed events for one site plus its parsed schedule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteHistory {
    /// Number of events per weekday.
    pub counts: [u32; WEEKDAYS],
    /// Total volume per weekday.
    pub sums: [f64; WEEKDAYS],
    /// Scheduled weekdays, as returned by
    /// [`parse_grafik_weekdays`](crate::schedule::parse_grafik_weekdays).
    pub schedule: Vec<u8>,
}

impl SiteHistory {
    /// Total number of events.
    #[must_use]
    pub fn total_events(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Share of events that fell on a scheduled weekday, `0` with no events.
    #[must_use]
    pub fn schedule_alignment(&self) -> f64 {
        let total = self.total_events();
        if total == 0 {
            return 0.0;
        }
        let in_schedule: u32 = self
            .schedule
            .iter()
            .filter_map(|wd| self.counts.get(usize::from(*wd)))
            .sum();
        f64::from(in_schedule) / f64::from(total)
    }
}

/// Inference thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatternInferenceOptions {
    /// Minimum events before a pattern is inferred.
    pub min_events: u32,
    /// Minimum average events per week before a pattern is inferred.
    pub min_events_per_week: f64,
    /// Upper bound on inferred service days per week.
    pub max_k: usize,
    /// Minimum share of events on scheduled weekdays for the schedule to be
    /// trusted. `<= 0` disables the check.
    pub schedule_alignment_threshold: f64,
    /// Handling of every-day schedules.
    pub daily_mode: DailyMode,
}

impl Default for PatternInferenceOptions {
    fn default() -> Self {
        Self {
            min_events: 8,
            min_events_per_week: 0.75,
            max_k: 3,
            schedule_alignment_threshold: 0.6,
            daily_mode: DailyMode::Noop,
        }
    }
}

impl PatternInferenceOptions {
    /// # Errors
    ///
    /// Returns [`ServiceDayError::InvalidConfig`] if `max_k` is zero or
    /// `min_events_per_week` is negative.
    pub fn validate(&self) -> Result<(), ServiceDayError> {
        if self.max_k == 0 {
            return Err(ServiceDayError::InvalidConfig {
                message: "max_k must be at least 1".to_string(),
            });
        }
        if self.min_events_per_week.is_nan() || self.min_events_per_week < 0.0 {
            return Err(ServiceDayError::InvalidConfig {
                message: format!(
                    "min_events_per_week must be non-negative, got {}",
                    self.min_events_per_week
                ),
            });
        }
        Ok(())
    }
}

/// Inference outcome for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredPattern {
    /// Pattern to apply, if any.
    pub pattern: Option<ServiceDayPattern>,
    /// How the outcome was reached.
    pub source: PatternSource,
}

/// Builds per-site weekday histograms from events with a positive volume.
/// Schedules are left empty.
#[must_use]
pub fn week_histogram(events: &[ServiceEvent]) -> BTreeMap<String, SiteHistory> {
    let mut histories: BTreeMap<String, SiteHistory> = BTreeMap::new();
    for event in events {
        let Some(volume) = event.volume_m3.filter(|v| v.is_finite() && *v > 0.0) else {
            continue;
        };
        let history = histories.entry(event.site_id.clone()).or_default();
        let wd = usize::from(weekday_index(event.event_date));
        history.counts[wd] += 1;
        history.sums[wd] += volume;
    }
    histories
}

/// Decides a service-day pattern for every site in `histories`.
///
/// `total_days` is the length of the history the counts were taken over.
/// With no history length there is no event rate, so nothing is inferred
/// from counts.
///
/// # Errors
///
/// Returns [`ServiceDayError::InvalidConfig`] if the options are invalid.
pub fn infer_service_day_patterns(
    histories: &BTreeMap<String, SiteHistory>,
    total_days: u32,
    options: &PatternInferenceOptions,
) -> Result<BTreeMap<String, InferredPattern>, ServiceDayError> {
    options.validate()?;

    let total_weeks = f64::from(total_days) / 7.0;

    let results: BTreeMap<String, InferredPattern> = histories
        .iter()
        .map(|(site_id, history)| {
            let outcome = infer_site(history, total_weeks, options);
            log::debug!("Site {site_id}: service-day pattern source {}", outcome.source);
            (site_id.clone(), outcome)
        })
        .collect();

    let with_pattern = results.values().filter(|r| r.pattern.is_some()).count();
    log::info!(
        "Inferred service-day patterns for {with_pattern} of {} sites",
        results.len()
    );

    Ok(results)
}

fn infer_site(
    history: &SiteHistory,
    total_weeks: f64,
    options: &PatternInferenceOptions,
) -> InferredPattern {
    if history.schedule.is_empty() {
        let pattern = infer_from_counts(history, total_weeks, options);
        let source = if pattern.is_some() {
            PatternSource::Inferred
        } else {
            PatternSource::None
        };
        return InferredPattern { pattern, source };
    }

    if options.daily_mode == DailyMode::Noop && history.schedule.len() == WEEKDAYS {
        return InferredPattern {
            pattern: None,
            source: PatternSource::DailyNoop,
        };
    }

    if options.schedule_alignment_threshold > 0.0
        && history.schedule_alignment() < options.schedule_alignment_threshold
    {
        let pattern = infer_from_counts(history, total_weeks, options);
        let source = if pattern.is_some() {
            PatternSource::GatedToInferred
        } else {
            PatternSource::GatedToNone
        };
        return InferredPattern { pattern, source };
    }

    InferredPattern {
        pattern: Some(ServiceDayPattern::new(
            history.schedule.iter().copied(),
            mean_weights_from_sums_and_counts(&history.sums, &history.counts),
        )),
        source: PatternSource::Schedule,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn infer_from_counts(
    history: &SiteHistory,
    total_weeks: f64,
    options: &PatternInferenceOptions,
) -> Option<ServiceDayPattern> {
    let total_events = history.total_events();
    if total_events < options.min_events {
        return None;
    }

    let events_per_week = if total_weeks > 0.0 {
        f64::from(total_events) / total_weeks
    } else {
        0.0
    };
    if events_per_week < options.min_events_per_week {
        return None;
    }

    let k = (events_per_week.round() as usize).clamp(1, options.max_k.min(WEEKDAYS));
    let weekdays = pick_top_k_weekdays(&history.counts, k);

    Some(ServiceDayPattern::new(
        weekdays,
        mean_weights_from_sums_and_counts(&history.sums, &history.counts),
    ))
}
