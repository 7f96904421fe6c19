#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared row types for the site fill forecasting pipeline.
//!
//! Every component (rate estimation, fill simulation, service-day
//! adjustment and district reconciliation) consumes and produces plain
//! ordered sequences of these rows. Grouping happens inside each component
//! via sorted maps, so no dataframe abstraction is needed.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of weekdays in a rate row set (0 = Monday .. 6 = Sunday).
pub const WEEKDAYS: usize = 7;

/// District assigned to sites that have no registry mapping.
pub const UNMAPPED_DISTRICT: &str = "__unmapped__";

/// Liters per cubic meter.
pub const LITERS_PER_M3: f64 = 1000.0;

/// Returns the weekday index of `date`, with Monday as `0`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// One observed collection or measurement at a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    /// Site identifier.
    pub site_id: String,
    /// Date the collection happened.
    pub event_date: NaiveDate,
    /// Collected volume in cubic meters, if it was recorded.
    pub volume_m3: Option<f64>,
}

impl ServiceEvent {
    /// Creates an event with a recorded volume.
    #[must_use]
    pub fn new(site_id: impl Into<String>, event_date: NaiveDate, volume_m3: f64) -> Self {
        Self {
            site_id: site_id.into(),
            event_date,
            volume_m3: Some(volume_m3),
        }
    }
}

/// Estimated daily accumulation for one site on one weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayRate {
    /// Site identifier.
    pub site_id: String,
    /// Weekday index, 0 = Monday .. 6 = Sunday.
    pub weekday: u8,
    /// Accumulation rate in cubic meters per day.
    pub rate_m3_per_day: f64,
}

/// Error returned when a set of [`WeekdayRate`] rows does not describe
/// exactly seven non-negative rates per site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRateTableError {
    /// Site whose rows are malformed.
    pub site_id: String,
    /// What is wrong with them.
    pub message: String,
}

impl std::fmt::Display for InvalidRateTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid weekday rates for site {}: {}",
            self.site_id, self.message
        )
    }
}

impl std::error::Error for InvalidRateTableError {}

/// Weekday rate table: seven rows per site, ordered by site then weekday.
///
/// The only way to build a non-empty table is [`WeekdayRateTable::from_rows`],
/// which enforces the seven-weekday invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekdayRateTable {
    rows: Vec<WeekdayRate>,
}

impl WeekdayRateTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Builds a table from rows, checking that every site has exactly one
    /// finite, non-negative rate for each of the seven weekdays.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRateTableError`] naming the first offending site.
    pub fn from_rows(rows: Vec<WeekdayRate>) -> Result<Self, InvalidRateTableError> {
        let mut table = Self { rows };
        table.rows.sort_by(|a, b| {
            a.site_id
                .cmp(&b.site_id)
                .then_with(|| a.weekday.cmp(&b.weekday))
        });
        table.by_site()?;
        Ok(table)
    }

    /// Returns the rows, ordered by site then weekday.
    #[must_use]
    pub fn rows(&self) -> &[WeekdayRate] {
        &self.rows
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows (seven per site).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the distinct site ids in ascending order.
    #[must_use]
    pub fn site_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.rows.iter().map(|r| r.site_id.as_str()).collect();
        ids.dedup();
        ids
    }

    /// Returns the seven rates for `site_id`, indexed by weekday.
    #[must_use]
    pub fn rates_for(&self, site_id: &str) -> Option<[f64; WEEKDAYS]> {
        let mut rates = [0.0; WEEKDAYS];
        let mut found = false;
        for row in self.rows.iter().filter(|r| r.site_id == site_id) {
            if let Some(slot) = rates.get_mut(usize::from(row.weekday)) {
                *slot = row.rate_m3_per_day;
                found = true;
            }
        }
        found.then_some(rates)
    }

    /// Groups the table into one seven-element rate array per site.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRateTableError`] if any site is missing a weekday,
    /// repeats a weekday, uses a weekday outside `0..=6`, or carries a
    /// negative or non-finite rate.
    pub fn by_site(&self) -> Result<BTreeMap<String, [f64; WEEKDAYS]>, InvalidRateTableError> {
        let mut seen: BTreeMap<String, ([f64; WEEKDAYS], [bool; WEEKDAYS])> = BTreeMap::new();

        for row in &self.rows {
            let invalid = |message: String| InvalidRateTableError {
                site_id: row.site_id.clone(),
                message,
            };

            let idx = usize::from(row.weekday);
            if idx >= WEEKDAYS {
                return Err(invalid(format!("weekday {} out of range 0-6", row.weekday)));
            }
            if !row.rate_m3_per_day.is_finite() || row.rate_m3_per_day < 0.0 {
                return Err(invalid(format!(
                    "rate {} on weekday {} is not a non-negative number",
                    row.rate_m3_per_day, row.weekday
                )));
            }

            let (rates, present) = seen
                .entry(row.site_id.clone())
                .or_insert(([0.0; WEEKDAYS], [false; WEEKDAYS]));
            if present[idx] {
                return Err(invalid(format!("weekday {} listed twice", row.weekday)));
            }
            rates[idx] = row.rate_m3_per_day;
            present[idx] = true;
        }

        seen.into_iter()
            .map(|(site_id, (rates, present))| {
                if let Some(missing) = present.iter().position(|p| !p) {
                    return Err(InvalidRateTableError {
                        site_id,
                        message: format!("weekday {missing} has no rate"),
                    });
                }
                Ok((site_id, rates))
            })
            .collect()
    }
}

/// Registry entry describing a site's district and bin capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRegistryEntry {
    /// Site identifier.
    pub site_id: String,
    /// District the site belongs to, if known.
    pub district: Option<String>,
    /// Number of bins at the site.
    pub bin_count: u32,
    /// Volume of a single bin in liters.
    pub bin_size_liters: f64,
}

impl SiteRegistryEntry {
    /// Creates a registry entry mapped to `district`.
    #[must_use]
    pub fn new(
        site_id: impl Into<String>,
        district: impl Into<String>,
        bin_count: u32,
        bin_size_liters: f64,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            district: Some(district.into()),
            bin_count,
            bin_size_liters,
        }
    }

    /// Total site capacity in liters (`bin_count * bin_size_liters`).
    #[must_use]
    pub fn capacity_liters(&self) -> f64 {
        f64::from(self.bin_count) * self.bin_size_liters
    }

    /// Returns the district name if it is present and non-blank.
    #[must_use]
    pub fn district_name(&self) -> Option<&str> {
        self.district
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Forecast for one site on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDayForecast {
    /// Site identifier.
    pub site_id: String,
    /// Forecast day.
    pub date: NaiveDate,
    /// Cumulative volume since the last emptying, in cubic meters.
    pub pred_volume_m3: f64,
    /// Fill fraction of site capacity, in `[0, 1]`.
    pub fill_pct: f64,
    /// `1.0` when `fill_pct` has crossed the overflow threshold, else `0.0`.
    pub overflow_prob: f64,
}

/// Authoritative forecast for a district on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictForecast {
    /// Forecast day.
    pub date: NaiveDate,
    /// District name.
    pub district: String,
    /// Forecast volume in cubic meters.
    pub forecast_m3: f64,
}

/// Weekdays on which a site is actually serviced, plus the relative share
/// of volume attributed to each weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDayPattern {
    /// Sorted, de-duplicated weekday indices (0 = Monday).
    pub weekdays: Vec<u8>,
    /// Relative weight per weekday, indexed 0..=6.
    pub weekday_weights: [f64; WEEKDAYS],
}

impl ServiceDayPattern {
    /// Creates a pattern, sorting and de-duplicating `weekdays` and dropping
    /// indices outside `0..=6`.
    #[must_use]
    pub fn new(weekdays: impl IntoIterator<Item = u8>, weekday_weights: [f64; WEEKDAYS]) -> Self {
        let mut weekdays: Vec<u8> = weekdays
            .into_iter()
            .filter(|wd| usize::from(*wd) < WEEKDAYS)
            .collect();
        weekdays.sort_unstable();
        weekdays.dedup();
        Self {
            weekdays,
            weekday_weights,
        }
    }

    /// Creates a pattern with equal weight on every weekday.
    #[must_use]
    pub fn uniform(weekdays: impl IntoIterator<Item = u8>) -> Self {
        Self::new(weekdays, [1.0; WEEKDAYS])
    }

    /// Returns `true` if `weekday` is a service day.
    #[must_use]
    pub fn contains(&self, weekday: u8) -> bool {
        self.weekdays.contains(&weekday)
    }
}

/// Why a [`ForecastWarning`] was recorded.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarningReason {
    /// Events without a usable volume were skipped during rate estimation.
    MissingVolume,
    /// Several events shared a date; the repeats contributed no rate.
    DuplicateServiceDate,
    /// Too few observations per weekday; the site-wide mean rate was used.
    FallbackRate,
    /// A rated site has no registry entry and no capacity override.
    SiteMissingRegistry,
    /// A site's capacity resolved to zero or a non-finite value.
    InvalidCapacity,
    /// A forecast site has no district mapping in the registry.
    SiteMissingDistrict,
    /// Sites sum to zero while the district forecast is positive.
    SiteSumZeroDistrictPositive,
    /// No district forecast exists for a district-day that has sites.
    DistrictForecastMissing,
    /// Reconciled site sum differs from the district forecast by more than
    /// the configured tolerance.
    DeltaAboveTolerance,
}

/// A soft anomaly recorded alongside component output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastWarning {
    /// Warning category.
    pub reason: WarningReason,
    /// Affected day, if the warning is day-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Affected district, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Affected site, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// Site sum before reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_before: Option<f64>,
    /// District forecast volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_m3: Option<f64>,
    /// Site sum after reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites_sum_after_m3: Option<f64>,
    /// Relative difference between reconciled sum and forecast, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_pct: Option<f64>,
    /// Number of affected records (events, observations, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ForecastWarning {
    /// Creates a warning with no context attached.
    #[must_use]
    pub const fn new(reason: WarningReason) -> Self {
        Self {
            reason,
            date: None,
            district: None,
            site_id: None,
            s_before: None,
            forecast_m3: None,
            sites_sum_after_m3: None,
            delta_pct: None,
            count: None,
        }
    }

    /// Attaches a site id.
    #[must_use]
    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Attaches a day and district.
    #[must_use]
    pub fn with_district_day(mut self, date: NaiveDate, district: impl Into<String>) -> Self {
        self.date = Some(date);
        self.district = Some(district.into());
        self
    }

    /// Attaches a record count.
    #[must_use]
    pub const fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

impl std::fmt::Display for ForecastWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(date) = self.date {
            write!(f, " date={date}")?;
        }
        if let Some(district) = &self.district {
            write!(f, " district={district}")?;
        }
        if let Some(site_id) = &self.site_id {
            write!(f, " site={site_id}")?;
        }
        if let Some(count) = self.count {
            write!(f, " count={count}")?;
        }
        if let Some(delta) = self.delta_pct {
            write!(f, " delta_pct={delta:.2}")?;
        }
        Ok(())
    }
}
