//! Scenario configuration.
//!
//! A scenario bundles every component's options plus the feature switches
//! for the optional stages, and is loaded from TOML:
//!
//! ```toml
//! [flags]
//! enable_reconcile = true
//! enable_spikeify = false
//!
//! [rates]
//! window_days = 56
//!
//! [rolling]
//! max_cutoff_date = "2025-12-31"
//!
//! [holidays]
//! enabled = true
//! dates = ["2025-01-01", "2025-01-07"]
//! ```
//!
//! Every section and key is optional and falls back to its default.

use std::{collections::BTreeSet, path::Path};

use chrono::NaiveDate;
use serde::Deserialize;
use waste_forecast_rates::RateOptions;
use waste_forecast_reconcile::ReconcileOptions;
use waste_forecast_service_days::inference::PatternInferenceOptions;
use waste_forecast_simulator::SimulationOptions;

use crate::PipelineError;

/// Switches for the optional pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Rescale site forecasts to district totals when a district forecast
    /// is supplied.
    pub enable_reconcile: bool,
    /// Move daily inflows onto service days when patterns are supplied.
    pub enable_spikeify: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_reconcile: true,
            enable_spikeify: false,
        }
    }
}

/// Service-day adjustment settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceDayConfig {
    /// Decimal places kept when redistributing.
    pub decimals: u8,
    /// Split week groups at month boundaries so monthly totals are kept.
    pub split_by_month: bool,
    /// Thresholds for deriving patterns from schedules and history.
    pub inference: PatternInferenceOptions,
}

impl Default for ServiceDayConfig {
    fn default() -> Self {
        Self {
            decimals: 6,
            split_by_month: false,
            inference: PatternInferenceOptions::default(),
        }
    }
}

/// Limits on forecast requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Latest cutoff date a request may use, typically the last date with
    /// complete data.
    pub max_cutoff_date: Option<NaiveDate>,
}

/// Holiday uplift settings.
///
/// Daily inflows on the listed dates are multiplied by `multiplier` before
/// simulation. Dates outside the forecast horizon are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HolidayConfig {
    /// Apply the uplift.
    pub enabled: bool,
    /// Factor applied to a holiday's inflow.
    pub multiplier: f64,
    /// Holiday calendar label, for reporting only.
    pub region: Option<String>,
    /// Holiday dates.
    pub dates: BTreeSet<NaiveDate>,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            multiplier: 1.15,
            region: None,
            dates: BTreeSet::new(),
        }
    }
}

impl HolidayConfig {
    /// Checks the multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `multiplier` is not a
    /// positive number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.multiplier.is_finite() && self.multiplier > 0.0) {
            return Err(PipelineError::InvalidConfig {
                message: format!(
                    "holidays.multiplier must be positive, got {}",
                    self.multiplier
                ),
            });
        }
        Ok(())
    }
}

/// Full scenario configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Optional stage switches.
    pub flags: FeatureFlags,
    /// Rate estimation options.
    pub rates: RateOptions,
    /// Fill simulation options.
    pub simulator: SimulationOptions,
    /// Reconciliation options.
    pub reconcile: ReconcileOptions,
    /// Service-day adjustment options.
    pub service_days: ServiceDayConfig,
    /// Request limits.
    pub rolling: RollingConfig,
    /// Holiday uplift.
    pub holidays: HolidayConfig,
}

impl ScenarioConfig {
    /// Parses a scenario from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or has
    /// values of the wrong type, or a component error if a value is out of
    /// range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, otherwise
    /// as [`ScenarioConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded scenario from {}", path.display());
        Ok(config)
    }

    /// Checks every component's options.
    ///
    /// # Errors
    ///
    /// Returns the first component error found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.rates.validate()?;
        self.simulator.validate()?;
        self.reconcile.validate()?;
        self.service_days.inference.validate()?;
        self.holidays.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use waste_forecast_reconcile::ReconcileMethod;
    use waste_forecast_service_days::inference::DailyMode;

    use super::*;

    #[test]
    fn parses_default_scenario_file() {
        let toml_str = include_str!("../scenarios/default.toml");
        let config = ScenarioConfig::from_toml_str(toml_str).unwrap();

        assert!(config.flags.enable_reconcile);
        assert!(!config.flags.enable_spikeify);
        assert_eq!(config.rates, RateOptions::default());
        assert_eq!(config.reconcile.method, ReconcileMethod::Proportional);
        assert_eq!(config.service_days.inference.daily_mode, DailyMode::Noop);
        assert_eq!(
            config.rolling.max_cutoff_date,
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        assert!(!config.holidays.enabled);
        assert!((config.holidays.multiplier - 1.15).abs() < f64::EPSILON);
        assert!(
            config
                .holidays
                .dates
                .contains(&NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
        assert!((config.simulator.default_capacity_liters - 1100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_holiday_dates() {
        let config = ScenarioConfig::from_toml_str(
            r#"
[holidays]
enabled = true
multiplier = 1.3
dates = ["2025-05-01", "2025-05-09"]
"#,
        )
        .unwrap();
        assert!(config.holidays.enabled);
        assert_eq!(config.holidays.dates.len(), 2);

        let err = ScenarioConfig::from_toml_str("[holidays]\nmultiplier = 0.0\n").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
    }

    #[test]
    fn empty_scenario_uses_defaults() {
        let config = ScenarioConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ScenarioConfig::from_toml_str(
            "[simulator]\nreset_on_near_capacity = true\ncapacity_liters = 2200.0\n",
        )
        .unwrap();
        assert!(config.simulator.reset_on_near_capacity);
        assert_eq!(config.simulator.capacity_liters, Some(2200.0));
        assert!((config.simulator.overflow_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_unknown_reconcile_method() {
        let err = ScenarioConfig::from_toml_str("[reconcile]\nmethod = \"top_down\"\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn rejects_inverted_clip_bounds() {
        let err =
            ScenarioConfig::from_toml_str("[reconcile]\nclip_min = 3.0\nclip_max = 1.0\n")
                .unwrap_err();
        assert!(matches!(err, PipelineError::Reconcile(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ScenarioConfig::load(Path::new("/nonexistent/scenario.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
