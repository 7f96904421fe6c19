//! Holiday uplift of daily inflows.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::HolidayConfig;

/// Multiplies every site's inflow on holiday dates by `config.multiplier`.
///
/// Each series in `series` is aligned with `dates`. Returns the number of
/// dates in `dates` that are holidays.
pub fn apply_holiday_multiplier(
    dates: &[NaiveDate],
    series: &mut BTreeMap<String, Vec<f64>>,
    config: &HolidayConfig,
) -> usize {
    let positions: Vec<usize> = dates
        .iter()
        .enumerate()
        .filter(|(_, date)| config.dates.contains(date))
        .map(|(index, _)| index)
        .collect();

    if positions.is_empty() {
        return 0;
    }

    for values in series.values_mut() {
        for &index in &positions {
            if let Some(value) = values.get_mut(index) {
                *value *= config.multiplier;
            }
        }
    }

    log::info!(
        "Applied holiday multiplier {} on {} days ({})",
        config.multiplier,
        positions.len(),
        config.region.as_deref().unwrap_or("no region")
    );

    positions.len()
}
