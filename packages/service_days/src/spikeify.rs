//! Sum-preserving redistribution of a series onto service weekdays.

use chrono::NaiveDate;
use waste_forecast_sites_models::{ServiceDayPattern, weekday_index};

use crate::{ServiceDayError, calendar::week_groups};

/// Largest number of decimals honoured when rounding; beyond this `f64`
/// has no more precision to give.
const MAX_DECIMALS: u8 = 15;

/// Moves each group's total onto the days whose weekday is in `pattern`.
///
/// Within a group, selected days receive `total * weight / sum(weights)`
/// using `pattern.weekday_weights`, and every other day receives `0`. If
/// the selected weights sum to zero they are treated as equal. Groups with
/// no selected day are passed through unchanged. Outputs are rounded to
/// `decimals` places and the rounding residual is assigned to the selected
/// day with the largest weight, so each group keeps its rounded total.
///
/// `groups` defaults to [`week_groups`] of `dates`.
///
/// # Errors
///
/// Returns [`ServiceDayError::LengthMismatch`] if `dates` and `values`
/// differ in length, or [`ServiceDayError::GroupIndexOutOfRange`] if a
/// group refers past the end of the series.
pub fn spikeify_weekly_values(
    dates: &[NaiveDate],
    values: &[f64],
    pattern: &ServiceDayPattern,
    groups: Option<&[Vec<usize>]>,
    decimals: u8,
) -> Result<Vec<f64>, ServiceDayError> {
    if dates.len() != values.len() {
        return Err(ServiceDayError::LengthMismatch {
            dates: dates.len(),
            values: values.len(),
        });
    }

    let default_groups;
    let groups = if let Some(groups) = groups {
        groups
    } else {
        default_groups = week_groups(dates);
        default_groups.as_slice()
    };

    if let Some(&index) = groups.iter().flatten().find(|&&idx| idx >= values.len()) {
        return Err(ServiceDayError::GroupIndexOutOfRange {
            index,
            len: values.len(),
        });
    }

    let mut out = values.to_vec();

    for group in groups {
        let selected: Vec<(usize, f64)> = group
            .iter()
            .filter_map(|&idx| {
                let wd = weekday_index(dates[idx]);
                pattern
                    .contains(wd)
                    .then(|| (idx, sanitize_weight(pattern.weekday_weights[usize::from(wd)])))
            })
            .collect();

        if selected.is_empty() {
            continue;
        }

        let total: f64 = group.iter().map(|&idx| values[idx]).sum();
        let weight_sum: f64 = selected.iter().map(|(_, w)| w).sum();
        let uniform = weight_sum <= 0.0;

        for &idx in group {
            out[idx] = 0.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let n_selected = selected.len() as f64;
        let mut assigned = 0.0;
        for &(idx, weight) in &selected {
            let share = if uniform {
                1.0 / n_selected
            } else {
                weight / weight_sum
            };
            let value = round_to(total * share, decimals);
            out[idx] = value;
            assigned += value;
        }

        let residual = round_to(total, decimals) - assigned;
        if residual.abs() > 0.0
            && let Some(&(anchor, _)) = selected
                .iter()
                .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
        {
            out[anchor] = round_to(out[anchor] + residual, decimals);
        }
    }

    Ok(out)
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Rounds `value` to `decimals` places (half away from zero).
#[must_use]
pub fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10_f64.powi(i32::from(decimals.min(MAX_DECIMALS)));
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{iter_dates, week_groups_split_by_month};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn moves_week_total_onto_service_days() {
        // Monday 2025-01-06 .. Sunday 2025-01-12, serviced Tuesday and Friday.
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 12));
        let values = vec![1.0; 7];
        let pattern = ServiceDayPattern::uniform([1, 4]);

        let out = spikeify_weekly_values(&dates, &values, &pattern, None, 6).unwrap();

        assert_eq!(out, vec![0.0, 3.5, 0.0, 0.0, 3.5, 0.0, 0.0]);
    }

    #[test]
    fn follows_weekday_weights() {
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 12));
        let values = vec![1.0; 7];
        let mut weights = [0.0; 7];
        weights[0] = 3.0;
        weights[3] = 1.0;
        let pattern = ServiceDayPattern::new([0, 3], weights);

        let out = spikeify_weekly_values(&dates, &values, &pattern, None, 6).unwrap();

        assert_close(out[0], 5.25);
        assert_close(out[3], 1.75);
        assert_close(out.iter().sum::<f64>(), 7.0);
    }

    #[test]
    fn zero_weights_fall_back_to_equal_shares() {
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 12));
        let values = vec![2.0; 7];
        let pattern = ServiceDayPattern::new([2, 5], [0.0; 7]);

        let out = spikeify_weekly_values(&dates, &values, &pattern, None, 6).unwrap();
        assert_close(out[2], 7.0);
        assert_close(out[5], 7.0);
    }

    #[test]
    fn groups_without_service_days_pass_through() {
        // Monday..Wednesday only; pattern services Saturday.
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 8));
        let values = vec![0.3, 0.1, 0.7];
        let pattern = ServiceDayPattern::uniform([5]);

        let out = spikeify_weekly_values(&dates, &values, &pattern, None, 6).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn conserves_totals_per_group_with_rounding() {
        let dates = iter_dates(d(2025, 1, 1), d(2025, 3, 31));
        let values: Vec<f64> = (0..dates.len())
            .map(|i| f64::from(u32::try_from(i).unwrap() % 5) / 3.0)
            .collect();
        let pattern = ServiceDayPattern::new([0, 2, 4], [1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 0.0]);

        for groups in [week_groups(&dates), week_groups_split_by_month(&dates)] {
            let out = spikeify_weekly_values(&dates, &values, &pattern, Some(groups.as_slice()), 2)
                .unwrap();
            for group in &groups {
                let before: f64 = group.iter().map(|&i| values[i]).sum();
                let after: f64 = group.iter().map(|&i| out[i]).sum();
                assert!((before - after).abs() <= 0.005 + 1e-9, "{before} vs {after}");
            }
        }
    }

    #[test]
    fn rejects_mismatched_lengths_and_bad_groups() {
        let dates = iter_dates(d(2025, 1, 6), d(2025, 1, 8));
        let pattern = ServiceDayPattern::uniform([0]);

        assert!(matches!(
            spikeify_weekly_values(&dates, &[1.0], &pattern, None, 6),
            Err(ServiceDayError::LengthMismatch { .. })
        ));

        let groups = vec![vec![0, 5]];
        assert!(matches!(
            spikeify_weekly_values(&dates, &[1.0; 3], &pattern, Some(groups.as_slice()), 6),
            Err(ServiceDayError::GroupIndexOutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn round_to_handles_large_decimals() {
        assert_close(round_to(1.234_567, 2), 1.23);
        assert_close(round_to(0.1, 200), 0.1);
    }
}
