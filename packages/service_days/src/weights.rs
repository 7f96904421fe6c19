//! Weekday selection and weighting from event histograms.

use waste_forecast_sites_models::WEEKDAYS;

/// Returns the `k` weekdays with the most observations, in ascending
/// weekday order.
///
/// Ties are broken in favour of the earlier weekday. Weekdays with a zero
/// count are still eligible, so the result always has `min(k, 7)` entries.
#[must_use]
pub fn pick_top_k_weekdays(counts: &[u32; WEEKDAYS], k: usize) -> Vec<u8> {
    let mut order: Vec<u8> = (0..).take(WEEKDAYS).collect();
    order.sort_by(|a, b| {
        counts[usize::from(*b)]
            .cmp(&counts[usize::from(*a)])
            .then_with(|| a.cmp(b))
    });
    order.truncate(k.min(WEEKDAYS));
    order.sort_unstable();
    order
}

/// Average volume per observation for each weekday, `0` where there are no
/// observations.
#[must_use]
pub fn mean_weights_from_sums_and_counts(
    sums: &[f64; WEEKDAYS],
    counts: &[u32; WEEKDAYS],
) -> [f64; WEEKDAYS] {
    std::array::from_fn(|wd| {
        if counts[wd] > 0 {
            sums[wd] / f64::from(counts[wd])
        } else {
            0.0
        }
    })
}
