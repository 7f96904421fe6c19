//! Week grouping of chronological date sequences.
//!
//! Groups are returned as index lists into the original sequence so the
//! caller can apply them to any parallel value column.

use chrono::{Datelike as _, NaiveDate};

/// Returns every date in `[start, end]`, or an empty list if `start > end`.
#[must_use]
pub fn iter_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// Partitions `dates` into runs of consecutive positions sharing an ISO
/// week.
#[must_use]
pub fn week_groups(dates: &[NaiveDate]) -> Vec<Vec<usize>> {
    group_consecutive(dates, |date| {
        let week = date.iso_week();
        (week.year(), week.week(), 0)
    })
}

/// Like [`week_groups`], but also starts a new group whenever the month
/// changes inside an ISO week.
#[must_use]
pub fn week_groups_split_by_month(dates: &[NaiveDate]) -> Vec<Vec<usize>> {
    group_consecutive(dates, |date| {
        let week = date.iso_week();
        (week.year(), week.week(), date.month())
    })
}

fn group_consecutive(
    dates: &[NaiveDate],
    key: impl Fn(&NaiveDate) -> (i32, u32, u32),
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current_key = None;

    for (idx, date) in dates.iter().enumerate() {
        let k = key(date);
        match groups.last_mut() {
            Some(group) if current_key == Some(k) => group.push(idx),
            _ => groups.push(vec![idx]),
        }
        current_key = Some(k);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn iter_dates_is_inclusive() {
        let dates = iter_dates(d(2025, 1, 30), d(2025, 2, 2));
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[3], d(2025, 2, 2));
        assert!(iter_dates(d(2025, 2, 2), d(2025, 1, 30)).is_empty());
    }

    #[test]
    fn groups_by_iso_week() {
        // 2025-01-01 is a Wednesday; ISO week 2 starts Monday 2025-01-06.
        let dates = iter_dates(d(2025, 1, 1), d(2025, 1, 14));
        let groups = week_groups(&dates);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec![0, 1, 2, 3, 4]);
        assert_eq!(groups[1].len(), 7);
        assert_eq!(groups[2], vec![12, 13]);
    }

    #[test]
    fn splits_weeks_at_month_boundary() {
        // Monday 2025-01-27 .. Sunday 2025-02-02 is a single ISO week.
        let dates = iter_dates(d(2025, 1, 27), d(2025, 2, 2));
        assert_eq!(week_groups(&dates).len(), 1);

        let split = week_groups_split_by_month(&dates);
        assert_eq!(split, vec![vec![0, 1, 2, 3, 4], vec![5, 6]]);
    }

    #[test]
    fn iso_year_boundary_stays_in_one_week() {
        // 2024-12-30 and 2025-01-01 are both in ISO week 2025-W01.
        let dates = iter_dates(d(2024, 12, 30), d(2025, 1, 5));
        assert_eq!(week_groups(&dates).len(), 1);
        assert_eq!(week_groups_split_by_month(&dates).len(), 2);
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(week_groups(&[]).is_empty());
    }
}
