//! Parsing of free-text Russian service schedules ("график вывоза").
//!
//! Schedules look like `"пн, чт"`, `"Вт, Пт / Вт, Пт"`, `"пн-пт"` or
//! `"ежедневно"`. Unknown tokens are ignored.

use std::sync::LazyLock;

use regex::Regex;
use waste_forecast_sites_models::WEEKDAYS;

/// Separators between weekday tokens.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;/\s]+").expect("valid regex"));

/// Values used in spreadsheets for "no schedule".
const PLACEHOLDERS: &[&str] = &["-", "—", "–"];

/// Marker for daily service ("ежедневно", "ежедн.").
const EVERY_DAY_MARKER: &str = "ежедн";

/// Token prefixes and the weekday (0 = Monday) they denote. Full names
/// ("понедельник", "четверг") match through their leading letters.
const WEEKDAY_PREFIXES: &[(&str, u8)] = &[
    ("пн", 0),
    ("пон", 0),
    ("вт", 1),
    ("ср", 2),
    ("чт", 3),
    ("чет", 3),
    ("пт", 4),
    ("пят", 4),
    ("сб", 5),
    ("суб", 5),
    ("вс", 6),
    ("вос", 6),
];

/// Parses a schedule description into sorted, de-duplicated weekday
/// indices (0 = Monday).
///
/// `None`, blank text and dash placeholders yield an empty list; an
/// "every day" marker yields all seven weekdays. Ranges such as `"пн-пт"`
/// expand inclusively and may wrap past Sunday.
#[must_use]
pub fn parse_grafik_weekdays(text: Option<&str>) -> Vec<u8> {
    let Some(text) = text else {
        return Vec::new();
    };

    let text = text.trim().to_lowercase();
    if text.is_empty() || PLACEHOLDERS.contains(&text.as_str()) {
        return Vec::new();
    }
    if text.contains(EVERY_DAY_MARKER) {
        return (0..).take(WEEKDAYS).collect();
    }

    let normalized = text.replace(['—', '–'], "-");
    let mut present = [false; WEEKDAYS];

    for token in SEPARATOR_RE.split(&normalized) {
        let token = token.trim_matches(|c: char| c == '.' || c == '-');
        if token.is_empty() {
            continue;
        }

        if let Some((from, to)) = token.split_once('-') {
            if let (Some(from), Some(to)) = (weekday_from_token(from), weekday_from_token(to)) {
                let mut wd = from;
                loop {
                    present[usize::from(wd)] = true;
                    if wd == to {
                        break;
                    }
                    wd = (wd + 1) % 7;
                }
            }
            continue;
        }

        if let Some(wd) = weekday_from_token(token) {
            present[usize::from(wd)] = true;
        }
    }

    (0..)
        .zip(present)
        .filter_map(|(wd, on)| on.then_some(wd))
        .collect()
}

fn weekday_from_token(token: &str) -> Option<u8> {
    let token = token.trim_matches('.');
    WEEKDAY_PREFIXES
        .iter()
        .find(|(prefix, _)| token.starts_with(prefix))
        .map(|&(_, wd)| wd)
}
