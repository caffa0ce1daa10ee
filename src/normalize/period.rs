// src/normalize/period.rs

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::trace;

use super::date_parser::PLAUSIBLE_YEARS;
use crate::schema::types::ALL_PERIODS;

/// A filename matcher: returns `YYYY-MM` on success.
pub type PeriodMatcher = fn(&str) -> Option<String>;

/// Matchers tried in order; the first hit wins. New filename conventions are
/// added by appending here.
pub const FILENAME_MATCHERS: &[(&str, PeriodMatcher)] = &[
    ("month-name-year", month_name_year),
    ("year-sep-month", year_sep_month),
    ("yyyymm", year_month_compact),
    ("yyyymmdd", year_month_day_compact),
];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static MONTH_NAME_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z])([A-Za-z]{3,})[_-]?(\d{4})(?:\D|$)").unwrap());
static YEAR_SEP_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})[_-](0[1-9]|1[0-2])(?:\D|$)").unwrap());
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})(0[1-9]|1[0-2])(?:\D|$)").unwrap());
static YEAR_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(\d{4})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])(?:\D|$)").unwrap()
});

/// `"oct"`, `"Sept"`, `"OCTOBER"` → month number. The token must be at least
/// three letters and a prefix of the full English month name.
pub fn month_number(token: &str) -> Option<u32> {
    let t = token.to_ascii_lowercase();
    if t.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&t))
        .map(|i| i as u32 + 1)
}

fn format_period(year: &str, month: u32) -> String {
    format!("{}-{:02}", year, month)
}

/// `NH_ProviderInfo_Oct2024.csv`, `staffing_October-2024.csv`
pub fn month_name_year(name: &str) -> Option<String> {
    // A failed candidate may have consumed the boundary its successor needs,
    // so scan from every letter-run start rather than relying on one pass.
    let mut start = 0;
    while start < name.len() {
        let caps = MONTH_NAME_YEAR.captures(&name[start..])?;
        let token = caps.get(1)?;
        if let Some(m) = month_number(token.as_str()) {
            return Some(format_period(&caps[2], m));
        }
        start += token.end();
    }
    None
}

/// `data_2024_10.csv`, `data-2024-10.csv`
pub fn year_sep_month(name: &str) -> Option<String> {
    let caps = YEAR_SEP_MONTH.captures(name)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// `export_202410.csv`
pub fn year_month_compact(name: &str) -> Option<String> {
    let caps = YEAR_MONTH.captures(name)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// `export_20241027.csv` keeps only the year-month.
pub fn year_month_day_compact(name: &str) -> Option<String> {
    let caps = YEAR_MONTH_DAY.captures(name)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// Infer `YYYY-MM` from a file name, or `"ALL"` when nothing matches.
pub fn period_from_filename(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    for (label, matcher) in FILENAME_MATCHERS {
        if let Some(p) = matcher(base) {
            trace!(file = base, matcher = label, period = %p, "period inferred from filename");
            return p;
        }
    }
    ALL_PERIODS.to_string()
}

pub fn period_from_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Validate a `YYYY-MM` string, returning the first day of that month.
pub fn parse_period(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 7 || b[4] != b'-' {
        return None;
    }
    if !b[0..4].iter().chain(&b[5..7]).all(u8::is_ascii_digit) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    if !PLAUSIBLE_YEARS.contains(&year) {
        return None;
    }
    let month: u32 = s[5..7].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}
