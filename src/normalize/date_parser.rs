use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use super::utils::clean_str;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%m-%d-%y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Years a processing date can plausibly carry. `%Y` accepts any width, so
/// without this bound `10/01/24` would parse as year 10 under `%Y/%m/%d`.
pub const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

fn plausible(d: NaiveDate) -> Option<NaiveDate> {
    PLAUSIBLE_YEARS.contains(&d.year()).then_some(d)
}

/// Parse a processing-date cell into a calendar date. Time and offset parts
/// are dropped; only the date matters for period derivation.
pub fn parse_processing_date(raw: &str) -> Option<NaiveDate> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return plausible(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| {
            NaiveDateTime::parse_from_str(s, f)
                .ok()
                .and_then(|dt| plausible(dt.date()))
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok().and_then(plausible))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn accepts_the_shapes_cms_exports_use() {
        assert_eq!(parse_processing_date("2024-10-01"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("10/01/2024"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("2024/10/01"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("2024-10-01 00:00:00"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("2024-10-01T08:30:00Z"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("01-Oct-2024"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("October 1, 2024"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("\"2024-10-01\""), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("10/01/24"), ymd(2024, 10, 1));
        assert_eq!(parse_processing_date("10-01-24"), ymd(2024, 10, 1));
    }

    #[test]
    fn two_digit_years_never_become_year_ten() {
        let d = parse_processing_date("10/01/24").expect("US short date parses");
        assert_eq!(crate::normalize::period::period_from_date(d), "2024-10");
        assert_eq!(parse_processing_date("0010-01-24"), None);
    }

    #[test]
    fn garbage_is_absent() {
        assert_eq!(parse_processing_date(""), None);
        assert_eq!(parse_processing_date("not a date"), None);
        assert_eq!(parse_processing_date("2024-13-01"), None);
    }
}
