use crate::schema::types::{HourComponents, HourField};

/// The three derived staffing metrics of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub reported: Option<f64>,
    pub adjusted: Option<f64>,
    pub total: Option<f64>,
}

impl Totals {
    /// `true` when `total` came from the reported components.
    pub fn uses_reported(&self) -> bool {
        self.reported.is_some()
    }
}

/// Sum of the present components; `None` when every one is absent.
fn sum_present(hours: &HourComponents, fields: &[HourField]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|f| hours.get(*f))
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Per-row total: reported figures whenever at least one reported component
/// is present, else the case-mix-adjusted figures.
///
/// Absent components add zero to a group that has at least one present
/// component. A group with no component at all is `None`, not `0.0`, so a
/// facility that reported nothing is not counted as zero staffing.
pub fn derive_totals(hours: &HourComponents) -> Totals {
    let reported = sum_present(hours, &HourField::REPORTED);
    let adjusted = sum_present(hours, &HourField::ADJUSTED);
    Totals {
        reported,
        adjusted,
        total: reported.or(adjusted),
    }
}
