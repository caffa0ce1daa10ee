// src/schema/types.rs

use chrono::NaiveDate;
use serde::Serialize;

pub const PROVIDER_ID: &str = "provider_id";
pub const PROVIDER_NAME: &str = "provider_name";
pub const STATE: &str = "state";
pub const PERIOD: &str = "period";
pub const PROCESSING_DATE: &str = "processing_date";
pub const OVERTIME_PCT: &str = "overtime_pct";
pub const TOTAL_HOURS_REPORTED: &str = "total_hours_reported";
pub const TOTAL_HOURS_ADJUSTED: &str = "total_hours_adjusted";
pub const TOTAL_HOURS: &str = "total_hours";

/// Sentinel for a missing facility name.
pub const UNKNOWN_NAME: &str = "UNKNOWN";
/// Sentinel for a missing or malformed state code.
pub const UNKNOWN_STATE: &str = "UNK";
/// Sentinel period: "could not be determined", never a real month.
pub const ALL_PERIODS: &str = "ALL";

pub const PROVIDER_ID_WIDTH: usize = 6;

/// One hours-per-resident-day component as it appears in the canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HourField {
    Rn,
    Lpn,
    Aide,
    RnAdj,
    LpnAdj,
    AideAdj,
}

impl HourField {
    pub const ALL: [HourField; 6] = [
        HourField::Rn,
        HourField::Lpn,
        HourField::Aide,
        HourField::RnAdj,
        HourField::LpnAdj,
        HourField::AideAdj,
    ];
    pub const REPORTED: [HourField; 3] = [HourField::Rn, HourField::Lpn, HourField::Aide];
    pub const ADJUSTED: [HourField; 3] = [HourField::RnAdj, HourField::LpnAdj, HourField::AideAdj];

    pub fn column(self) -> &'static str {
        match self {
            HourField::Rn => "rn_hprd",
            HourField::Lpn => "lpn_hprd",
            HourField::Aide => "aide_hprd",
            HourField::RnAdj => "rn_hprd_adj",
            HourField::LpnAdj => "lpn_hprd_adj",
            HourField::AideAdj => "aide_hprd_adj",
        }
    }

    pub fn is_reported(self) -> bool {
        matches!(self, HourField::Rn | HourField::Lpn | HourField::Aide)
    }
}

/// Per-row HPRD components. `None` means the source had no usable value,
/// which is not the same as a reading of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourComponents {
    pub rn: Option<f64>,
    pub lpn: Option<f64>,
    pub aide: Option<f64>,
    pub rn_adj: Option<f64>,
    pub lpn_adj: Option<f64>,
    pub aide_adj: Option<f64>,
}

impl HourComponents {
    pub fn get(&self, field: HourField) -> Option<f64> {
        match field {
            HourField::Rn => self.rn,
            HourField::Lpn => self.lpn,
            HourField::Aide => self.aide,
            HourField::RnAdj => self.rn_adj,
            HourField::LpnAdj => self.lpn_adj,
            HourField::AideAdj => self.aide_adj,
        }
    }

    pub fn set(&mut self, field: HourField, value: Option<f64>) {
        let slot = match field {
            HourField::Rn => &mut self.rn,
            HourField::Lpn => &mut self.lpn,
            HourField::Aide => &mut self.aide,
            HourField::RnAdj => &mut self.rn_adj,
            HourField::LpnAdj => &mut self.lpn_adj,
            HourField::AideAdj => &mut self.aide_adj,
        };
        *slot = value;
    }
}

/// One facility-period observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub provider_id: String,
    pub provider_name: String,
    pub state: String,
    pub period: String,
    pub processing_date: Option<NaiveDate>,
    pub hours: HourComponents,
    pub overtime_pct: Option<f64>,
    pub total_hours_reported: Option<f64>,
    pub total_hours_adjusted: Option<f64>,
    pub total_hours: Option<f64>,
}

impl CanonicalRecord {
    /// `false` for the `"ALL"` sentinel; time-series views skip those rows.
    pub fn has_real_period(&self) -> bool {
        self.period != ALL_PERIODS
    }

    /// Reported licensed-nurse hours (RN + LPN), absent when neither is present.
    pub fn nurse_hours(&self) -> Option<f64> {
        match (self.hours.rn, self.hours.lpn) {
            (None, None) => None,
            (rn, lpn) => Some(rn.unwrap_or(0.0) + lpn.unwrap_or(0.0)),
        }
    }
}

/// A source column with no canonical alias, carried through as text.
#[derive(Debug, Clone, PartialEq)]
pub struct PassthroughColumn {
    pub name: String,
    pub values: Vec<Option<String>>,
}

/// The Normalizer's output: canonical rows plus unrecognised columns,
/// row-aligned with `records`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    pub records: Vec<CanonicalRecord>,
    pub passthrough: Vec<PassthroughColumn>,
}

impl CanonicalTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
