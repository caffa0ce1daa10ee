// src/marts/rules.rs

use crate::schema::types::{CanonicalRecord, PERIOD, PROVIDER_ID, PROVIDER_NAME, STATE};

pub const HOURS_BY_ORG: &str = "hours_by_org";
pub const HOURS_BY_PERIOD: &str = "hours_by_period";
pub const TOP_STAFFING: &str = "top_staffing";
pub const OVERTIME_PCT: &str = "overtime_pct";
pub const NURSE_PATIENT_RATIO: &str = "nurse_patient_ratio";

pub const AVG_TOTAL_HOURS: &str = "avg_total_hours";
pub const SUM_TOTAL_HOURS: &str = "sum_total_hours";
pub const OBSERVATIONS: &str = "observations";
pub const FACILITIES: &str = "facilities";
pub const NURSE_HOURS_PER_PATIENT: &str = "nurse_hours_per_patient";
pub const RANK: &str = "rank";

/// A canonical text column usable as a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    ProviderId,
    ProviderName,
    State,
    Period,
}

impl Dimension {
    pub fn column(self) -> &'static str {
        match self {
            Dimension::ProviderId => PROVIDER_ID,
            Dimension::ProviderName => PROVIDER_NAME,
            Dimension::State => STATE,
            Dimension::Period => PERIOD,
        }
    }

    pub fn value(self, r: &CanonicalRecord) -> &str {
        match self {
            Dimension::ProviderId => &r.provider_id,
            Dimension::ProviderName => &r.provider_name,
            Dimension::State => &r.state,
            Dimension::Period => &r.period,
        }
    }
}

/// A per-row numeric input to an aggregate. Absent values are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    TotalHours,
    NurseHours,
    OvertimePct,
}

impl Measure {
    pub fn value(self, r: &CanonicalRecord) -> Option<f64> {
        match self {
            Measure::TotalHours => r.total_hours,
            Measure::NurseHours => r.nurse_hours(),
            Measure::OvertimePct => r.overtime_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Mean of present values; null when the group has none.
    Mean(Measure),
    /// Sum of present values; null when the group has none.
    Sum(Measure),
    /// Number of present values.
    Count(Measure),
    CountDistinct(Dimension),
    /// First value seen in input order.
    First(Dimension),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggColumn {
    pub name: &'static str,
    pub agg: Aggregate,
}

pub const fn col(name: &'static str, agg: Aggregate) -> AggColumn {
    AggColumn { name, agg }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    /// Excludes `"ALL"`-period rows; used by time-series marts.
    RealPeriodOnly,
}

impl RowFilter {
    pub fn keep(self, r: &CanonicalRecord) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::RealPeriodOnly => r.has_real_period(),
        }
    }
}

/// Top-N within each partition, ordered descending by a numeric aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Must be a subset of the rule's `group_by`.
    pub partition_by: Vec<Dimension>,
    pub order_by: &'static str,
    pub limit: usize,
}

/// One summary table, described as data.
#[derive(Debug, Clone, PartialEq)]
pub struct MartRule {
    pub name: &'static str,
    pub group_by: Vec<Dimension>,
    pub filter: RowFilter,
    pub columns: Vec<AggColumn>,
    pub ranking: Option<Ranking>,
    /// Drop groups whose named aggregate came out null.
    pub require: Option<&'static str>,
}

/// The fixed mart set written on every run.
pub fn standard_marts(top_n: usize) -> Vec<MartRule> {
    use Aggregate::*;
    use Dimension::*;

    vec![
        MartRule {
            name: HOURS_BY_ORG,
            group_by: vec![ProviderId, State],
            filter: RowFilter::All,
            columns: vec![
                col(PROVIDER_NAME, First(ProviderName)),
                col(AVG_TOTAL_HOURS, Mean(Measure::TotalHours)),
                col(OBSERVATIONS, Count(Measure::TotalHours)),
            ],
            ranking: None,
            require: None,
        },
        MartRule {
            name: HOURS_BY_PERIOD,
            group_by: vec![State, Period],
            filter: RowFilter::RealPeriodOnly,
            columns: vec![
                col(AVG_TOTAL_HOURS, Mean(Measure::TotalHours)),
                col(SUM_TOTAL_HOURS, Sum(Measure::TotalHours)),
                col(OBSERVATIONS, Count(Measure::TotalHours)),
                col(FACILITIES, CountDistinct(ProviderId)),
            ],
            ranking: None,
            require: None,
        },
        MartRule {
            name: TOP_STAFFING,
            group_by: vec![ProviderId, State],
            filter: RowFilter::All,
            columns: vec![
                col(PROVIDER_NAME, First(ProviderName)),
                col(AVG_TOTAL_HOURS, Mean(Measure::TotalHours)),
            ],
            ranking: Some(Ranking {
                partition_by: vec![State],
                order_by: AVG_TOTAL_HOURS,
                limit: top_n,
            }),
            require: Some(AVG_TOTAL_HOURS),
        },
        MartRule {
            name: OVERTIME_PCT,
            group_by: vec![ProviderId, State, Period],
            filter: RowFilter::All,
            columns: vec![col(OVERTIME_PCT, Mean(Measure::OvertimePct))],
            ranking: None,
            require: Some(OVERTIME_PCT),
        },
        MartRule {
            name: NURSE_PATIENT_RATIO,
            group_by: vec![ProviderId, State, Period],
            filter: RowFilter::All,
            columns: vec![col(NURSE_HOURS_PER_PATIENT, Mean(Measure::NurseHours))],
            ranking: None,
            require: Some(NURSE_HOURS_PER_PATIENT),
        },
    ]
}
