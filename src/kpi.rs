// src/kpi.rs
//
// Figures the dashboard shows, derived from the canonical dataset and the
// marts. Rendering lives elsewhere; this module only computes.

use anyhow::{anyhow, Result};
use arrow::{
    array::{Array, BooleanArray, Float64Array, StringArray},
    compute::filter_record_batch,
    record_batch::RecordBatch,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::marts::rules::{
    AVG_TOTAL_HOURS, NURSE_HOURS_PER_PATIENT, NURSE_PATIENT_RATIO, OVERTIME_PCT, TOP_STAFFING,
};
use crate::schema::{
    self,
    types::{CanonicalRecord, PERIOD, PROVIDER_ID, PROVIDER_NAME, STATE},
};

/// A KPI value, or a marker that the inputs could not support it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Value(f64),
    Unavailable,
}

impl Metric {
    /// Mean of the finite values; `Unavailable` when there are none.
    pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let (sum, n) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0u64), |(s, n), v| (s + v, n + 1));
        if n == 0 {
            Metric::Unavailable
        } else {
            Metric::Value(sum / n as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateFilter {
    All,
    State(String),
}

impl StateFilter {
    /// `None`, blank or `"ALL"` select every state.
    pub fn parse(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            None | Some("") => StateFilter::All,
            Some(s) if s.eq_ignore_ascii_case("all") => StateFilter::All,
            Some(s) => StateFilter::State(s.to_ascii_uppercase()),
        }
    }

    pub fn matches(&self, state: &str) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::State(s) => s == state,
        }
    }
}

/// A mart as read from disk: `None` when the file is absent or unreadable.
pub type MartBatches = Option<Vec<RecordBatch>>;

/// Everything the dashboard reads. Only the canonical dataset is required.
#[derive(Debug, Default)]
pub struct DashboardData {
    pub canonical: Vec<CanonicalRecord>,
    pub top_staffing: MartBatches,
    pub overtime: MartBatches,
    pub nurse_ratio: MartBatches,
}

fn load_mart(path: &Path) -> MartBatches {
    if !path.exists() {
        debug!(path = %path.display(), "mart absent");
        return None;
    }
    match schema::read_parquet(path) {
        Ok((_, batches)) => Some(batches),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable mart treated as unavailable");
            None
        }
    }
}

impl DashboardData {
    pub fn load(cfg: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            canonical: schema::read_canonical(cfg.canonical_path())?,
            top_staffing: load_mart(&cfg.mart_path(TOP_STAFFING)),
            overtime: load_mart(&cfg.mart_path(OVERTIME_PCT)),
            nurse_ratio: load_mart(&cfg.mart_path(NURSE_PATIENT_RATIO)),
        })
    }

    /// Narrow everything to one reporting period. `top_staffing` has no
    /// period key, so it is dropped and the leaderboard is recomputed from
    /// the narrowed canonical rows.
    pub fn restrict_period(&mut self, period: &str) {
        self.canonical.retain(|r| r.period == period);
        self.top_staffing = None;
        for mart in [&mut self.overtime, &mut self.nurse_ratio] {
            if let Some(batches) = mart.take() {
                *mart = match batches_for_period(&batches, period) {
                    Ok(kept) => Some(kept),
                    Err(e) => {
                        warn!(error = %e, "mart cannot be filtered by period");
                        None
                    }
                };
            }
        }
    }

    fn view<'a>(&'a self, filter: &'a StateFilter) -> impl Iterator<Item = &'a CanonicalRecord> {
        self.canonical.iter().filter(move |r| filter.matches(&r.state))
    }

    pub fn kpis(&self, filter: &StateFilter) -> Kpis {
        let facilities: BTreeSet<&str> = self.view(filter).map(|r| r.provider_id.as_str()).collect();
        let states: BTreeSet<&str> = self.view(filter).map(|r| r.state.as_str()).collect();
        Kpis {
            facilities: facilities.len(),
            avg_staffing: Metric::mean(self.view(filter).filter_map(|r| r.total_hours)),
            avg_nurse_hours: mart_mean(self.nurse_ratio.as_deref(), NURSE_HOURS_PER_PATIENT, filter),
            avg_overtime_pct: mart_mean(self.overtime.as_deref(), OVERTIME_PCT, filter),
            states_in_view: states.len(),
        }
    }

    /// Mean `total_hours` per real period, oldest first. `"ALL"` rows never
    /// appear; an empty result means there is no time axis to draw.
    pub fn trend(&self, filter: &StateFilter) -> Vec<TrendPoint> {
        let mut by_period: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
        for r in self.view(filter).filter(|r| r.has_real_period()) {
            if let Some(v) = r.total_hours {
                let e = by_period.entry(r.period.as_str()).or_insert((0.0, 0));
                e.0 += v;
                e.1 += 1;
            }
        }
        by_period
            .into_iter()
            .map(|(period, (sum, n))| TrendPoint {
                period: period.to_string(),
                avg_total_hours: sum / n as f64,
            })
            .collect()
    }

    /// Best-staffed facilities. Uses the `top_staffing` mart when it has
    /// rows, else averages the canonical dataset directly.
    pub fn leaderboard(&self, filter: &StateFilter, n: usize) -> Vec<LeaderboardEntry> {
        let from_mart = self
            .top_staffing
            .as_deref()
            .and_then(|b| match leaderboard_from_mart(b, filter) {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!(error = %e, "top_staffing mart unusable; falling back to canonical");
                    None
                }
            })
            .filter(|rows| !rows.is_empty());

        let mut rows = match from_mart {
            Some(rows) => rows,
            None => self.leaderboard_from_canonical(filter),
        };
        rows.sort_by(|a, b| {
            b.avg_total_hours
                .partial_cmp(&a.avg_total_hours)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });
        rows.truncate(n);
        rows
    }

    fn leaderboard_from_canonical(&self, filter: &StateFilter) -> Vec<LeaderboardEntry> {
        let mut groups: BTreeMap<(&str, &str), (&str, f64, u64)> = BTreeMap::new();
        for r in self.view(filter) {
            if let Some(v) = r.total_hours {
                let e = groups
                    .entry((r.provider_id.as_str(), r.state.as_str()))
                    .or_insert((r.provider_name.as_str(), 0.0, 0));
                e.1 += v;
                e.2 += 1;
            }
        }
        groups
            .into_iter()
            .map(|((id, state), (name, sum, n))| LeaderboardEntry {
                provider_id: id.to_string(),
                provider_name: name.to_string(),
                state: state.to_string(),
                avg_total_hours: sum / n as f64,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub facilities: usize,
    pub avg_staffing: Metric,
    pub avg_nurse_hours: Metric,
    pub avg_overtime_pct: Metric,
    pub states_in_view: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period: String,
    pub avg_total_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub provider_id: String,
    pub provider_name: String,
    pub state: String,
    pub avg_total_hours: f64,
}

fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("mart lacks text column `{}`", name))
}

fn f64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| anyhow!("mart lacks numeric column `{}`", name))
}

fn batches_for_period(batches: &[RecordBatch], period: &str) -> Result<Vec<RecordBatch>> {
    batches
        .iter()
        .map(|batch| {
            let periods = str_col(batch, PERIOD)?;
            let keep: BooleanArray = periods.iter().map(|p| Some(p == Some(period))).collect();
            Ok(filter_record_batch(batch, &keep)?)
        })
        .collect()
}

/// Finite values of `column` for rows in the selected state.
fn mart_values(batches: &[RecordBatch], column: &str, filter: &StateFilter) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for batch in batches {
        let states = str_col(batch, STATE)?;
        let values = f64_col(batch, column)?;
        for i in 0..batch.num_rows() {
            if values.is_null(i) || states.is_null(i) || !filter.matches(states.value(i)) {
                continue;
            }
            out.push(values.value(i));
        }
    }
    Ok(out)
}

/// An absent, empty or malformed mart is `Unavailable`, never zero.
fn mart_mean(batches: Option<&[RecordBatch]>, column: &str, filter: &StateFilter) -> Metric {
    let Some(batches) = batches else {
        return Metric::Unavailable;
    };
    match mart_values(batches, column, filter) {
        Ok(values) => Metric::mean(values),
        Err(e) => {
            warn!(column, error = %e, "mart unusable");
            Metric::Unavailable
        }
    }
}

fn leaderboard_from_mart(batches: &[RecordBatch], filter: &StateFilter) -> Result<Vec<LeaderboardEntry>> {
    let mut out = Vec::new();
    for batch in batches {
        let ids = str_col(batch, PROVIDER_ID)?;
        let names = str_col(batch, PROVIDER_NAME)?;
        let states = str_col(batch, STATE)?;
        let avg = f64_col(batch, AVG_TOTAL_HOURS)?;
        for i in 0..batch.num_rows() {
            if avg.is_null(i) || !filter.matches(states.value(i)) {
                continue;
            }
            out.push(LeaderboardEntry {
                provider_id: ids.value(i).to_string(),
                provider_name: if names.is_null(i) {
                    String::new()
                } else {
                    names.value(i).to_string()
                },
                state: states.value(i).to_string(),
                avg_total_hours: avg.value(i),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marts::{build_marts, rules::HOURS_BY_ORG};
    use crate::schema::types::{CanonicalTable, HourComponents, ALL_PERIODS};
    use tempfile::TempDir;

    fn rec(id: &str, state: &str, period: &str, total: Option<f64>) -> CanonicalRecord {
        CanonicalRecord {
            provider_id: id.into(),
            provider_name: format!("HOME {id}"),
            state: state.into(),
            period: period.into(),
            processing_date: None,
            hours: HourComponents::default(),
            overtime_pct: None,
            total_hours_reported: None,
            total_hours_adjusted: total,
            total_hours: total,
        }
    }

    fn data() -> DashboardData {
        DashboardData {
            canonical: vec![
                rec("000001", "AL", "2024-09", Some(2.0)),
                rec("000001", "AL", "2024-10", Some(4.0)),
                rec("000002", "AL", ALL_PERIODS, Some(6.0)),
                rec("000003", "TX", "2024-10", Some(5.0)),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn canonical_alone_supports_every_kpi_shape() {
        let d = data();
        let k = d.kpis(&StateFilter::All);
        assert_eq!(k.facilities, 3);
        assert_eq!(k.states_in_view, 2);
        assert_eq!(k.avg_staffing, Metric::Value(17.0 / 4.0));
        assert_eq!(k.avg_nurse_hours, Metric::Unavailable);
        assert_eq!(k.avg_overtime_pct, Metric::Unavailable);

        let al = d.kpis(&StateFilter::parse(Some("al")));
        assert_eq!(al.facilities, 2);
        assert_eq!(al.avg_staffing, Metric::Value(4.0));
    }

    #[test]
    fn trend_skips_undetermined_periods() {
        let d = data();
        let t = d.trend(&StateFilter::All);
        assert_eq!(
            t,
            vec![
                TrendPoint { period: "2024-09".into(), avg_total_hours: 2.0 },
                TrendPoint { period: "2024-10".into(), avg_total_hours: 4.5 },
            ]
        );
        let only_all = DashboardData {
            canonical: vec![rec("000009", "OH", ALL_PERIODS, Some(1.0))],
            ..Default::default()
        };
        assert!(only_all.trend(&StateFilter::All).is_empty());
        assert_eq!(only_all.kpis(&StateFilter::All).avg_staffing, Metric::Value(1.0));
    }

    #[test]
    fn leaderboard_falls_back_to_canonical() {
        let d = data();
        let top = d.leaderboard(&StateFilter::State("AL".into()), 10);
        let ids: Vec<_> = top.iter().map(|e| e.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["000002", "000001"]);
        assert_eq!(top[1].avg_total_hours, 3.0);
    }

    #[test]
    fn empty_placeholder_marts_read_as_unavailable() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = PipelineConfig {
            curated_dir: dir.path().join("curated"),
            marts_dir: dir.path().join("marts"),
            ..PipelineConfig::default()
        };
        let table = CanonicalTable {
            records: data().canonical,
            passthrough: vec![],
        };
        schema::write_canonical(cfg.canonical_path(), &table)?;
        build_marts(&cfg)?;

        let d = DashboardData::load(&cfg)?;
        assert!(d.overtime.is_some(), "placeholder mart is written, just empty");
        let k = d.kpis(&StateFilter::All);
        assert_eq!(k.avg_overtime_pct, Metric::Unavailable);
        assert_eq!(k.avg_nurse_hours, Metric::Unavailable);

        let top = d.leaderboard(&StateFilter::All, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].provider_id, "000002");

        // A mart file without the expected columns degrades instead of crashing.
        std::fs::copy(cfg.mart_path(HOURS_BY_ORG), cfg.mart_path(OVERTIME_PCT))?;
        let d = DashboardData::load(&cfg)?;
        assert_eq!(d.kpis(&StateFilter::All).avg_overtime_pct, Metric::Unavailable);
        Ok(())
    }

    #[test]
    fn period_restriction_narrows_canonical_and_marts() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = PipelineConfig {
            curated_dir: dir.path().join("curated"),
            marts_dir: dir.path().join("marts"),
            ..PipelineConfig::default()
        };
        let mut records = data().canonical;
        records[0].overtime_pct = Some(10.0);
        records[1].overtime_pct = Some(30.0);
        let table = CanonicalTable { records, passthrough: vec![] };
        schema::write_canonical(cfg.canonical_path(), &table)?;
        build_marts(&cfg)?;

        let mut d = DashboardData::load(&cfg)?;
        assert_eq!(d.kpis(&StateFilter::All).avg_overtime_pct, Metric::Value(20.0));

        d.restrict_period("2024-10");
        let k = d.kpis(&StateFilter::All);
        assert_eq!(k.facilities, 2);
        assert_eq!(k.avg_overtime_pct, Metric::Value(30.0));
        assert!(d.top_staffing.is_none());
        let ids: Vec<_> = d
            .leaderboard(&StateFilter::All, 5)
            .into_iter()
            .map(|e| e.provider_id)
            .collect();
        assert_eq!(ids, vec!["000003", "000001"]);
        Ok(())
    }

    #[test]
    fn leaderboard_reads_top_staffing_mart_per_state() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = PipelineConfig {
            curated_dir: dir.path().join("curated"),
            marts_dir: dir.path().join("marts"),
            ..PipelineConfig::default()
        };
        let table = CanonicalTable {
            records: data().canonical,
            passthrough: vec![],
        };
        schema::write_canonical(cfg.canonical_path(), &table)?;
        build_marts(&cfg)?;

        let mut d = DashboardData::load(&cfg)?;
        // Without canonical rows any result must have come from the mart.
        d.canonical.clear();
        assert!(d.top_staffing.is_some());

        let al = d.leaderboard(&StateFilter::State("AL".into()), 10);
        let ids: Vec<_> = al.iter().map(|e| e.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["000002", "000001"]);
        assert!(al.iter().all(|e| e.state == "AL"));
        assert_eq!(al[1].avg_total_hours, 3.0);
        assert_eq!(al[0].provider_name, "HOME 000002");

        let tx = d.leaderboard(&StateFilter::parse(Some("tx")), 10);
        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].provider_id, "000003");

        assert!(d.leaderboard(&StateFilter::State("OH".into()), 10).is_empty());
        Ok(())
    }

    #[test]
    fn mean_ignores_non_finite_values() {
        assert_eq!(Metric::mean(vec![1.0, f64::NAN, 3.0]), Metric::Value(2.0));
        assert_eq!(Metric::mean(Vec::<f64>::new()), Metric::Unavailable);
        assert_eq!(Metric::Unavailable.value(), None);
    }
}
