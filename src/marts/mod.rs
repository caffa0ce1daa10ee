// src/marts/mod.rs

pub mod aggregate;
pub mod rules;

pub use aggregate::{evaluate, SummaryRow, SummaryTable, Value};
pub use rules::{standard_marts, MartRule};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::schema::{self, types::CanonicalRecord};

/// Row count per mart written by [`build_marts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MartSummary {
    pub name: String,
    pub rows: usize,
}

/// Evaluate every rule over the canonical rows.
pub fn build_all(rules: &[MartRule], records: &[CanonicalRecord]) -> Result<Vec<SummaryTable>> {
    rules.iter().map(|r| evaluate(r, records)).collect()
}

/// Rebuild every mart from the persisted canonical dataset, replacing the
/// previous run's files. Empty marts are still written so readers can tell
/// "metric unavailable" from "pipeline never ran".
#[tracing::instrument(level = "info", skip(cfg), fields(canonical = %cfg.canonical_path().display()))]
pub fn build_marts(cfg: &PipelineConfig) -> Result<Vec<MartSummary>> {
    let records = schema::read_canonical(cfg.canonical_path())?;
    if records.is_empty() {
        warn!("canonical dataset has no rows; marts will be empty");
    }

    let tables = build_all(&standard_marts(cfg.top_n), &records)?;
    let mut written = Vec::with_capacity(tables.len());
    for table in &tables {
        let batch = table.to_record_batch()?;
        let path = cfg.mart_path(table.name());
        schema::write_parquet(&path, batch.schema(), &[batch])?;
        if table.rows.is_empty() {
            warn!(mart = table.name(), "mart is empty; metric unavailable downstream");
        } else {
            info!(mart = table.name(), rows = table.rows.len(), path = %path.display(), "mart written");
        }
        written.push(MartSummary {
            name: table.name().to_string(),
            rows: table.rows.len(),
        });
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::marts::rules::{HOURS_BY_ORG, NURSE_PATIENT_RATIO, OVERTIME_PCT, TOP_STAFFING};
    use crate::schema::types::{CanonicalTable, HourComponents};
    use tempfile::TempDir;

    fn cfg(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            raw_dir: dir.path().join("raw"),
            curated_dir: dir.path().join("curated"),
            marts_dir: dir.path().join("marts"),
            ..PipelineConfig::default()
        }
    }

    fn rec(id: &str, state: &str, total: f64) -> CanonicalRecord {
        CanonicalRecord {
            provider_id: id.into(),
            provider_name: "CARE".into(),
            state: state.into(),
            period: "2024-10".into(),
            processing_date: None,
            hours: HourComponents {
                aide: Some(total),
                ..Default::default()
            },
            overtime_pct: None,
            total_hours_reported: Some(total),
            total_hours_adjusted: None,
            total_hours: Some(total),
        }
    }

    #[test]
    fn all_marts_written_including_empty_placeholders() -> Result<()> {
        let dir = TempDir::new()?;
        let cfg = cfg(&dir);
        let table = CanonicalTable {
            records: vec![rec("000001", "AL", 3.0), rec("000002", "TX", 4.0)],
            passthrough: vec![],
        };
        schema::write_canonical(cfg.canonical_path(), &table)?;

        let summary = build_marts(&cfg)?;
        assert_eq!(summary.len(), 5);
        for m in &summary {
            assert!(cfg.mart_path(&m.name).exists(), "{} missing", m.name);
        }
        let rows = |name: &str| summary.iter().find(|m| m.name == name).map(|m| m.rows);
        assert_eq!(rows(HOURS_BY_ORG), Some(2));
        assert_eq!(rows(TOP_STAFFING), Some(2));
        assert_eq!(rows(OVERTIME_PCT), Some(0));
        assert_eq!(rows(NURSE_PATIENT_RATIO), Some(0));

        let (schema, batches) = schema::read_parquet(cfg.mart_path(OVERTIME_PCT))?;
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 0);
        Ok(())
    }

    #[test]
    fn missing_canonical_aborts_mart_build() {
        let dir = TempDir::new().unwrap();
        let err = build_marts(&cfg(&dir)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput { .. })
        ));
        assert!(!dir.path().join("marts").exists());
    }
}
