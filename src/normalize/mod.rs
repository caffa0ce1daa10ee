// src/normalize/mod.rs

pub mod aliases;
pub mod convert;
pub mod date_parser;
pub mod period;
pub mod raw_table;
pub mod utils;

pub use raw_table::{load_raw_extract, read_raw_table, RawTable};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::schema::{
    self,
    types::{CanonicalRecord, CanonicalTable, HourComponents, HourField, PassthroughColumn, ALL_PERIODS, PROVIDER_ID_WIDTH},
};
use aliases::{resolve_headers, ColumnMap, Target};

/// Where the table's `period` values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeriodSource {
    /// Parsed from the processing-date column (rows that failed to parse use
    /// the filename period).
    ProcessingDate,
    Filename,
    /// The operator-configured single-snapshot period.
    Fallback,
    /// No period could be determined; every row carries `"ALL"`.
    Undetermined,
}

/// What the Normalizer had to do to produce its output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub source: String,
    pub rows: usize,
    /// `true` when the extract had no identifier column at all.
    pub provider_id_synthesized: bool,
    /// Rows given a positional id because their identifier cell was blank.
    pub blank_provider_ids: usize,
    pub oversized_provider_ids: usize,
    pub period_source: PeriodSource,
    pub unparsed_dates: usize,
    pub rows_using_reported: usize,
    pub rows_using_adjusted: usize,
    pub rows_without_hours: usize,
    pub passthrough_columns: usize,
}

/// Per-run knobs for [`normalize`].
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// `YYYY-MM` to assign when no row gets a real period.
    pub fallback_period: Option<String>,
}

impl From<&PipelineConfig> for NormalizeOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            fallback_period: cfg.fallback_period.clone(),
        }
    }
}

/// Decide every row's period: processing date → filename → configured
/// fallback. Returns the per-row periods, the parsed dates and the source.
fn derive_periods(
    raw: &RawTable,
    cols: &ColumnMap,
    file_name: &str,
    opts: &NormalizeOptions,
) -> (Vec<String>, Vec<Option<NaiveDate>>, PeriodSource, usize) {
    let n = raw.num_rows();
    let mut dates = vec![None; n];
    let mut unparsed = 0;

    if let Some(idx) = cols.index_of(Target::ProcessingDate) {
        for (row, slot) in dates.iter_mut().enumerate() {
            *slot = raw.cell(row, idx).and_then(date_parser::parse_processing_date);
            if slot.is_none() {
                unparsed += 1;
            }
        }
        if n > 0 && unparsed == n {
            warn!(file = file_name, "processing date column present but no row parsed; using filename");
        }
    }

    let any_dated = dates.iter().any(Option::is_some);
    let from_file = period::period_from_filename(file_name);
    let mut source = if any_dated {
        PeriodSource::ProcessingDate
    } else {
        PeriodSource::Filename
    };
    let mut periods: Vec<String> = dates
        .iter()
        .map(|d| match d {
            Some(d) => period::period_from_date(*d),
            None => from_file.clone(),
        })
        .collect();

    if periods.iter().all(|p| p == ALL_PERIODS) {
        match &opts.fallback_period {
            Some(fallback) => {
                warn!(file = file_name, period = %fallback, "no period derivable; applying configured fallback");
                periods.iter_mut().for_each(|p| *p = fallback.clone());
                source = PeriodSource::Fallback;
            }
            None => {
                if n > 0 {
                    warn!(file = file_name, "no period derivable and no fallback configured; rows carry \"ALL\"");
                }
                source = PeriodSource::Undetermined;
            }
        }
    }
    (periods, dates, source, unparsed)
}

/// Map one raw extract onto the canonical schema.
///
/// Never fails on malformed cells: ids, names and states fall back to
/// sentinels, bad numbers and dates become absent.
#[tracing::instrument(level = "info", skip(raw, opts), fields(rows = raw.num_rows()))]
pub fn normalize(
    raw: &RawTable,
    file_name: &str,
    opts: &NormalizeOptions,
) -> Result<(CanonicalTable, NormalizeReport)> {
    let cols = resolve_headers(&raw.headers);
    let n = raw.num_rows();

    let id_col = cols.index_of(Target::ProviderId);
    let name_col = cols.index_of(Target::ProviderName);
    let state_col = cols.index_of(Target::State);
    let overtime_col = cols.index_of(Target::OvertimePct);
    let hour_cols: Vec<(HourField, usize)> = HourField::ALL
        .iter()
        .filter_map(|hf| cols.index_of(Target::Hours(*hf)).map(|i| (*hf, i)))
        .collect();

    if id_col.is_none() && n > 0 {
        warn!(file = file_name, "no provider identifier column; synthesizing positional ids");
    }

    let (periods, dates, period_source, unparsed_dates) = derive_periods(raw, &cols, file_name, opts);

    let mut report = NormalizeReport {
        source: file_name.to_string(),
        rows: n,
        provider_id_synthesized: id_col.is_none(),
        blank_provider_ids: 0,
        oversized_provider_ids: 0,
        period_source,
        unparsed_dates,
        rows_using_reported: 0,
        rows_using_adjusted: 0,
        rows_without_hours: 0,
        passthrough_columns: cols.passthrough.len(),
    };

    let mut records = Vec::with_capacity(n);
    for (row, (period, processing_date)) in periods.into_iter().zip(dates).enumerate() {
        let provider_id = match id_col.and_then(|c| utils::non_empty(raw.cell(row, c))) {
            Some(id) => utils::normalize_provider_id(id),
            None => {
                if id_col.is_some() {
                    report.blank_provider_ids += 1;
                }
                utils::positional_id(row)
            }
        };
        if provider_id.len() > PROVIDER_ID_WIDTH {
            report.oversized_provider_ids += 1;
        }

        let mut hours = HourComponents::default();
        for (hf, c) in &hour_cols {
            hours.set(*hf, utils::parse_hours(raw.cell(row, *c)));
        }
        let totals = convert::derive_totals(&hours);
        match (totals.uses_reported(), totals.total) {
            (true, _) => report.rows_using_reported += 1,
            (false, Some(_)) => report.rows_using_adjusted += 1,
            (false, None) => report.rows_without_hours += 1,
        }

        records.push(CanonicalRecord {
            provider_id,
            provider_name: utils::normalize_provider_name(name_col.and_then(|c| raw.cell(row, c))),
            state: utils::normalize_state(state_col.and_then(|c| raw.cell(row, c))),
            period,
            processing_date,
            hours,
            overtime_pct: overtime_col.and_then(|c| utils::parse_hours(raw.cell(row, c))),
            total_hours_reported: totals.reported,
            total_hours_adjusted: totals.adjusted,
            total_hours: totals.total,
        });
    }

    if report.blank_provider_ids > 0 {
        warn!(count = report.blank_provider_ids, "blank provider ids replaced with positional ids");
    }
    if report.oversized_provider_ids > 0 {
        warn!(count = report.oversized_provider_ids, "provider ids wider than six characters kept verbatim");
    }

    let passthrough = cols
        .passthrough
        .iter()
        .map(|(name, idx)| PassthroughColumn {
            name: name.clone(),
            values: (0..n)
                .map(|row| raw.cell(row, *idx).map(str::to_string))
                .collect(),
        })
        .collect();

    Ok((CanonicalTable { records, passthrough }, report))
}

/// Load the configured master extract, normalize it and persist the
/// canonical dataset.
#[tracing::instrument(level = "info", skip(cfg), fields(master = %cfg.master_name))]
pub fn normalize_master(cfg: &PipelineConfig) -> Result<NormalizeReport> {
    let master = cfg.master_path();
    let raw = load_raw_extract(&master)?;
    let file_name = master
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&cfg.master_name)
        .to_string();

    let (table, report) = normalize(&raw, &file_name, &NormalizeOptions::from(cfg))?;
    let out = cfg.canonical_path();
    let written = schema::write_canonical(&out, &table)?;
    info!(
        path = %out.display(),
        rows = written,
        period_source = ?report.period_source,
        reported = report.rows_using_reported,
        adjusted = report.rows_using_adjusted,
        "canonical dataset written"
    );
    Ok(report)
}

/// Normalize an extract already on disk under an arbitrary name.
pub fn normalize_file<P: AsRef<Path>>(
    path: P,
    opts: &NormalizeOptions,
) -> Result<(CanonicalTable, NormalizeReport)> {
    let path = path.as_ref();
    let raw = load_raw_extract(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    normalize(&raw, &file_name, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,nhstaffing::normalize=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn raw(text: &str) -> RawTable {
        read_raw_table(Cursor::new(text.to_string())).expect("fixture parses")
    }

    fn run(text: &str, file: &str) -> (CanonicalTable, NormalizeReport) {
        init_test_logging();
        normalize(&raw(text), file, &NormalizeOptions::default()).expect("normalize never fails on data")
    }

    const CMS_EXTRACT: &str = r#"Federal Provider Number,Provider Name,Provider State,Reported RN Staffing Hours per Resident per Day,Reported LPN Staffing Hours per Resident per Day,Reported Nurse Aide Staffing Hours per Resident per Day,Case-Mix RN Staffing Hours per Resident per Day,Case-Mix LPN Staffing Hours per Resident per Day,Case-Mix Nurse Aide Staffing Hours per Resident per Day,Provider City
15009.0,  BURNS NURSING HOME, al ,0.5,0.75,2.25,0.6,0.8,2.4,RUSSELLVILLE
15010,COOSA VALLEY,AL,,,,0.4,0.9,2.0,SYLACAUGA
015012,GROVE HILL,al,n/a,,,,0.7,,GROVE HILL
,NO ID HOME,TX,,,,,,,
"#;

    #[test]
    fn cms_extract_is_canonicalized() {
        let (table, report) = run(CMS_EXTRACT, "NH_ProviderInfo_Oct2024.csv");
        let r = &table.records;
        assert_eq!(r.len(), 4);

        assert_eq!(r[0].provider_id, "015009");
        assert_eq!(r[0].provider_name, "BURNS NURSING HOME");
        assert_eq!(r[0].state, "AL");
        assert_eq!(r[0].period, "2024-10");
        assert_eq!(r[0].total_hours, r[0].total_hours_reported);
        assert_eq!(r[0].total_hours, Some(3.5));
        assert_eq!(r[0].total_hours_adjusted, Some(0.6 + 0.8 + 2.4));

        assert_eq!(r[1].provider_id, "015010");
        assert_eq!(r[1].total_hours_reported, None);
        assert_eq!(r[1].total_hours, Some(0.4 + 0.9 + 2.0));

        // "n/a" is absent, not zero, so the row falls back to adjusted
        assert_eq!(r[2].hours.rn, None);
        assert_eq!(r[2].total_hours, Some(0.7));

        assert_eq!(r[3].provider_id, "000003");
        assert_eq!(r[3].total_hours, None);

        assert!(r.iter().all(|rec| rec.provider_id.len() == 6));
        assert_eq!(report.period_source, PeriodSource::Filename);
        assert_eq!(report.blank_provider_ids, 1);
        assert_eq!(report.rows_using_reported, 1);
        assert_eq!(report.rows_using_adjusted, 2);
        assert_eq!(report.rows_without_hours, 1);

        assert_eq!(table.passthrough.len(), 1);
        assert_eq!(table.passthrough[0].name, "provider city");
        assert_eq!(table.passthrough[0].values[1].as_deref(), Some("SYLACAUGA"));
    }

    #[test]
    fn missing_key_columns_get_sentinels() {
        let (table, report) = run("Reported RN Staffing Hours per Resident per Day\n1.0\n2.0\n", "x.csv");
        assert!(report.provider_id_synthesized);
        assert_eq!(table.records[0].provider_id, "000000");
        assert_eq!(table.records[1].provider_id, "000001");
        assert_eq!(table.records[1].provider_name, "UNKNOWN");
        assert_eq!(table.records[1].state, "UNK");
        assert_eq!(table.records[1].period, "ALL");
        assert_eq!(report.period_source, PeriodSource::Undetermined);
    }

    #[test]
    fn processing_date_beats_filename() {
        let text = "CCN,Processing Date\n1,2024-08-01\n2,08/15/2024\n3,garbage\n";
        let (table, report) = run(text, "NH_ProviderInfo_Oct2024.csv");
        let periods: Vec<_> = table.records.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-08", "2024-08", "2024-10"]);
        assert_eq!(report.period_source, PeriodSource::ProcessingDate);
        assert_eq!(report.unparsed_dates, 1);
        assert_eq!(table.records[0].processing_date, NaiveDate::from_ymd_opt(2024, 8, 1));
    }

    #[test]
    fn unparseable_date_column_falls_back_to_filename() {
        let text = "CCN,Processing Date\n1,soon\n2,\n";
        let (table, report) = run(text, "data_2024_10.csv");
        assert!(table.records.iter().all(|r| r.period == "2024-10"));
        assert_eq!(report.period_source, PeriodSource::Filename);
    }

    #[test]
    fn configured_fallback_rescues_single_snapshot() -> Result<()> {
        init_test_logging();
        let opts = NormalizeOptions {
            fallback_period: Some("2024-10".into()),
        };
        let (table, report) = normalize(&raw("CCN\n1\n2\n"), "NH_ProviderInfo.csv", &opts)?;
        assert!(table.records.iter().all(|r| r.period == "2024-10"));
        assert_eq!(report.period_source, PeriodSource::Fallback);

        // A real period anywhere means the fallback stays unused.
        let (table, _) = normalize(&raw("CCN\n1\n"), "export_20240301.csv", &opts)?;
        assert_eq!(table.records[0].period, "2024-03");
        Ok(())
    }

    #[test]
    fn canonical_headers_are_idempotent() {
        let (first, _) = run(CMS_EXTRACT, "NH_ProviderInfo_Oct2024.csv");
        let mut text = String::from(
            "provider_id,provider_name,state,rn_hprd,lpn_hprd,aide_hprd,rn_hprd_adj,lpn_hprd_adj,aide_hprd_adj\n",
        );
        for r in &first.records {
            let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
            let h = &r.hours;
            text.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                r.provider_id,
                r.provider_name,
                r.state,
                cell(h.rn),
                cell(h.lpn),
                cell(h.aide),
                cell(h.rn_adj),
                cell(h.lpn_adj),
                cell(h.aide_adj)
            ));
        }
        let (second, _) = run(&text, "NH_ProviderInfo_Oct2024.csv");
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn normalize_master_writes_canonical_parquet() -> Result<()> {
        init_test_logging();
        let dir = TempDir::new()?;
        let cfg = PipelineConfig {
            raw_dir: dir.path().join("raw"),
            curated_dir: dir.path().join("curated"),
            marts_dir: dir.path().join("marts"),
            ..PipelineConfig::default()
        };
        std::fs::create_dir_all(&cfg.raw_dir)?;
        std::fs::write(cfg.master_path(), CMS_EXTRACT)?;

        let report = normalize_master(&cfg)?;
        assert_eq!(report.rows, 4);
        let back = schema::read_canonical(cfg.canonical_path())?;
        assert_eq!(back.len(), 4);
        assert_eq!(back[0].provider_id, "015009");
        Ok(())
    }

    #[test]
    fn normalize_master_without_master_file_fails_fast() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            raw_dir: dir.path().to_path_buf(),
            curated_dir: dir.path().join("curated"),
            ..PipelineConfig::default()
        };
        let err = normalize_master(&cfg).unwrap_err();
        assert!(err.to_string().contains("NH_ProviderInfo_Oct2024.csv"), "{err}");
        assert!(!cfg.canonical_path().exists());
    }
}
