use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{io::Read, path::Path};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// One raw extract: the header row as authored plus every data row as text.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Rows may be shorter or longer than `headers`.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Parse delimited text with a header row. Records that cannot be read are
/// skipped with a warning; bytes that are not UTF-8 are replaced.
pub fn read_raw_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()
        .context("reading header row")?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = String::from_utf8_lossy(h);
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.into_owned()
            }
        })
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        match result {
            Ok(record) => rows.push(
                record
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect(),
            ),
            Err(e) => warn!(record = idx, error = %e, "skipping unreadable record"),
        }
    }
    debug!(columns = headers.len(), rows = rows.len(), "raw extract parsed");
    Ok(RawTable { headers, rows })
}

/// Load a raw extract from disk. A missing file is a configuration error.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_raw_extract<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_raw_table(file).with_context(|| format!("parsing {}", path.display()))
}
