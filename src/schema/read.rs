use anyhow::{Context, Result};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs::File, path::Path};
use tracing::debug;

use super::arrow::{check_canonical_schema, records_from_batch};
use super::types::CanonicalRecord;
use crate::error::PipelineError;

/// Read every batch of a Parquet file along with its schema.
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata of {}", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder.with_batch_size(8192).build()?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok((schema, batches))
}

/// Load the canonical dataset. A missing file or a schema that breaks the
/// canonical contract is a [`PipelineError`].
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn read_canonical<P: AsRef<Path>>(path: P) -> Result<Vec<CanonicalRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }

    let (schema, batches) = read_parquet(path).map_err(|e| PipelineError::IncompatibleSchema {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    check_canonical_schema(&schema).map_err(|reason| PipelineError::IncompatibleSchema {
        path: path.to_path_buf(),
        reason,
    })?;

    let mut records = Vec::new();
    for batch in &batches {
        records.extend(records_from_batch(batch).map_err(|e| {
            PipelineError::IncompatibleSchema {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?);
    }
    debug!(rows = records.len(), "canonical dataset loaded");
    Ok(records)
}
