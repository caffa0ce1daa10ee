pub mod arrow;
pub mod read;
pub mod types;
pub mod write;

pub use self::arrow::{build_canonical_schema, check_canonical_schema, to_record_batch};
pub use read::{read_canonical, read_parquet};
pub use types::{
    CanonicalRecord, CanonicalTable, HourComponents, HourField, PassthroughColumn, ALL_PERIODS,
    UNKNOWN_NAME, UNKNOWN_STATE,
};
pub use write::write_parquet;

use anyhow::Result;
use std::path::Path;

/// Persist the canonical table, overwriting any previous run's output.
#[tracing::instrument(level = "info", skip(path, table), fields(path = %path.as_ref().display(), rows = table.len()))]
pub fn write_canonical<P: AsRef<Path>>(path: P, table: &CanonicalTable) -> Result<u64> {
    let batch = to_record_batch(table)?;
    write_parquet(path, batch.schema(), &[batch])
}
