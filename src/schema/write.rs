use anyhow::{Context, Result};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Write `batches` to `path` as Parquet, replacing whatever was there.
///
/// - writes to `.<file_name>.tmp` in the same directory
/// - renames over the destination once the footer is flushed
/// - with no batches the file still carries `schema` and zero rows
pub fn write_parquet<P: AsRef<Path>>(
    path: P,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<u64> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let tmp_path: PathBuf = dir.join(format!(".{}.tmp", file_name));

    let rows = match write_batches(&tmp_path, schema, batches) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path));
    }
    debug!(path = %path.display(), rows, "parquet written");
    Ok(rows)
}

fn write_batches(tmp_path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<u64> {
    let file =
        File::create(tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .with_context(|| format!("opening parquet writer for {}", tmp_path.display()))?;

    let mut rows = 0u64;
    for batch in batches {
        writer
            .write(batch)
            .with_context(|| format!("writing batch to {}", tmp_path.display()))?;
        rows += batch.num_rows() as u64;
    }
    writer
        .close()
        .with_context(|| format!("closing {}", tmp_path.display()))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::Int32Array,
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn failed_rename_leaves_no_temp_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("mart.parquet");
        // a non-empty directory squatting on the target makes the rename fail
        fs::create_dir_all(path.join("occupied"))?;

        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(vec![1, 2]))])?;

        assert!(write_parquet(&path, schema.clone(), &[batch.clone()]).is_err());
        assert!(!dir.path().join(".mart.parquet.tmp").exists());

        fs::remove_dir_all(&path)?;
        assert_eq!(write_parquet(&path, schema, &[batch])?, 2);
        assert!(path.is_file());
        assert!(!dir.path().join(".mart.parquet.tmp").exists());
        Ok(())
    }
}
