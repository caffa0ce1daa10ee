use anyhow::Result;
use nhstaffing::{init_logging, normalize, PipelineConfig};

/// Normalizer stage only: master extract → canonical parquet.
fn main() -> Result<()> {
    init_logging();
    let cfg = PipelineConfig::load()?;
    let report = normalize::normalize_master(&cfg)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
