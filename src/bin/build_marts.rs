use anyhow::Result;
use nhstaffing::{init_logging, marts, PipelineConfig};

/// Mart stage only. Needs a canonical dataset from a previous normalize run.
fn main() -> Result<()> {
    init_logging();
    let cfg = PipelineConfig::load()?;
    let summary = marts::build_marts(&cfg)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
