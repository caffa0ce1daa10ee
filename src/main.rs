use anyhow::Result;
use nhstaffing::{init_logging, marts, normalize, PipelineConfig};
use std::time::Instant;
use tracing::{error, info};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    init_logging();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = PipelineConfig::load()?;
    let started = Instant::now();

    // ─── 3) normalize the master extract ─────────────────────────────
    let report = normalize::normalize_master(&cfg).map_err(|e| {
        error!(error = %e, "normalization failed; no marts built");
        e
    })?;
    info!(report = %serde_json::to_string(&report)?, "normalize report");

    // ─── 4) rebuild marts from the canonical dataset ─────────────────
    let summary = marts::build_marts(&cfg)?;
    for m in &summary {
        info!(mart = %m.name, rows = m.rows, "mart ready");
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "pipeline complete");
    Ok(())
}
