use anyhow::Result;
use nhstaffing::{
    init_logging,
    kpi::{DashboardData, StateFilter},
    PipelineConfig,
};
use serde_json::json;
use std::env;

fn main() -> Result<()> {
    init_logging();

    // usage: kpis [STATE|ALL] [YYYY-MM]
    let args: Vec<String> = env::args().skip(1).collect();
    let filter = StateFilter::parse(args.first().map(String::as_str));
    let period = args.get(1).cloned();

    let cfg = PipelineConfig::load()?;
    let mut data = DashboardData::load(&cfg)?;
    if let Some(p) = &period {
        data.restrict_period(p);
    }
    let out = json!({
        "filter": match &filter {
            StateFilter::All => "ALL",
            StateFilter::State(s) => s.as_str(),
        },
        "period": period.as_deref().unwrap_or("ALL"),
        "kpis": data.kpis(&filter),
        "trend": data.trend(&filter),
        "leaderboard": data.leaderboard(&filter, cfg.top_n),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
