// src/lib.rs

pub mod config;
pub mod error;
pub mod kpi;
pub mod marts;
pub mod normalize;
pub mod schema;

pub use config::PipelineConfig;
pub use error::PipelineError;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the stdout subscriber shared by every binary. `RUST_LOG`
/// overrides the default `info` level; closing spans report stage timings.
pub fn init_logging() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
}
