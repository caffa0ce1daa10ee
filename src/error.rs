use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration errors. Anything data-shaped degrades to sentinels
/// instead of landing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("expected input at {}; fix the configured location or file name", path.display())]
    MissingInput { path: PathBuf },

    #[error("canonical dataset {} is incompatible: {reason}", path.display())]
    IncompatibleSchema { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
