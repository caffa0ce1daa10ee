// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::normalize::period::parse_period;

const DEFAULT_CONFIG_FILE: &str = "pipeline.yaml";

/// Locations and operator overrides for one pipeline run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub curated_dir: PathBuf,
    pub marts_dir: PathBuf,
    /// File name of the master extract inside `raw_dir`.
    pub master_name: String,
    /// File name of the canonical dataset inside `curated_dir`.
    pub canonical_name: String,
    /// `YYYY-MM` assigned when a single-snapshot extract yields no period.
    pub fallback_period: Option<String>,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            curated_dir: PathBuf::from("data/curated"),
            marts_dir: PathBuf::from("marts"),
            master_name: "NH_ProviderInfo_Oct2024.csv".to_string(),
            canonical_name: "nursing_data.parquet".to_string(),
            fallback_period: None,
            top_n: 10,
        }
    }
}

impl PipelineConfig {
    /// Resolve the config: YAML file (`NH_CONFIG` or `./pipeline.yaml`), then
    /// `NH_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let explicit = env::var_os("NH_CONFIG").map(PathBuf::from);
        let mut cfg = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(PipelineError::MissingInput { path }.into());
                }
                Self::from_yaml_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("no config file; using defaults");
                Self::default()
            }
        };
        cfg.apply_overrides(|key| env::var(key).ok())?;
        cfg.validate()?;
        info!(
            raw = %cfg.raw_dir.display(),
            master = %cfg.master_name,
            fallback = ?cfg.fallback_period,
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `NH_*` overrides; `lookup` is `env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NH_RAW_DIR") {
            self.raw_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NH_CURATED_DIR") {
            self.curated_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NH_MARTS_DIR") {
            self.marts_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NH_MASTER_NAME") {
            self.master_name = v;
        }
        if let Some(v) = lookup("NH_FALLBACK_PERIOD") {
            let v = v.trim().to_string();
            self.fallback_period = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("NH_TOP_N") {
            self.top_n = v.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("NH_TOP_N must be a positive integer, got {v:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if let Some(p) = &self.fallback_period {
            if parse_period(p).is_none() {
                return Err(PipelineError::InvalidConfig(format!(
                    "fallback_period must be YYYY-MM, got {p:?}"
                )));
            }
        }
        if self.top_n == 0 {
            return Err(PipelineError::InvalidConfig("top_n must be at least 1".into()));
        }
        if self.master_name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("master_name is empty".into()));
        }
        Ok(())
    }

    pub fn master_path(&self) -> PathBuf {
        self.raw_dir.join(&self.master_name)
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.curated_dir.join(&self.canonical_name)
    }

    pub fn mart_path(&self, name: &str) -> PathBuf {
        self.marts_dir.join(format!("{name}.parquet"))
    }
}
