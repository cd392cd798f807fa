//! Pipeline configuration.
//!
//! One serde struct carries everything a deployment varies: where the
//! warehouse and model bundles live, which partition this instance owns,
//! the serving-store allow-list, and the hyperparameter grid. The
//! `Default` carries the original deployment's values so the binary
//! works without a config file.

use datasource::UserId;
use engine::GridOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory holding one warehouse directory per partition.
    pub data_root: PathBuf,

    /// Directory holding one model bundle per partition.
    pub models_dir: PathBuf,

    /// Snapshot file for the in-process serving store. `None` keeps the
    /// store purely in memory.
    pub store_file: Option<PathBuf>,

    /// Named data partition this pipeline instance owns.
    pub partition: String,

    /// Length of every generated recommendation list.
    pub recommendation_count: usize,

    /// Users the serving store accepts. `-1` is the population-default
    /// pseudo-user and always belongs here.
    pub allowed_user_ids: Vec<UserId>,

    /// Hyperparameter option lists for grid-search training.
    pub grid: GridOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            store_file: Some(PathBuf::from("data/store.json")),
            partition: "movielens".to_string(),
            recommendation_count: 5,
            allowed_user_ids: vec![-1, 10001, 10002],
            grid: GridOptions {
                ranks: vec![6, 8, 10, 12],
                regularizations: vec![0.1, 1.0, 5.0, 10.0],
                iterations: vec![3, 10, 20],
            },
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields fall back to the
    /// defaults, so a partial override file is fine.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Where this partition's model bundle lives.
    pub fn bundle_path(&self) -> PathBuf {
        self.models_dir.join(&self.partition)
    }
}
