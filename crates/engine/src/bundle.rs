//! Persisted model bundle layout.
//!
//! A bundle is a directory holding:
//!
//! - `params.json` — always present: the warehouse partition name, the
//!   recommendation count, and the selected hyperparameters (or `null`
//!   when no grid search has succeeded yet). Its presence is what makes a
//!   not-ready bundle distinguishable from a missing one.
//! - `model.json` — the serialized [`FactorModel`], present only when the
//!   engine was ready at export time.

use crate::error::{EngineError, Result};
use crate::solver::{FactorModel, Hyperparams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const PARAMS_FILE: &str = "params.json";
pub const MODEL_FILE: &str = "model.json";

/// The hyperparameters a grid search settled on, plus its metrics.
///
/// `validation_rmse` drove the selection; `test_rmse` is reporting-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectedParams {
    #[serde(flatten)]
    pub hyperparams: Hyperparams,
    pub validation_rmse: f64,
    pub test_rmse: f64,
}

/// Bundle metadata as serialized to `params.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleParams {
    pub warehouse_partition: String,
    pub recommendation_count: usize,
    pub hyperparameters: Option<SelectedParams>,
}

/// Write `params.json`, creating the bundle directory if needed.
pub fn write_params(path: &Path, params: &BundleParams) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| EngineError::bundle(path, e))?;
    write_json(&path.join(PARAMS_FILE), params)
}

/// Write `model.json`.
pub fn write_model(path: &Path, model: &FactorModel) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| EngineError::bundle(path, e))?;
    write_json(&path.join(MODEL_FILE), model)
}

/// Read `params.json`. A missing or malformed metadata file is a hard
/// error: without it the bundle is indistinguishable from garbage.
pub fn read_params(path: &Path) -> Result<BundleParams> {
    let file = path.join(PARAMS_FILE);
    let content = fs::read_to_string(&file).map_err(|e| EngineError::bundle(&file, e))?;
    serde_json::from_str(&content).map_err(|e| EngineError::BundleFormat {
        path: file,
        source: e,
    })
}

/// Read `model.json` if a usable artifact is present.
///
/// Absent or corrupt artifacts yield `None` rather than an error; the
/// importing engine comes up not ready and callers must check `ready()`
/// before scoring.
pub fn read_model(path: &Path) -> Option<FactorModel> {
    let file = path.join(MODEL_FILE);
    let content = match fs::read_to_string(&file) {
        Ok(content) => content,
        Err(e) => {
            warn!("no model artifact at {}: {e}", file.display());
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!("corrupt model artifact at {}: {e}", file.display());
            None
        }
    }
}

/// Serialize through a temp file + rename so a crashed export never
/// leaves a half-written artifact behind the final name.
fn write_json<T: Serialize>(file: &Path, value: &T) -> Result<()> {
    let tmp = file.with_extension("json.tmp");
    let content = serde_json::to_string(value).map_err(|e| EngineError::BundleFormat {
        path: file.to_path_buf(),
        source: e,
    })?;
    fs::write(&tmp, content).map_err(|e| EngineError::bundle(&tmp, e))?;
    fs::rename(&tmp, file).map_err(|e| EngineError::bundle(file, e))
}
