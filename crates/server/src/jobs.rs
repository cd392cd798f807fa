//! Stateless pipeline jobs.
//!
//! Each job rebuilds the engine from the exported bundle, does one unit
//! of work, and (for the training jobs) exports the bundle again only
//! after the work succeeded. A crashed or failed job therefore never
//! publishes a half-written bundle — the previous export stays current.
//!
//! Jobs are plain closures over a [`JobEnv`], which makes them equally
//! usable from the dispatcher's blocking pool and from a synchronous
//! test.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;

use engine::{GridOptions, RecommendationEngine, Solver};

/// Everything a job needs to reconstruct the engine.
#[derive(Clone)]
pub struct JobEnv {
    pub bundle_path: PathBuf,
    pub data_root: PathBuf,
    pub solver: Arc<dyn Solver>,
}

impl JobEnv {
    fn import_engine(&self) -> Result<RecommendationEngine> {
        RecommendationEngine::import_from_path(
            &self.bundle_path,
            &self.data_root,
            Arc::clone(&self.solver),
        )
        .with_context(|| {
            format!(
                "failed to import model bundle from {}",
                self.bundle_path.display()
            )
        })
    }
}

/// Grid-search a new model and publish the resulting bundle.
///
/// A grid where every candidate fails to converge is a successful run
/// that selects nothing; the exported bundle then carries no
/// hyperparameters and the engine stays non-ready.
pub fn train_new_model_job(env: &JobEnv, grid: &GridOptions) -> Result<Value> {
    let mut engine = env.import_engine()?;

    let selected = engine
        .train_new_model(grid)
        .context("grid-search training failed")?;

    engine
        .export(&env.bundle_path)
        .context("failed to export the trained bundle")?;

    match selected {
        Some(params) => {
            info!(
                "training selected rank={} regularization={} iterations={}",
                params.hyperparams.rank,
                params.hyperparams.regularization,
                params.hyperparams.iterations
            );
            Ok(serde_json::to_value(&params)?)
        }
        None => {
            info!("training selected no usable candidate");
            Ok(Value::Null)
        }
    }
}

/// Refit the current hyperparameters on the full ratings stream and
/// publish the refreshed bundle.
pub fn retrain_job(env: &JobEnv) -> Result<Value> {
    let mut engine = env.import_engine()?;

    engine
        .retrain_with_updated_data()
        .context("retraining failed")?;

    engine
        .export(&env.bundle_path)
        .context("failed to export the retrained bundle")?;

    Ok(json!({"retrained": true}))
}

/// Generate the default list plus one list per roster user, appending
/// each to the warehouse recommendation stream.
pub fn generate_recommendations_job(env: &JobEnv) -> Result<Value> {
    let engine = env.import_engine()?;

    engine
        .generate_recommendations()
        .context("batch recommendation generation failed")?;

    let users = engine.warehouse().read_users()?;
    Ok(json!({"roster_users": users.len()}))
}
