//! Pipeline orchestrator.
//!
//! One struct owns the whole lifecycle for a single partition:
//!
//! 1. Bootstrap: reset the warehouse, ingest the catalog into the
//!    warehouse and the serving store, ingest the historical ratings.
//! 2. Train: grid-search a model and publish the bundle.
//! 3. Sync cycle: users up, fresh ratings up, retrain, regenerate
//!    recommendations, recommendations back down to the serving store.
//!
//! The training-shaped steps go through the stateless job functions so
//! the orchestrator and the dispatcher run the exact same code.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use datasource::Source;
use engine::{RecommendationEngine, Solver};
use transport::{ServingStore, Transporter};
use warehouse::{FileWarehouse, IngestReport, ingest};

use crate::config::PipelineConfig;
use crate::jobs::{self, JobEnv};

pub struct Pipeline {
    config: PipelineConfig,
    warehouse: FileWarehouse,
    store: Arc<dyn ServingStore>,
    solver: Arc<dyn Solver>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ServingStore>,
        solver: Arc<dyn Solver>,
    ) -> Self {
        let warehouse = FileWarehouse::new(&config.data_root, config.partition.clone());
        Self {
            config,
            warehouse,
            store,
            solver,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &FileWarehouse {
        &self.warehouse
    }

    /// The environment the stateless jobs run against.
    pub fn job_env(&self) -> JobEnv {
        JobEnv {
            bundle_path: self.config.bundle_path(),
            data_root: self.config.data_root.clone(),
            solver: Arc::clone(&self.solver),
        }
    }

    fn transporter(&self) -> Transporter {
        Transporter::new(self.warehouse.clone(), Arc::clone(&self.store))
    }

    /// Destructive first-time setup: wipe and recreate the partition,
    /// load the catalog into the warehouse and the serving store, ingest
    /// the historical ratings, and publish an initial (non-ready)
    /// bundle for the jobs to import from.
    pub fn bootstrap(&self, source: &dyn Source, continue_on_error: bool) -> Result<IngestReport> {
        let start = Instant::now();
        info!(
            "bootstrapping partition {} from source {}",
            self.config.partition,
            source.name()
        );

        self.warehouse
            .reset()
            .context("failed to reset the warehouse partition")?;

        let catalog = ingest::load_catalog(source).context("failed to load the product catalog")?;
        self.warehouse
            .write_products(&catalog)
            .context("failed to write the catalog to the warehouse")?;
        for product in &catalog {
            self.store
                .upsert_product(product)
                .context("failed to write the catalog to the serving store")?;
        }
        info!("catalog loaded: {} products", catalog.len());

        let report = ingest::ingest_ratings(source, &self.warehouse, continue_on_error)
            .context("failed to ingest ratings")?;
        info!(
            "ratings ingested: {} written, {} skipped",
            report.written, report.skipped
        );

        let engine = RecommendationEngine::new(
            self.warehouse.clone(),
            Arc::clone(&self.solver),
            self.config.recommendation_count,
        );
        engine
            .export(&self.config.bundle_path())
            .context("failed to publish the initial bundle")?;

        info!("bootstrap finished in {:.2?}", start.elapsed());
        Ok(report)
    }

    /// Grid-search a new model and publish it.
    pub fn train(&self) -> Result<Value> {
        jobs::train_new_model_job(&self.job_env(), &self.config.grid)
    }

    /// Refit the published hyperparameters on the full ratings stream.
    pub fn retrain(&self) -> Result<Value> {
        jobs::retrain_job(&self.job_env())
    }

    /// Regenerate every recommendation list into the warehouse.
    pub fn generate(&self) -> Result<Value> {
        jobs::generate_recommendations_job(&self.job_env())
    }

    /// Push serving-store state down into the warehouse: the roster of
    /// rating users, then their ratings.
    pub fn sync_up(&self) -> Result<()> {
        let transporter = self.transporter();
        let users = transporter.send_users_to_warehouse()?;
        let ratings = transporter.send_new_ratings_to_warehouse()?;
        info!("sync up complete: {users} users, {ratings} ratings");
        Ok(())
    }

    /// Pull finished recommendation lists up into the serving store.
    pub fn sync_down(&self) -> Result<()> {
        let applied = self.transporter().send_recommendations_to_db()?;
        info!("sync down complete: {applied} recommendation records");
        Ok(())
    }

    /// One full refresh: users up, ratings up, retrain, regenerate,
    /// recommendations down.
    pub fn run_cycle(&self) -> Result<()> {
        let start = Instant::now();
        info!("starting a full pipeline cycle");

        self.sync_up()?;
        self.retrain()?;
        self.generate()?;
        self.sync_down()?;

        info!("pipeline cycle finished in {:.2?}", start.elapsed());
        Ok(())
    }
}
