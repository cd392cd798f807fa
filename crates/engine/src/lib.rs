//! # Engine Crate
//!
//! Trains, persists and scores the recommendation model for one
//! warehouse partition.
//!
//! ## Main Components
//!
//! - **solver**: The opaque training capability ([`Solver`]), the trained
//!   artifact ([`FactorModel`]) and RMSE evaluation
//! - **disco**: Default solver backed by the `discorec` library
//! - **engine**: Grid search, retraining, batch recommendation generation
//! - **bundle**: Export/import of the persisted model bundle
//! - **error**: Engine errors, including the `NotReady` guard
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{DiscoSolver, GridOptions, RecommendationEngine};
//! use warehouse::FileWarehouse;
//!
//! let wh = FileWarehouse::new("warehouse_dir/data", "movielens");
//! let mut engine = RecommendationEngine::new(wh, Arc::new(DiscoSolver), 5);
//!
//! let grid = GridOptions {
//!     ranks: vec![6, 8, 10, 12],
//!     regularizations: vec![0.1, 1.0, 5.0, 10.0],
//!     iterations: vec![3, 10, 20],
//! };
//! if engine.train_new_model(&grid)?.is_some() {
//!     engine.generate_recommendations()?;
//!     engine.export("warehouse_dir/models/movielens".as_ref())?;
//! }
//! # Ok::<(), engine::EngineError>(())
//! ```

// Public modules
pub mod bundle;
pub mod disco;
pub mod engine;
pub mod error;
pub mod solver;

// Re-export commonly used types for convenience
pub use bundle::{BundleParams, SelectedParams};
pub use disco::DiscoSolver;
pub use engine::RecommendationEngine;
pub use error::EngineError;
pub use solver::{FactorModel, GridOptions, Hyperparams, Solver, evaluate};
