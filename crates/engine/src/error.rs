//! Error types for the engine crate.

use std::path::PathBuf;
use thiserror::Error;
use warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Scoring or retraining was attempted without a trained model.
    ///
    /// Always surfaced; the engine never silently falls back to an
    /// untrained default.
    #[error("engine is not ready: no trained model is loaded")]
    NotReady,

    /// A warehouse read or write failed mid-operation
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// The underlying solver failed to fit a model
    #[error("solver failure: {0}")]
    Solver(String),

    /// Reading or writing a persisted bundle failed
    #[error("bundle i/o failure at {path}: {source}")]
    Bundle {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bundle's metadata file exists but does not parse
    #[error("malformed bundle metadata at {path}: {source}")]
    BundleFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub(crate) fn bundle(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Bundle {
            path: path.into(),
            source,
        }
    }
}

/// Convenience type alias for engine results
pub type Result<T> = std::result::Result<T, EngineError>;
