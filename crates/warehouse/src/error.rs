//! Error types for the warehouse crate.

use datasource::ParseError;
use std::path::PathBuf;
use thiserror::Error;

/// An I/O or serialization failure inside the warehouse.
///
/// Always surfaced to the caller; the warehouse never drops a failed
/// write silently.
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row in {path}: {source}")]
    Row {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl WarehouseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WarehouseError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn row(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        WarehouseError::Row {
            path: path.into(),
            source,
        }
    }
}

/// Convenience type alias for warehouse results
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Errors raised while ingesting an external dataset into the warehouse.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A source line failed to parse (and `continue_on_error` was off,
    /// or the line belonged to the product catalog which always aborts)
    #[error("parse failure at line {line_no}: {source}")]
    Parse {
        line_no: usize,
        #[source]
        source: ParseError,
    },

    /// Reading the external source file failed
    #[error("unable to read source file {path}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A warehouse write failed mid-ingestion
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}
