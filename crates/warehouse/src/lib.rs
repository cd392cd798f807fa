//! # Warehouse Crate
//!
//! Durable, append-oriented store between raw ingestion and model
//! training/serving. One named partition owns seven line-delimited JSON
//! streams; see [`files::FileWarehouse`] for the layout and durability
//! discipline.
//!
//! ## Main Components
//!
//! - **files**: The partition, its streams, writers and readers
//! - **ingest**: Loading an external [`datasource::Source`] into a partition
//! - **error**: Warehouse and ingestion errors
//!
//! ## Example Usage
//!
//! ```no_run
//! use warehouse::{FileWarehouse, ingest};
//! use datasource::{MovieLensSource, Source};
//!
//! let source = MovieLensSource::new(
//!     "movielens",
//!     "external_data/ml-1m/ratings.dat",
//!     "external_data/ml-1m/movies.dat",
//! );
//! let wh = FileWarehouse::new("warehouse_dir/data", source.name());
//! wh.reset()?;
//! ingest::ingest_catalog(&source, &wh)?;
//! ingest::ingest_ratings(&source, &wh, true)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Public modules
pub mod error;
pub mod files;
pub mod ingest;

// Re-export commonly used types for convenience
pub use error::{IngestError, WarehouseError};
pub use files::{FileWarehouse, RatingStream, RecommendationRecord};
pub use ingest::IngestReport;
