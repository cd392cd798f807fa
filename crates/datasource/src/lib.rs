//! # Datasource Crate
//!
//! Converts raw external dataset lines into the typed records the rest of
//! the pipeline consumes.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (RatingRecord, ProductRecord, PartitionLabel)
//! - **movielens**: The `Source` trait plus the MovieLens implementation
//! - **error**: Parse errors
//!
//! ## Example Usage
//!
//! ```
//! use datasource::{MovieLensSource, PartitionLabel, Source};
//!
//! let source = MovieLensSource::new(
//!     "movielens",
//!     "external_data/ml-1m/ratings.dat",
//!     "external_data/ml-1m/movies.dat",
//! );
//!
//! let parsed = source.parse_rating("1::2804::5::978300719").unwrap();
//! assert_eq!(parsed.label, PartitionLabel::Test);
//! assert_eq!(parsed.record.product_id, 2804);
//! ```

// Public modules
pub mod error;
pub mod movielens;
pub mod types;

// Re-export commonly used types for convenience
pub use error::ParseError;
pub use movielens::{MovieLensSource, Source};
pub use types::{
    // Type aliases
    DEFAULT_USER_ID,
    ParsedRating,
    PartitionLabel,
    ProductId,
    ProductRecord,
    RatingRecord,
    UserId,
};
