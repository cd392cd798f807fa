//! Core domain types shared across the pipeline.
//!
//! Every record that flows between the source parser, the warehouse, the
//! training engine and the transporter is a fixed struct defined here.
//! Nothing downstream ever sees an untyped payload.

use serde::{Deserialize, Serialize};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user.
///
/// Signed because `-1` is reserved for the population-default pseudo-user
/// whose recommendations are served when no personalized list exists.
pub type UserId = i64;

/// Unique identifier for a product in the catalog
pub type ProductId = i64;

/// The reserved pseudo-user that owns the population-default recommendations
pub const DEFAULT_USER_ID: UserId = -1;

// =============================================================================
// Records
// =============================================================================

/// One rating event: a user rated a product at some point in time.
///
/// Immutable once written to the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: f32,
    /// Unix timestamp of the rating event; also drives partition assignment
    pub timestamp: i64,
}

/// One catalog entry. May be upserted by id when the catalog is re-ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
}

// =============================================================================
// Partition Assignment
// =============================================================================

/// Which of the three model-building splits a rating belongs to.
///
/// Assignment is a pure function of the rating timestamp, so re-ingesting
/// the same dataset always reproduces the same splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionLabel {
    Training,
    Validation,
    Test,
}

impl PartitionLabel {
    /// Classify a timestamp into a split.
    ///
    /// Law: `t mod 10 < 6` is training, `6..8` is validation, `8..10` is
    /// test. Total over all `i64` values; negative timestamps go through
    /// `rem_euclid` so the remainder is always in `0..10`.
    pub fn from_timestamp(timestamp: i64) -> Self {
        match timestamp.rem_euclid(10) {
            0..=5 => PartitionLabel::Training,
            6..=7 => PartitionLabel::Validation,
            _ => PartitionLabel::Test,
        }
    }
}

/// Parser output for one rating line: the payload plus its split label.
///
/// The label is metadata computed by the parser so that the warehouse can
/// route the record without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRating {
    pub label: PartitionLabel,
    pub record: RatingRecord,
}
