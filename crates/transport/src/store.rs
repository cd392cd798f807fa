//! The serving-store boundary.
//!
//! The serving store is the low-latency side of the system: it holds live
//! user activity (ratings made through the product UI) and the
//! recommendation lists the product boundary reads back. Its wire
//! protocol is out of scope here; the pipeline only needs the narrow
//! capability set below.

use datasource::{ProductId, ProductRecord, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One rating as held by the serving store.
///
/// Carries the event timestamp so the transporter can rebuild a full
/// warehouse `RatingRecord` from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRating {
    pub product_id: ProductId,
    pub rating: f32,
    pub timestamp: i64,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The user id is not on the store's allow-list
    #[error("user with id {0} does not exist")]
    UnknownUser(UserId),

    /// The store's persistence layer failed
    #[error("serving store persistence failure: {0}")]
    Persistence(String),
}

/// Convenience type alias for store results
pub type Result<T> = std::result::Result<T, StoreError>;

/// Narrow interface to the serving store.
///
/// Only a fixed allow-list of user ids is valid; `-1` is the reserved
/// population-default pseudo-user and is part of the roster so its
/// recommendation list can be stored like any other.
pub trait ServingStore: Send + Sync {
    /// The full allow-list, reserved pseudo-user included.
    fn user_ids(&self) -> Vec<UserId>;

    /// Every rating the user has made in the serving store.
    fn ratings(&self, user_id: UserId) -> Result<Vec<StoredRating>>;

    /// Record a new rating for the user.
    fn add_rating(&self, user_id: UserId, rating: StoredRating) -> Result<()>;

    /// The user's current recommendation list (empty if never set).
    fn recommendations(&self, user_id: UserId) -> Result<Vec<ProductId>>;

    /// Replace the user's recommendation list.
    fn set_recommendations(&self, user_id: UserId, recommendations: &[ProductId]) -> Result<()>;

    /// Upsert one catalog entry into the serving layer.
    fn upsert_product(&self, product: &ProductRecord) -> Result<()>;
}
