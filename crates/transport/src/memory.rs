//! In-process reference implementation of [`ServingStore`].
//!
//! Holds everything in a `RwLock`ed snapshot, with an optional JSON file
//! behind it so separate CLI invocations can share state. Stands in for
//! the external key-value store in development and tests.

use crate::store::{Result, ServingStore, StoreError, StoredRating};
use datasource::{ProductId, ProductRecord, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserState {
    ratings: Vec<StoredRating>,
    recommendations: Vec<ProductId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    users: HashMap<UserId, UserState>,
    products: HashMap<ProductId, ProductRecord>,
}

pub struct MemoryStore {
    allowed: Vec<UserId>,
    snapshot: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// A purely in-memory store for the given allow-list.
    pub fn new(allowed: Vec<UserId>) -> Self {
        Self {
            allowed,
            snapshot: RwLock::new(Snapshot::default()),
            path: None,
        }
    }

    /// A store persisted as a JSON snapshot file. Loads the existing
    /// snapshot if one is present.
    pub fn open(path: impl Into<PathBuf>, allowed: Vec<UserId>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            serde_json::from_str(&content).map_err(|e| StoreError::Persistence(e.to_string()))?
        } else {
            Snapshot::default()
        };

        Ok(Self {
            allowed,
            snapshot: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    fn check_user(&self, user_id: UserId) -> Result<()> {
        if self.allowed.contains(&user_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownUser(user_id))
        }
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        let content =
            serde_json::to_string(snapshot).map_err(|e| StoreError::Persistence(e.to_string()))?;
        fs::write(path, content).map_err(|e| StoreError::Persistence(e.to_string()))?;
        debug!("serving-store snapshot written to {}", path.display());
        Ok(())
    }
}

impl ServingStore for MemoryStore {
    fn user_ids(&self) -> Vec<UserId> {
        self.allowed.clone()
    }

    fn ratings(&self, user_id: UserId) -> Result<Vec<StoredRating>> {
        self.check_user(user_id)?;
        let snapshot = self.snapshot.read().expect("store lock poisoned");
        Ok(snapshot
            .users
            .get(&user_id)
            .map(|u| u.ratings.clone())
            .unwrap_or_default())
    }

    fn add_rating(&self, user_id: UserId, rating: StoredRating) -> Result<()> {
        self.check_user(user_id)?;
        let mut snapshot = self.snapshot.write().expect("store lock poisoned");
        snapshot.users.entry(user_id).or_default().ratings.push(rating);
        self.persist(&snapshot)
    }

    fn recommendations(&self, user_id: UserId) -> Result<Vec<ProductId>> {
        self.check_user(user_id)?;
        let snapshot = self.snapshot.read().expect("store lock poisoned");
        Ok(snapshot
            .users
            .get(&user_id)
            .map(|u| u.recommendations.clone())
            .unwrap_or_default())
    }

    fn set_recommendations(&self, user_id: UserId, recommendations: &[ProductId]) -> Result<()> {
        self.check_user(user_id)?;
        let mut snapshot = self.snapshot.write().expect("store lock poisoned");
        snapshot.users.entry(user_id).or_default().recommendations = recommendations.to_vec();
        self.persist(&snapshot)
    }

    fn upsert_product(&self, product: &ProductRecord) -> Result<()> {
        let mut snapshot = self.snapshot.write().expect("store lock poisoned");
        snapshot.products.insert(product.product_id, product.clone());
        self.persist(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rating(product_id: ProductId, value: f32) -> StoredRating {
        StoredRating {
            product_id,
            rating: value,
            timestamp: 978300719,
        }
    }

    #[test]
    fn unknown_users_are_rejected() {
        let store = MemoryStore::new(vec![-1, 10001]);
        assert!(matches!(
            store.ratings(999),
            Err(StoreError::UnknownUser(999))
        ));
        assert!(matches!(
            store.add_rating(999, rating(1, 5.0)),
            Err(StoreError::UnknownUser(999))
        ));
    }

    #[test]
    fn ratings_accumulate_per_user() {
        let store = MemoryStore::new(vec![10001]);
        store.add_rating(10001, rating(1, 5.0)).unwrap();
        store.add_rating(10001, rating(2, 3.0)).unwrap();

        let ratings = store.ratings(10001).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].product_id, 1);
    }

    #[test]
    fn recommendations_are_replaced_not_appended() {
        let store = MemoryStore::new(vec![-1]);
        store.set_recommendations(-1, &[1, 2, 3]).unwrap();
        store.set_recommendations(-1, &[4]).unwrap();

        assert_eq!(store.recommendations(-1).unwrap(), vec![4]);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = MemoryStore::open(&path, vec![10001]).unwrap();
            store.add_rating(10001, rating(7, 4.0)).unwrap();
            store.set_recommendations(10001, &[7, 8]).unwrap();
        }

        let reopened = MemoryStore::open(&path, vec![10001]).unwrap();
        assert_eq!(reopened.ratings(10001).unwrap().len(), 1);
        assert_eq!(reopened.recommendations(10001).unwrap(), vec![7, 8]);
    }
}
