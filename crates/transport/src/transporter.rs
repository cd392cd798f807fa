//! The data pipeline between the serving store and the warehouse.
//!
//! A transporter reconciles the two stores, one direction per call:
//!
//! - fresh ratings from the serving store down into the warehouse
//! - the roster of users worth scoring into the warehouse
//! - fresh recommendation lists from the warehouse up into the store
//!
//! Each operation is idempotent in effect, though the rating path
//! duplicates rows in the append-only streams when re-sent — send-once
//! is this layer's responsibility, and re-running it after a confirmed
//! success is the one thing it does not defend against.

use crate::store::{ServingStore, StoreError};
use datasource::{ParsedRating, PartitionLabel, RatingRecord, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use warehouse::{FileWarehouse, WarehouseError};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for transport results
pub type Result<T> = std::result::Result<T, TransportError>;

pub struct Transporter {
    warehouse: FileWarehouse,
    store: Arc<dyn ServingStore>,
}

impl Transporter {
    pub fn new(warehouse: FileWarehouse, store: Arc<dyn ServingStore>) -> Self {
        Self { warehouse, store }
    }

    /// Pick up every rating held in the serving store and submit it to
    /// the warehouse. Users with no ratings are skipped.
    ///
    /// Returns the number of ratings sent.
    pub fn send_new_ratings_to_warehouse(&self) -> Result<usize> {
        let mut sent = 0usize;

        for user_id in self.store.user_ids() {
            let ratings = self.store.ratings(user_id)?;
            if ratings.is_empty() {
                debug!("user {user_id} has not rated anything, skipping");
                continue;
            }

            let parsed: Vec<ParsedRating> = ratings
                .iter()
                .map(|r| ParsedRating {
                    label: PartitionLabel::from_timestamp(r.timestamp),
                    record: RatingRecord {
                        user_id,
                        product_id: r.product_id,
                        rating: r.rating,
                        timestamp: r.timestamp,
                    },
                })
                .collect();

            sent += self.warehouse.write_ratings(&parsed)?;
            debug!("sent {} ratings for user {user_id}", parsed.len());
        }

        info!("sent {sent} ratings to warehouse");
        Ok(sent)
    }

    /// Rebuild the warehouse roster from the serving store: every user
    /// who has rated at least one product.
    ///
    /// Full overwrite, so two consecutive calls with unchanged store
    /// state produce byte-identical roster content.
    pub fn send_users_to_warehouse(&self) -> Result<usize> {
        let mut roster: Vec<UserId> = Vec::new();

        for user_id in self.store.user_ids() {
            if self.store.ratings(user_id)?.is_empty() {
                debug!("user {user_id} has not used any product, not sending to warehouse");
                continue;
            }
            roster.push(user_id);
        }

        self.warehouse.write_users(&roster)?;
        info!("total users sent to warehouse: {}", roster.len());
        Ok(roster.len())
    }

    /// Replay the warehouse recommendation stream into the serving store.
    ///
    /// Records are applied in file order, so the stream's append-only
    /// "last record per user wins" policy falls out of last-write-wins in
    /// the store.
    pub fn send_recommendations_to_db(&self) -> Result<usize> {
        let records = self.warehouse.read_recommendations()?;
        let applied = records.len();

        for record in records {
            self.store
                .set_recommendations(record.user_id, &record.recommendations)?;
            debug!(
                "recommendations set for user {}: {:?}",
                record.user_id, record.recommendations
            );
        }

        info!("applied {applied} recommendation records to the serving store");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::StoredRating;
    use datasource::DEFAULT_USER_ID;
    use std::fs;
    use tempfile::TempDir;
    use warehouse::RatingStream;

    fn setup() -> (TempDir, FileWarehouse, Arc<MemoryStore>) {
        let dir = TempDir::new().unwrap();
        let warehouse = FileWarehouse::new(dir.path(), "transport-tests");
        warehouse.reset().unwrap();
        let store = Arc::new(MemoryStore::new(vec![DEFAULT_USER_ID, 10001, 10002]));
        (dir, warehouse, store)
    }

    fn rating(product_id: i64, value: f32, timestamp: i64) -> StoredRating {
        StoredRating {
            product_id,
            rating: value,
            timestamp,
        }
    }

    #[test]
    fn ratings_flow_into_all_and_split_streams() {
        let (_dir, warehouse, store) = setup();
        store.add_rating(10001, rating(1, 5.0, 11)).unwrap();
        store.add_rating(10001, rating(2, 3.0, 19)).unwrap();

        let transporter = Transporter::new(warehouse.clone(), store);
        assert_eq!(transporter.send_new_ratings_to_warehouse().unwrap(), 2);

        let all = warehouse.read_ratings(RatingStream::All).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_id, 10001);
        assert_eq!(
            warehouse
                .read_ratings(RatingStream::Split(PartitionLabel::Test))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn users_without_ratings_are_skipped() {
        let (_dir, warehouse, store) = setup();
        store.add_rating(10002, rating(1, 4.0, 11)).unwrap();

        let transporter = Transporter::new(warehouse.clone(), store);
        transporter.send_new_ratings_to_warehouse().unwrap();
        assert_eq!(transporter.send_users_to_warehouse().unwrap(), 1);

        assert_eq!(warehouse.read_users().unwrap(), vec![10002]);
    }

    #[test]
    fn roster_sync_is_idempotent_byte_for_byte() {
        let (_dir, warehouse, store) = setup();
        store.add_rating(10001, rating(1, 5.0, 11)).unwrap();
        store.add_rating(10002, rating(2, 2.0, 13)).unwrap();

        let transporter = Transporter::new(warehouse.clone(), store);
        let users_file = warehouse.root().join("users");

        transporter.send_users_to_warehouse().unwrap();
        let first = fs::read(&users_file).unwrap();

        transporter.send_users_to_warehouse().unwrap();
        let second = fs::read(&users_file).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn recommendations_replay_with_last_record_winning() {
        let (_dir, warehouse, store) = setup();
        warehouse.write_recommendation(DEFAULT_USER_ID, &[9, 8]).unwrap();
        warehouse.write_recommendation(10001, &[1, 2, 3]).unwrap();
        warehouse.write_recommendation(10001, &[4, 5]).unwrap();

        let transporter = Transporter::new(warehouse, store.clone());
        assert_eq!(transporter.send_recommendations_to_db().unwrap(), 3);

        // Stale first record for 10001 was overwritten by the later one
        assert_eq!(store.recommendations(10001).unwrap(), vec![4, 5]);
        assert_eq!(store.recommendations(DEFAULT_USER_ID).unwrap(), vec![9, 8]);
    }

    #[test]
    fn recommendation_for_unknown_user_surfaces_the_store_error() {
        let (_dir, warehouse, store) = setup();
        warehouse.write_recommendation(31337, &[1]).unwrap();

        let transporter = Transporter::new(warehouse, store);
        assert!(matches!(
            transporter.send_recommendations_to_db(),
            Err(TransportError::Store(StoreError::UnknownUser(31337)))
        ));
    }
}
