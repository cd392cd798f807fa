//! The file-backed warehouse.
//!
//! One named partition owns seven line-delimited JSON streams under
//! `<data_root>/<partition>/`:
//!
//! - `ratings` — append-only superset of every rating ever received
//! - `training` / `validation` / `test` — append-only split subsets
//! - `products` — catalog, rewritten whole on each ingestion cycle
//! - `users` — roster of users eligible for batch scoring, rewritten
//!   whole on each sync cycle
//! - `recommendations` — append-only; the last record per user id is
//!   authoritative, older records for the same user are stale
//!
//! Durability discipline: appended lines are written with a single
//! `write_all` of a buffer that already ends in `\n`, so a crash never
//! leaves a torn line visible. Whole-stream rewrites go through a
//! temporary file in the same directory followed by a rename.

use crate::error::{Result, WarehouseError};
use datasource::{ParsedRating, PartitionLabel, ProductId, ProductRecord, RatingRecord, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which rating stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingStream {
    /// The full append-only superset
    All,
    /// One of the split subsets
    Split(PartitionLabel),
}

/// One persisted recommendation list.
///
/// The stream is append-only, so several records may exist for the same
/// user; readers must keep only the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: UserId,
    pub recommendations: Vec<ProductId>,
}

/// Row shape of the `users` stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct UserRow {
    user_id: UserId,
}

/// A named partition of the file warehouse.
#[derive(Debug, Clone)]
pub struct FileWarehouse {
    partition: String,
    root: PathBuf,
}

const STREAM_NAMES: [&str; 7] = [
    "ratings",
    "training",
    "validation",
    "test",
    "products",
    "users",
    "recommendations",
];

impl FileWarehouse {
    /// Open a handle to `<data_root>/<partition>`. Does not touch disk;
    /// call [`FileWarehouse::reset`] for first-time setup.
    pub fn new(data_root: impl AsRef<Path>, partition: impl Into<String>) -> Self {
        let partition = partition.into();
        let root = data_root.as_ref().join(&partition);
        Self { partition, root }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn rating_stream_path(&self, stream: RatingStream) -> PathBuf {
        let name = match stream {
            RatingStream::All => "ratings",
            RatingStream::Split(PartitionLabel::Training) => "training",
            RatingStream::Split(PartitionLabel::Validation) => "validation",
            RatingStream::Split(PartitionLabel::Test) => "test",
        };
        self.stream_path(name)
    }

    /// Destructively clear and recreate the partition's empty file set.
    ///
    /// Only for first-time setup, never during normal operation.
    pub fn reset(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| WarehouseError::io(&self.root, e))?;
        }
        fs::create_dir_all(&self.root).map_err(|e| WarehouseError::io(&self.root, e))?;

        for name in STREAM_NAMES {
            let path = self.stream_path(name);
            File::create(&path).map_err(|e| WarehouseError::io(&path, e))?;
        }

        info!("warehouse partition {} reset", self.partition);
        Ok(())
    }

    // =========================================================================
    // Writers
    // =========================================================================

    /// Append one rating to the `ratings` stream and to the split stream
    /// named by its label.
    ///
    /// The two appends are separate file operations; `ratings` is written
    /// first and is the authoritative stream should a crash land between
    /// them. Duplicate delivery is not deduplicated here — the caller owns
    /// send-once semantics.
    pub fn write_rating(&self, parsed: &ParsedRating) -> Result<()> {
        self.append_row(&self.rating_stream_path(RatingStream::All), &parsed.record)?;
        self.append_row(
            &self.rating_stream_path(RatingStream::Split(parsed.label)),
            &parsed.record,
        )
    }

    /// Append a batch of ratings, holding each stream's handle open once.
    pub fn write_ratings<'a, I>(&self, ratings: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a ParsedRating>,
    {
        let all_path = self.rating_stream_path(RatingStream::All);
        let mut all = self.open_append(&all_path)?;

        let mut splits: HashMap<PartitionLabel, (PathBuf, File)> = HashMap::new();
        let mut written = 0usize;

        for parsed in ratings {
            Self::append_to(&mut all, &all_path, &parsed.record)?;

            let (path, file) = match splits.entry(parsed.label) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let path = self.rating_stream_path(RatingStream::Split(parsed.label));
                    let file = self.open_append(&path)?;
                    e.insert((path, file))
                }
            };
            Self::append_to(file, path, &parsed.record)?;
            written += 1;
        }

        debug!("appended {written} ratings to partition {}", self.partition);
        Ok(written)
    }

    /// Rewrite the whole catalog. Idempotent: the same input always
    /// produces the same file content.
    pub fn write_products(&self, products: &[ProductRecord]) -> Result<()> {
        self.rewrite_stream("products", products.iter())
    }

    /// Upsert a single catalog entry by id, preserving the order of
    /// existing entries.
    pub fn write_product(&self, product: &ProductRecord) -> Result<()> {
        let mut products = self.read_products()?;
        match products
            .iter_mut()
            .find(|p| p.product_id == product.product_id)
        {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }
        self.write_products(&products)
    }

    /// Replace the entire roster of users eligible for batch scoring.
    ///
    /// Full overwrite, so repeated calls with the same roster are
    /// idempotent down to the byte.
    pub fn write_users(&self, users: &[UserId]) -> Result<()> {
        self.rewrite_stream(
            "users",
            users.iter().map(|&user_id| UserRow { user_id }),
        )
    }

    /// Append one recommendation list for a user.
    ///
    /// Earlier records for the same user become stale; readers resolve
    /// last-record-wins (see [`FileWarehouse::read_latest_recommendations`]).
    pub fn write_recommendation(
        &self,
        user_id: UserId,
        recommendations: &[ProductId],
    ) -> Result<()> {
        let record = RecommendationRecord {
            user_id,
            recommendations: recommendations.to_vec(),
        };
        self.append_row(&self.stream_path("recommendations"), &record)
    }

    // =========================================================================
    // Readers
    // =========================================================================

    pub fn read_ratings(&self, stream: RatingStream) -> Result<Vec<RatingRecord>> {
        self.read_stream(&self.rating_stream_path(stream))
    }

    pub fn read_products(&self) -> Result<Vec<ProductRecord>> {
        self.read_stream(&self.stream_path("products"))
    }

    pub fn read_users(&self) -> Result<Vec<UserId>> {
        let rows: Vec<UserRow> = self.read_stream(&self.stream_path("users"))?;
        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }

    /// Every recommendation record in file order, stale ones included.
    pub fn read_recommendations(&self) -> Result<Vec<RecommendationRecord>> {
        self.read_stream(&self.stream_path("recommendations"))
    }

    /// The authoritative recommendation list per user: the last record in
    /// the stream wins.
    pub fn read_latest_recommendations(&self) -> Result<HashMap<UserId, Vec<ProductId>>> {
        let mut latest = HashMap::new();
        for record in self.read_recommendations()? {
            latest.insert(record.user_id, record.recommendations);
        }
        Ok(latest)
    }

    // =========================================================================
    // Line-level plumbing
    // =========================================================================

    fn open_append(&self, path: &Path) -> Result<File> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| WarehouseError::io(path, e))
    }

    /// Serialize one row and append it with a single write, so a crash
    /// cannot leave a partial line.
    fn append_to<T: Serialize>(file: &mut File, path: &Path, row: &T) -> Result<()> {
        let mut line = serde_json::to_string(row).map_err(|e| WarehouseError::row(path, e))?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| WarehouseError::io(path, e))
    }

    fn append_row<T: Serialize>(&self, path: &Path, row: &T) -> Result<()> {
        let mut file = self.open_append(path)?;
        Self::append_to(&mut file, path, row)
    }

    /// Overwrite a stream through a temp file + rename, so readers never
    /// observe a half-written stream.
    fn rewrite_stream<T, I>(&self, name: &str, rows: I) -> Result<()>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let path = self.stream_path(name);
        let tmp_path = self.root.join(format!("{name}.tmp"));

        let mut tmp = File::create(&tmp_path).map_err(|e| WarehouseError::io(&tmp_path, e))?;
        for row in rows {
            Self::append_to(&mut tmp, &tmp_path, &row)?;
        }
        tmp.sync_all().map_err(|e| WarehouseError::io(&tmp_path, e))?;
        drop(tmp);

        fs::rename(&tmp_path, &path).map_err(|e| WarehouseError::io(&path, e))
    }

    fn read_stream<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        let file = File::open(path).map_err(|e| WarehouseError::io(path, e))?;
        let reader = BufReader::new(file);

        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| WarehouseError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line).map_err(|e| WarehouseError::row(path, e))?);
        }
        Ok(rows)
    }
}
