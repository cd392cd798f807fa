//! The `Source` trait and the MovieLens implementation.
//!
//! A source describes one external dataset: where its files live, how
//! they are encoded, and how one raw line becomes a typed record. The
//! ingestion path in the warehouse crate works against the trait, so a
//! new dataset only needs a new implementation here.

use crate::error::{ParseError, Result};
use crate::types::{ParsedRating, PartitionLabel, ProductRecord, RatingRecord};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// An external rating dataset that the pipeline can ingest.
pub trait Source: Send + Sync {
    /// Short name of the source; doubles as the default warehouse partition
    fn name(&self) -> &str;

    /// Path to the line-delimited ratings file
    fn ratings_path(&self) -> &Path;

    /// Path to the line-delimited product catalog file
    fn products_path(&self) -> &Path;

    /// Read a dataset file into lines, honoring the source's encoding
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Parse one ratings line into a payload plus its split label.
    ///
    /// Pure function of the line; no side effects.
    fn parse_rating(&self, line: &str) -> Result<ParsedRating>;

    /// Parse one catalog line. Pure function of the line.
    fn parse_product(&self, line: &str) -> Result<ProductRecord>;
}

/// The MovieLens 1M dataset, <https://grouplens.org/datasets/movielens/1m/>.
///
/// Ratings: `user_id::product_id::rating::timestamp`.
/// Products: `product_id::name::description`.
/// Files are ISO-8859-1 encoded, fields separated by `::`.
pub struct MovieLensSource {
    name: String,
    ratings_file: PathBuf,
    products_file: PathBuf,
}

/// Field separator used by the MovieLens files
const FIELD_SEPARATOR: &str = "::";

impl MovieLensSource {
    pub fn new(
        name: impl Into<String>,
        ratings_file: impl Into<PathBuf>,
        products_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            ratings_file: ratings_file.into(),
            products_file: products_file.into(),
        }
    }

    /// Split a line into exactly `expected` fields.
    fn split_fields<'a>(line: &'a str, expected: usize) -> Result<Vec<&'a str>> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.trim().is_empty() {
            return Err(ParseError::EmptyLine);
        }

        let fields: Vec<&str> = trimmed.split(FIELD_SEPARATOR).collect();
        if fields.len() != expected {
            return Err(ParseError::FieldCount {
                expected,
                found: fields.len(),
            });
        }
        Ok(fields)
    }

    fn parse_numeric<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
        value.parse().map_err(|_| ParseError::InvalidField {
            field,
            value: value.to_string(),
        })
    }
}

impl Source for MovieLensSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ratings_path(&self) -> &Path {
        &self.ratings_file
    }

    fn products_path(&self) -> &Path {
        &self.products_file
    }

    /// MovieLens files are ISO-8859-1 (Latin-1), not UTF-8. Each byte maps
    /// directly to the Unicode code point with the same value.
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let content: String = bytes.iter().map(|&b| b as char).collect();
        Ok(content.lines().map(|s| s.to_string()).collect())
    }

    fn parse_rating(&self, line: &str) -> Result<ParsedRating> {
        let fields = Self::split_fields(line, 4)?;

        let timestamp: i64 = Self::parse_numeric("timestamp", fields[3])?;
        let record = RatingRecord {
            user_id: Self::parse_numeric("user_id", fields[0])?,
            product_id: Self::parse_numeric("product_id", fields[1])?,
            rating: Self::parse_numeric("rating", fields[2])?,
            timestamp,
        };

        Ok(ParsedRating {
            label: PartitionLabel::from_timestamp(timestamp),
            record,
        })
    }

    fn parse_product(&self, line: &str) -> Result<ProductRecord> {
        let fields = Self::split_fields(line, 3)?;

        Ok(ProductRecord {
            product_id: Self::parse_numeric("product_id", fields[0])?,
            name: fields[1].to_string(),
            description: fields[2].to_string(),
        })
    }
}
