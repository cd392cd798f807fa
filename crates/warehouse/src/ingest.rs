//! Ingestion of an external dataset into the warehouse.
//!
//! This is the bridge between a [`Source`] and the partition's streams:
//! every ratings line lands in `ratings` plus exactly one split stream,
//! and the product catalog is rewritten as a whole. Catalog parsing and
//! loading are split so the orchestrator can also feed the same records
//! to the serving layer.

use crate::error::IngestError;
use crate::files::FileWarehouse;
use datasource::{ProductRecord, Source};
use tracing::{debug, error, info};

/// Outcome of a ratings ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Ratings written to the warehouse
    pub written: usize,
    /// Lines skipped due to parse failures (only when `continue_on_error`)
    pub skipped: usize,
}

/// Parse the source's whole product catalog.
///
/// Catalog ingestion always aborts on the first parse failure; a partial
/// catalog would silently shrink every user's candidate set.
pub fn load_catalog(source: &dyn Source) -> Result<Vec<ProductRecord>, IngestError> {
    let path = source.products_path();
    let lines = source
        .read_lines(path)
        .map_err(|e| IngestError::SourceIo {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut products = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let product = source.parse_product(line).map_err(|e| {
            error!("catalog parse failure at line {}: {e}", idx + 1);
            IngestError::Parse {
                line_no: idx + 1,
                source: e,
            }
        })?;
        products.push(product);
    }

    info!(
        "loaded {} catalog entries from {}",
        products.len(),
        source.name()
    );
    Ok(products)
}

/// Rewrite the warehouse catalog from the source.
pub fn ingest_catalog(
    source: &dyn Source,
    warehouse: &FileWarehouse,
) -> Result<usize, IngestError> {
    let products = load_catalog(source)?;
    warehouse.write_products(&products)?;
    Ok(products.len())
}

/// Populate `ratings` plus the three split streams from the source.
///
/// With `continue_on_error` a malformed line is logged and skipped;
/// without it the first malformed line aborts the whole run.
pub fn ingest_ratings(
    source: &dyn Source,
    warehouse: &FileWarehouse,
    continue_on_error: bool,
) -> Result<IngestReport, IngestError> {
    let path = source.ratings_path();
    let lines = source
        .read_lines(path)
        .map_err(|e| IngestError::SourceIo {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut parsed = Vec::with_capacity(lines.len());
    let mut skipped = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        match source.parse_rating(line) {
            Ok(rating) => parsed.push(rating),
            Err(e) if continue_on_error => {
                debug!("skipping line {}: {e}", idx + 1);
                skipped += 1;
            }
            Err(e) => {
                error!("ratings parse failure at line {}: {e}", idx + 1);
                return Err(IngestError::Parse {
                    line_no: idx + 1,
                    source: e,
                });
            }
        }
    }

    let written = warehouse.write_ratings(&parsed)?;
    info!(
        "ingested {} ratings from {} ({} skipped)",
        written,
        source.name(),
        skipped
    );
    Ok(IngestReport { written, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::RatingStream;
    use datasource::{MovieLensSource, PartitionLabel};
    use std::fs;
    use tempfile::TempDir;

    fn setup(ratings: &str, products: &str) -> (TempDir, MovieLensSource, FileWarehouse) {
        let dir = TempDir::new().unwrap();
        let ratings_path = dir.path().join("ratings.dat");
        let products_path = dir.path().join("movies.dat");
        fs::write(&ratings_path, ratings).unwrap();
        fs::write(&products_path, products).unwrap();

        let source = MovieLensSource::new("movielens", ratings_path, products_path);
        let warehouse = FileWarehouse::new(dir.path().join("data"), "movielens");
        warehouse.reset().unwrap();
        (dir, source, warehouse)
    }

    #[test]
    fn ratings_ingestion_populates_all_four_streams() {
        let (_dir, source, warehouse) = setup(
            "1::2804::5::978300719\n1::1193::5::978300760\n2::1193::4::978298413\n",
            "",
        );

        let report = ingest_ratings(&source, &warehouse, false).unwrap();
        assert_eq!(report, IngestReport { written: 3, skipped: 0 });

        assert_eq!(warehouse.read_ratings(RatingStream::All).unwrap().len(), 3);
        // 978300719 % 10 == 9 -> test, 978300760 % 10 == 0 -> training,
        // 978298413 % 10 == 3 -> training
        assert_eq!(
            warehouse
                .read_ratings(RatingStream::Split(PartitionLabel::Training))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            warehouse
                .read_ratings(RatingStream::Split(PartitionLabel::Test))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn malformed_rating_aborts_without_continue_on_error() {
        let (_dir, source, warehouse) = setup("1::2804::5::978300719\nnot-a-rating\n", "");

        let err = ingest_ratings(&source, &warehouse, false).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line_no: 2, .. }));
    }

    #[test]
    fn malformed_rating_is_skipped_with_continue_on_error() {
        let (_dir, source, warehouse) = setup(
            "1::2804::5::978300719\nnot-a-rating\n2::1193::4::978298413\n",
            "",
        );

        let report = ingest_ratings(&source, &warehouse, true).unwrap();
        assert_eq!(report, IngestReport { written: 2, skipped: 1 });
    }

    #[test]
    fn catalog_ingestion_always_aborts_on_parse_failure() {
        let (_dir, source, warehouse) = setup(
            "",
            "1::Toy Story (1995)::Animation|Children's|Comedy\nbroken-line\n",
        );

        let err = ingest_catalog(&source, &warehouse).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line_no: 2, .. }));
    }

    #[test]
    fn catalog_ingestion_rewrites_the_products_stream() {
        let (_dir, source, warehouse) = setup(
            "",
            "1::Toy Story (1995)::Animation|Children's|Comedy\n2::Jumanji (1995)::Adventure\n",
        );

        let count = ingest_catalog(&source, &warehouse).unwrap();
        assert_eq!(count, 2);

        let products = warehouse.read_products().unwrap();
        assert_eq!(products[1].name, "Jumanji (1995)");

        // Re-running is idempotent
        ingest_catalog(&source, &warehouse).unwrap();
        assert_eq!(warehouse.read_products().unwrap().len(), 2);
    }
}
