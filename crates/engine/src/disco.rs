//! Default [`Solver`] backed by the `discorec` matrix-factorization
//! library.
//!
//! discorec fits latent factors with explicit feedback; after fitting we
//! copy the factors out into a [`FactorModel`] so the artifact can be
//! persisted and scored without the library being reconstructed.

use crate::error::Result;
use crate::solver::{FactorModel, Hyperparams, Solver};
use datasource::RatingRecord;
use discorec::{Dataset, RecommenderBuilder};
use std::collections::HashSet;
use tracing::debug;

/// Explicit-feedback matrix factorization via discorec.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoSolver;

impl Solver for DiscoSolver {
    fn train(&self, rows: &[RatingRecord], params: &Hyperparams) -> Result<FactorModel> {
        // An empty training set yields an empty model: every prediction is
        // undefined and the grid search's NaN policy takes over.
        if rows.is_empty() {
            debug!("no training rows, producing an empty model");
            return Ok(FactorModel::with_rank(params.rank));
        }

        let mut dataset = Dataset::new();
        let mut users = HashSet::new();
        let mut products = HashSet::new();
        for row in rows {
            dataset.push(row.user_id, row.product_id, row.rating);
            users.insert(row.user_id);
            products.insert(row.product_id);
        }

        let mut builder = RecommenderBuilder::new();
        builder
            .factors(params.rank)
            .iterations(params.iterations)
            .regularization(params.regularization);
        let recommender = builder.fit_explicit(&dataset);

        let mut model = FactorModel::with_rank(params.rank);
        for user_id in users {
            if let Some(factors) = recommender.user_factors(&user_id) {
                model.insert_user(user_id, factors.to_vec());
            }
        }
        for product_id in products {
            if let Some(factors) = recommender.item_factors(&product_id) {
                model.insert_product(product_id, factors.to_vec());
            }
        }

        debug!(
            "fitted rank-{} model over {} users and {} products",
            params.rank,
            model.known_users(),
            model.known_products()
        );
        Ok(model)
    }
}
