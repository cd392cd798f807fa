//! The solver boundary: hyperparameters, the trained artifact, and the
//! training capability the engine orchestrates.
//!
//! The numerical matrix-factorization step is deliberately opaque to the
//! rest of the pipeline. Anything that can fit latent factors from rating
//! rows satisfies [`Solver`]; the engine only ever sees the resulting
//! [`FactorModel`].

use crate::error::Result;
use datasource::{ProductId, RatingRecord, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One hyperparameter combination for the factorization solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    /// Number of latent factors
    pub rank: u32,
    pub regularization: f32,
    pub iterations: u32,
}

/// The option lists swept by grid search, in sweep order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOptions {
    pub ranks: Vec<u32>,
    pub regularizations: Vec<f32>,
    pub iterations: Vec<u32>,
}

impl GridOptions {
    /// The Cartesian product in fixed lexicographic order over
    /// (rank, regularization, iterations).
    ///
    /// Grid-search ties are broken by first-encountered-in-this-order, so
    /// the order must never depend on anything but the option lists.
    pub fn combinations(&self) -> Vec<Hyperparams> {
        let mut combos =
            Vec::with_capacity(self.ranks.len() * self.regularizations.len() * self.iterations.len());
        for &rank in &self.ranks {
            for &regularization in &self.regularizations {
                for &iterations in &self.iterations {
                    combos.push(Hyperparams {
                        rank,
                        regularization,
                        iterations,
                    });
                }
            }
        }
        combos
    }
}

/// A trained factorization artifact: latent factor vectors per user and
/// per product.
///
/// Serializable so a bundle can be exported and re-imported without the
/// solver that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorModel {
    rank: u32,
    user_factors: HashMap<UserId, Vec<f32>>,
    product_factors: HashMap<ProductId, Vec<f32>>,
}

impl FactorModel {
    pub fn with_rank(rank: u32) -> Self {
        Self {
            rank,
            user_factors: HashMap::new(),
            product_factors: HashMap::new(),
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn insert_user(&mut self, user_id: UserId, factors: Vec<f32>) {
        self.user_factors.insert(user_id, factors);
    }

    pub fn insert_product(&mut self, product_id: ProductId, factors: Vec<f32>) {
        self.product_factors.insert(product_id, factors);
    }

    pub fn known_users(&self) -> usize {
        self.user_factors.len()
    }

    pub fn known_products(&self) -> usize {
        self.product_factors.len()
    }

    /// Predicted rating for a (user, product) pair.
    ///
    /// Returns `NaN` when either side never appeared in training; callers
    /// filter undefined predictions rather than treating them as scores.
    pub fn predict(&self, user_id: UserId, product_id: ProductId) -> f32 {
        match (
            self.user_factors.get(&user_id),
            self.product_factors.get(&product_id),
        ) {
            (Some(user), Some(product)) => {
                user.iter().zip(product).map(|(u, p)| u * p).sum()
            }
            _ => f32::NAN,
        }
    }
}

/// The opaque training capability.
pub trait Solver: Send + Sync {
    /// Fit a factor model on the given rows.
    fn train(&self, rows: &[RatingRecord], params: &Hyperparams) -> Result<FactorModel>;
}

/// Root-mean-square error of the model over the given rows.
///
/// Rows whose prediction is undefined (unknown user or product) are
/// dropped before the mean; if no row has a defined prediction the RMSE
/// itself is `NaN`. NaN here is a value the grid search skips, not an
/// error.
pub fn evaluate(model: &FactorModel, rows: &[RatingRecord]) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for row in rows {
        let prediction = model.predict(row.user_id, row.product_id);
        if prediction.is_nan() {
            continue;
        }
        sum += (f64::from(prediction) - f64::from(row.rating)).powi(2);
        count += 1;
    }

    if count == 0 {
        f64::NAN
    } else {
        (sum / count as f64).sqrt()
    }
}
