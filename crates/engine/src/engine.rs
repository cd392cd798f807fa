//! # Recommendation Engine
//!
//! Orchestrates the model lifecycle against one warehouse partition:
//!
//! 1. Grid-search a new model over the training/validation streams
//! 2. Report the selected model's RMSE on the held-out test stream
//! 3. Retrain the selected hyperparameters on the full ratings stream
//! 4. Export/import the trained bundle
//! 5. Generate batch recommendations (population default + per user)
//!
//! State machine: untrained → training → ready; ready → retraining →
//! ready; ready → exported bundle → imported ready. An imported bundle
//! with no usable artifact comes back not ready and refuses to score.

use crate::bundle::{self, BundleParams, SelectedParams};
use crate::error::{EngineError, Result};
use crate::solver::{FactorModel, GridOptions, Solver, evaluate};
use datasource::{DEFAULT_USER_ID, PartitionLabel, ProductId, UserId};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warehouse::{FileWarehouse, RatingStream};

/// The recommendation engine for one warehouse partition.
///
/// All collaborators are injected: the warehouse it reads, the solver it
/// delegates numerical work to. Nothing is resolved from global state.
pub struct RecommendationEngine {
    warehouse: FileWarehouse,
    solver: Arc<dyn Solver>,
    recommendation_count: usize,
    params: Option<SelectedParams>,
    model: Option<FactorModel>,
}

impl RecommendationEngine {
    /// A fresh, untrained engine.
    pub fn new(
        warehouse: FileWarehouse,
        solver: Arc<dyn Solver>,
        recommendation_count: usize,
    ) -> Self {
        Self {
            warehouse,
            solver,
            recommendation_count,
            params: None,
            model: None,
        }
    }

    pub fn warehouse(&self) -> &FileWarehouse {
        &self.warehouse
    }

    pub fn recommendation_count(&self) -> usize {
        self.recommendation_count
    }

    pub fn selected_params(&self) -> Option<&SelectedParams> {
        self.params.as_ref()
    }

    /// True iff hyperparameters were selected and a trained model is
    /// loaded. Everything that scores checks this first.
    pub fn ready(&self) -> bool {
        let ready = self.params.is_some() && self.model.is_some();
        if !ready {
            warn!("engine is not ready");
        }
        ready
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Exhaustive grid search over the given option lists.
    ///
    /// Every combination is trained on the `training` stream and scored by
    /// RMSE on the `validation` stream. Selection keeps the lowest
    /// validation RMSE; candidates whose RMSE is NaN are never selected.
    /// Ties go to the first candidate in the fixed lexicographic sweep
    /// order, so identical inputs always select identically.
    ///
    /// The selected model is then re-evaluated on the `test` stream; that
    /// figure is reporting-only and does not affect selection.
    ///
    /// Returns `Ok(None)` — leaving the engine explicitly not ready — when
    /// every candidate's validation RMSE was NaN. There is no silent
    /// fallback to an arbitrary model.
    pub fn train_new_model(&mut self, grid: &GridOptions) -> Result<Option<SelectedParams>> {
        info!("starting training of a new model");

        let training = self
            .warehouse
            .read_ratings(RatingStream::Split(PartitionLabel::Training))?;
        let validation = self
            .warehouse
            .read_ratings(RatingStream::Split(PartitionLabel::Validation))?;

        let combos = grid.combinations();
        info!(
            "sweeping {} hyperparameter combinations over {} training rows",
            combos.len(),
            training.len()
        );

        // Candidates are evaluated in parallel; selection happens in a
        // separate pass over the fixed combination order so parallelism
        // cannot change which candidate wins.
        let candidates: Vec<(FactorModel, f64)> = combos
            .par_iter()
            .map(|hp| {
                let model = self.solver.train(&training, hp)?;
                let rmse = evaluate(&model, &validation);
                Ok((model, rmse))
            })
            .collect::<Result<_>>()?;

        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, rmse)) in candidates.iter().enumerate() {
            debug!(
                "candidate {:?} validation rmse: {rmse}",
                combos[idx]
            );
            if rmse.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, current)| *rmse < current) {
                best = Some((idx, *rmse));
            }
        }

        let Some((best_idx, validation_rmse)) = best else {
            warn!("every candidate had an undefined validation rmse; engine stays not ready");
            self.params = None;
            self.model = None;
            return Ok(None);
        };

        let model = candidates
            .into_iter()
            .nth(best_idx)
            .map(|(model, _)| model)
            .ok_or_else(|| EngineError::Solver("selected candidate vanished".to_string()))?;

        let test = self
            .warehouse
            .read_ratings(RatingStream::Split(PartitionLabel::Test))?;
        let test_rmse = evaluate(&model, &test);

        let selected = SelectedParams {
            hyperparams: combos[best_idx],
            validation_rmse,
            test_rmse,
        };
        info!(
            "selected {:?} (validation rmse {validation_rmse}, test rmse {test_rmse})",
            selected.hyperparams
        );

        self.model = Some(model);
        self.params = Some(selected);
        Ok(Some(selected))
    }

    /// Re-fit the already-selected hyperparameters against the full
    /// accumulated `ratings` stream.
    ///
    /// Does not re-run the grid search; fails with `NotReady` if no
    /// selection exists.
    pub fn retrain_with_updated_data(&mut self) -> Result<()> {
        if !self.ready() {
            return Err(EngineError::NotReady);
        }
        // Checked by ready() above
        let params = self.params.as_ref().map(|p| p.hyperparams).ok_or(EngineError::NotReady)?;

        info!("retraining the current model on the full ratings stream");
        let rows = self.warehouse.read_ratings(RatingStream::All)?;
        self.model = Some(self.solver.train(&rows, &params)?);
        info!("model retrained on {} rows", rows.len());
        Ok(())
    }

    // =========================================================================
    // Export / Import
    // =========================================================================

    /// Persist the bundle to a directory.
    ///
    /// The metadata file is always written — even for a not-ready engine —
    /// so a not-ready bundle is distinguishable from a missing one. The
    /// model artifact is written only when ready.
    pub fn export(&self, path: &Path) -> Result<()> {
        if let Some(model) = self.model.as_ref().filter(|_| self.params.is_some()) {
            bundle::write_model(path, model)?;
        }

        bundle::write_params(
            path,
            &BundleParams {
                warehouse_partition: self.warehouse.partition().to_string(),
                recommendation_count: self.recommendation_count,
                hyperparameters: self.params,
            },
        )?;

        info!("bundle exported to {}", path.display());
        Ok(())
    }

    /// Reconstruct an engine from a persisted bundle.
    ///
    /// Metadata is loaded first; a missing or corrupt model artifact
    /// produces a not-ready engine rather than failing the import, so
    /// callers must check [`RecommendationEngine::ready`] before scoring.
    pub fn import_from_path(
        path: &Path,
        data_root: &Path,
        solver: Arc<dyn Solver>,
    ) -> Result<Self> {
        let params = bundle::read_params(path)?;
        let model = bundle::read_model(path);

        let engine = Self {
            warehouse: FileWarehouse::new(data_root, params.warehouse_partition),
            solver,
            recommendation_count: params.recommendation_count,
            params: params.hyperparameters,
            model,
        };
        info!(
            "bundle imported from {} (ready: {})",
            path.display(),
            engine.params.is_some() && engine.model.is_some()
        );
        Ok(engine)
    }

    // =========================================================================
    // Recommendation generation
    // =========================================================================

    /// Population-level default: products ranked by the sum of all rating
    /// values they ever received, top N.
    ///
    /// Needs no trained model; serves the reserved pseudo-user and any
    /// user without a personalized list.
    pub fn generate_default_recommendations(&self) -> Result<Vec<ProductId>> {
        debug!("generating the default recommendations");

        let ratings = self.warehouse.read_ratings(RatingStream::All)?;
        let mut totals: std::collections::HashMap<ProductId, f64> = std::collections::HashMap::new();
        for rating in &ratings {
            *totals.entry(rating.product_id).or_insert(0.0) += f64::from(rating.rating);
        }

        let mut ranked: Vec<(ProductId, f64)> = totals.into_iter().collect();
        // Descending by aggregate; product id breaks exact ties so the
        // default list is reproducible.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(self.recommendation_count);

        Ok(ranked.into_iter().map(|(product_id, _)| product_id).collect())
    }

    /// Personalized list for one user: score every catalog product through
    /// the model, drop undefined predictions, keep the top N by score.
    ///
    /// The candidate set is the whole catalog — already-rated products are
    /// excluded at the serving boundary, not here.
    pub fn generate_recommendations_for_user(&self, user_id: UserId) -> Result<Vec<ProductId>> {
        if !self.ready() {
            return Err(EngineError::NotReady);
        }
        let model = self.model.as_ref().ok_or(EngineError::NotReady)?;

        let catalog = self.warehouse.read_products()?;
        let mut scored: Vec<(ProductId, f32)> = catalog
            .iter()
            .map(|product| (product.product_id, model.predict(user_id, product.product_id)))
            .filter(|(_, score)| !score.is_nan())
            .collect();

        // Stable sort: ties keep catalog order, which is acceptable
        // nondeterminism inherited from the solver's row order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.recommendation_count);

        let recommendations: Vec<ProductId> =
            scored.into_iter().map(|(product_id, _)| product_id).collect();
        info!(
            "generated {} recommendations for user {user_id}",
            recommendations.len()
        );
        Ok(recommendations)
    }

    /// Batch job: persist the default list under the reserved pseudo-user,
    /// then a personalized list for every user in the `users` stream.
    ///
    /// An empty roster is a logged no-op, not an error — it just means no
    /// user has rated anything yet.
    pub fn generate_recommendations(&self) -> Result<()> {
        debug!("starting the batch recommendation job");

        let default = self.generate_default_recommendations()?;
        self.warehouse
            .write_recommendation(DEFAULT_USER_ID, &default)?;

        let users = self.warehouse.read_users()?;
        if users.is_empty() {
            warn!("the users stream is empty; perhaps no users have rated anything yet");
            return Ok(());
        }

        for user_id in users {
            let recommendations = self.generate_recommendations_for_user(user_id)?;
            self.warehouse
                .write_recommendation(user_id, &recommendations)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Hyperparams;
    use datasource::{ParsedRating, ProductRecord, RatingRecord};
    use std::sync::Mutex;
    use tempfile::TempDir;

    // =========================================================================
    // Test fixtures
    // =========================================================================

    /// Deterministic solver: each user's factor is their average training
    /// rating, each product's factor is 1.0, so predict(u, p) is the
    /// user's training mean for any product seen in training.
    struct MeanSolver;

    impl Solver for MeanSolver {
        fn train(&self, rows: &[RatingRecord], params: &Hyperparams) -> Result<FactorModel> {
            let mut sums: std::collections::HashMap<UserId, (f32, u32)> =
                std::collections::HashMap::new();
            let mut model = FactorModel::with_rank(params.rank);
            for row in rows {
                let entry = sums.entry(row.user_id).or_insert((0.0, 0));
                entry.0 += row.rating;
                entry.1 += 1;
                model.insert_product(row.product_id, vec![1.0]);
            }
            for (user_id, (sum, count)) in sums {
                model.insert_user(user_id, vec![sum / count as f32]);
            }
            Ok(model)
        }
    }

    /// Solver whose evaluation quality is scripted per combination, used
    /// to pin down the selection policy.
    struct ScriptedSolver {
        // Maps rank -> the constant score its model predicts everywhere
        calls: Mutex<Vec<Hyperparams>>,
    }

    impl ScriptedSolver {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Solver for ScriptedSolver {
        fn train(&self, rows: &[RatingRecord], params: &Hyperparams) -> Result<FactorModel> {
            self.calls.lock().unwrap().push(*params);
            // Prediction error grows with rank, so the smallest rank wins
            let mut model = FactorModel::with_rank(params.rank);
            for row in rows {
                model.insert_user(row.user_id, vec![row.rating - params.rank as f32 / 10.0]);
                model.insert_product(row.product_id, vec![1.0]);
            }
            Ok(model)
        }
    }

    /// Solver producing models that never overlap the validation rows.
    struct UselessSolver;

    impl Solver for UselessSolver {
        fn train(&self, _rows: &[RatingRecord], params: &Hyperparams) -> Result<FactorModel> {
            Ok(FactorModel::with_rank(params.rank))
        }
    }

    fn parsed(user_id: UserId, product_id: ProductId, rating: f32, timestamp: i64) -> ParsedRating {
        ParsedRating {
            label: PartitionLabel::from_timestamp(timestamp),
            record: RatingRecord {
                user_id,
                product_id,
                rating,
                timestamp,
            },
        }
    }

    fn seeded_warehouse() -> (TempDir, FileWarehouse) {
        let dir = TempDir::new().unwrap();
        let wh = FileWarehouse::new(dir.path(), "engine-tests");
        wh.reset().unwrap();

        // Training rows (t % 10 < 6), validation rows (6..8), test (8..)
        wh.write_ratings(&[
            parsed(1, 10, 5.0, 11),
            parsed(1, 11, 3.0, 12),
            parsed(2, 10, 2.0, 13),
            parsed(1, 10, 4.0, 16),
            parsed(2, 11, 2.0, 17),
            parsed(1, 11, 4.0, 18),
        ])
        .unwrap();

        wh.write_products(&[
            ProductRecord {
                product_id: 10,
                name: "A".to_string(),
                description: "a".to_string(),
            },
            ProductRecord {
                product_id: 11,
                name: "B".to_string(),
                description: "b".to_string(),
            },
            ProductRecord {
                product_id: 12,
                name: "C".to_string(),
                description: "c".to_string(),
            },
        ])
        .unwrap();

        (dir, wh)
    }

    fn small_grid() -> GridOptions {
        GridOptions {
            ranks: vec![1, 2],
            regularizations: vec![0.1],
            iterations: vec![3],
        }
    }

    // =========================================================================
    // Grid search
    // =========================================================================

    #[test]
    fn grid_search_selects_lowest_validation_rmse() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(ScriptedSolver::new()), 5);

        let selected = engine.train_new_model(&small_grid()).unwrap().unwrap();

        // ScriptedSolver's error grows with rank, so rank 1 must win
        assert_eq!(selected.hyperparams.rank, 1);
        assert!(engine.ready());
        assert!(!selected.validation_rmse.is_nan());
        assert!(!selected.test_rmse.is_nan());
    }

    #[test]
    fn grid_search_is_deterministic_across_runs() {
        let (_dir, wh) = seeded_warehouse();

        let run = || {
            let mut engine =
                RecommendationEngine::new(wh.clone(), Arc::new(ScriptedSolver::new()), 5);
            engine.train_new_model(&small_grid()).unwrap().unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.hyperparams, second.hyperparams);
        assert_eq!(first.test_rmse, second.test_rmse);
    }

    #[test]
    fn all_nan_candidates_leave_the_engine_not_ready() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(UselessSolver), 5);

        let selected = engine.train_new_model(&small_grid()).unwrap();

        assert!(selected.is_none());
        assert!(!engine.ready());
        assert!(matches!(
            engine.generate_recommendations_for_user(1),
            Err(EngineError::NotReady)
        ));
    }

    #[test]
    fn every_combination_is_evaluated() {
        let (_dir, wh) = seeded_warehouse();
        let solver = Arc::new(ScriptedSolver::new());
        let mut engine = RecommendationEngine::new(wh, solver.clone(), 5);

        let grid = GridOptions {
            ranks: vec![1, 2, 3],
            regularizations: vec![0.1, 1.0],
            iterations: vec![3, 10],
        };
        engine.train_new_model(&grid).unwrap();

        assert_eq!(solver.calls.lock().unwrap().len(), 12);
    }

    // =========================================================================
    // Retraining
    // =========================================================================

    #[test]
    fn retrain_requires_a_ready_engine() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);

        assert!(matches!(
            engine.retrain_with_updated_data(),
            Err(EngineError::NotReady)
        ));
    }

    #[test]
    fn retrain_reuses_selected_params_on_the_full_stream() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh.clone(), Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();
        let before = *engine.selected_params().unwrap();

        // user 3 arrives after the initial training run
        wh.write_rating(&parsed(3, 12, 5.0, 21)).unwrap();
        engine.retrain_with_updated_data().unwrap();

        assert_eq!(engine.selected_params().unwrap().hyperparams, before.hyperparams);
        // After retraining on the full stream the new user is known
        assert!(!engine.generate_recommendations_for_user(3).unwrap().is_empty());
    }

    // =========================================================================
    // Export / import
    // =========================================================================

    #[test]
    fn export_import_round_trip_preserves_readiness_and_params() {
        let (dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();

        let bundle_dir = dir.path().join("models/engine-tests");
        engine.export(&bundle_dir).unwrap();

        let imported = RecommendationEngine::import_from_path(
            &bundle_dir,
            dir.path(),
            Arc::new(MeanSolver),
        )
        .unwrap();

        assert!(imported.ready());
        assert_eq!(
            imported.selected_params().unwrap().hyperparams,
            engine.selected_params().unwrap().hyperparams
        );
        assert_eq!(imported.warehouse().partition(), "engine-tests");
    }

    #[test]
    fn not_ready_export_is_distinguishable_from_a_missing_bundle() {
        let (dir, wh) = seeded_warehouse();
        let engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);

        let bundle_dir = dir.path().join("models/untrained");
        engine.export(&bundle_dir).unwrap();

        // Metadata exists, artifact does not: import succeeds, not ready
        let imported = RecommendationEngine::import_from_path(
            &bundle_dir,
            dir.path(),
            Arc::new(MeanSolver),
        )
        .unwrap();
        assert!(!imported.ready());

        // A truly missing bundle is an error
        assert!(
            RecommendationEngine::import_from_path(
                &dir.path().join("models/nope"),
                dir.path(),
                Arc::new(MeanSolver),
            )
            .is_err()
        );
    }

    #[test]
    fn corrupt_model_artifact_imports_as_not_ready() {
        let (dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();

        let bundle_dir = dir.path().join("models/corrupt");
        engine.export(&bundle_dir).unwrap();
        std::fs::write(bundle_dir.join(bundle::MODEL_FILE), "{broken").unwrap();

        let imported = RecommendationEngine::import_from_path(
            &bundle_dir,
            dir.path(),
            Arc::new(MeanSolver),
        )
        .unwrap();
        assert!(!imported.ready());
    }

    // =========================================================================
    // Recommendation generation
    // =========================================================================

    #[test]
    fn default_recommendations_rank_by_aggregate_rating_sum() {
        let dir = TempDir::new().unwrap();
        let wh = FileWarehouse::new(dir.path(), "defaults");
        wh.reset().unwrap();

        // Product 100: 5 + 2 = 7, product 200: 3
        wh.write_ratings(&[
            parsed(1, 100, 5.0, 11),
            parsed(1, 200, 3.0, 12),
            parsed(2, 100, 2.0, 13),
        ])
        .unwrap();

        let engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);
        assert_eq!(
            engine.generate_default_recommendations().unwrap(),
            vec![100, 200]
        );
    }

    #[test]
    fn default_recommendations_respect_the_count_limit() {
        let (_dir, wh) = seeded_warehouse();
        let engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 1);
        assert_eq!(engine.generate_default_recommendations().unwrap().len(), 1);
    }

    #[test]
    fn personalized_recommendations_drop_nan_scores() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh, Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();

        // Product 12 never appears in training, so its prediction is NaN
        // and it must not be recommended.
        let recs = engine.generate_recommendations_for_user(1).unwrap();
        assert!(!recs.contains(&12));
        assert!(!recs.is_empty());
    }

    #[test]
    fn batch_generation_writes_default_then_each_user() {
        let (_dir, wh) = seeded_warehouse();
        wh.write_users(&[1, 2]).unwrap();

        let mut engine = RecommendationEngine::new(wh.clone(), Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();
        engine.generate_recommendations().unwrap();

        let latest = wh.read_latest_recommendations().unwrap();
        assert!(latest.contains_key(&DEFAULT_USER_ID));
        assert!(latest.contains_key(&1));
        assert!(latest.contains_key(&2));
    }

    #[test]
    fn batch_generation_with_empty_roster_is_a_no_op() {
        let (_dir, wh) = seeded_warehouse();
        let mut engine = RecommendationEngine::new(wh.clone(), Arc::new(MeanSolver), 5);
        engine.train_new_model(&small_grid()).unwrap().unwrap();

        engine.generate_recommendations().unwrap();

        // Only the default pseudo-user was written
        let latest = wh.read_latest_recommendations().unwrap();
        assert_eq!(latest.len(), 1);
        assert!(latest.contains_key(&DEFAULT_USER_ID));
    }
}
