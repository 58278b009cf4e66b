//! Biased latent-factor model trained by full-batch gradient descent.
//!
//! ```text
//! r̂_ji = x_j · w_i + b_i
//! cost = ½ Σ_ij R_ji (r̂_ji − Y_ji)² + λ/2 Σ_i ‖w_i‖² + λ/2 Σ_j ‖x_j‖²
//! ```
//!
//! Coordinate 0 of every user vector is pinned to 1, so `w_i[0]` acts as a
//! second per-item offset next to `b_i`. Every iteration computes all
//! gradients from the same parameter generation, then applies them together.

use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::TrainConfig;
use crate::dataset::RatingData;
use crate::error::Result;
use crate::store::{ParamBackend, ParameterStore, Parameters};
use crate::timing::{format_hms, Stopwatch};
use crate::vector::{axpy_f32, dot_f32, FixedVector};

/// Gradient of the cost w.r.t. every parameter, shaped like [`Parameters`].
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub w: Vec<FixedVector>,
    pub x: Vec<FixedVector>,
    pub b: FixedVector,
}

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `|cost| < tolerance`.
    Converged,
    /// `max_iterations` updates were applied.
    Exhausted,
}

/// Outcome of [`FactorizationModel::train`].
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Number of parameter updates applied.
    pub iterations: usize,
    /// Cost of the parameters that were persisted.
    pub final_cost: f64,
    pub stop: StopReason,
    /// Whether training started from persisted parameters.
    pub resumed: bool,
    /// Time spent loading and iterating, excluding the final save.
    pub elapsed: Duration,
    /// Cost before each update, followed by the final cost.
    pub history: Vec<f64>,
}

impl TrainReport {
    pub fn elapsed_hms(&self) -> String {
        format_hms(self.elapsed)
    }
}

/// Per-user residual rows `R_ji · (r̂_ji − Y_ji)`, `J × I`.
struct Residuals {
    rows: Vec<Vec<f32>>,
}

#[derive(Debug)]
pub struct FactorizationModel {
    store: ParameterStore,
    data: RatingData,
    config: TrainConfig,
}

impl FactorizationModel {
    /// Build a model with freshly initialised parameters persisted to `backend`.
    pub fn new(
        data: RatingData,
        config: TrainConfig,
        backend: Box<dyn ParamBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let params = Parameters::init(
            data.n_items(),
            data.n_users(),
            config.features,
            config.init,
        );
        Ok(Self {
            store: ParameterStore::new(params, backend),
            data,
            config,
        })
    }

    pub fn params(&self) -> &Parameters {
        self.store.params()
    }

    /// Mutable access to the parameters. Callers must keep `x_j[0] == 1`.
    pub fn params_mut(&mut self) -> &mut Parameters {
        self.store.params_mut()
    }

    pub fn data(&self) -> &RatingData {
        &self.data
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// `x_user · w_item + b_item`.
    ///
    /// # Panics
    ///
    /// Panics if `user` or `item` is out of range.
    pub fn predict(&self, user: usize, item: usize) -> f32 {
        let p = self.store.params();
        dot_f32(p.x[user].as_slice(), p.w[item].as_slice()) + p.b.get(item)
    }

    // ── Cost ─────────────────────────────────────────────────────────────

    fn residuals(&self) -> Residuals {
        let p = self.store.params();
        let rows: Vec<Vec<f32>> = self
            .data
            .ratings()
            .par_iter()
            .zip(self.data.mask().par_iter())
            .zip(p.x.par_iter())
            .map(|((yj, rj), xj)| {
                let (y, r, x) = (yj.as_slice(), rj.as_slice(), xj.as_slice());
                (0..y.len())
                    .map(|i| {
                        if r[i] == 0.0 {
                            0.0
                        } else {
                            let pred = dot_f32(x, p.w[i].as_slice()) + p.b.get(i);
                            r[i] * (pred - y[i])
                        }
                    })
                    .collect::<Vec<f32>>()
            })
            .collect();
        Residuals { rows }
    }

    fn cost_from(&self, residuals: &Residuals) -> f64 {
        let p = self.store.params();
        // per-row partial sums, then a fixed-order fold: identical for any thread count
        let partials: Vec<f64> = residuals
            .rows
            .par_iter()
            .map(|row| row.iter().map(|&e| (e as f64) * (e as f64)).sum::<f64>())
            .collect();
        let error_term: f64 = partials.iter().sum();

        let w_term: f64 = p.w.iter().map(|v| v.square() as f64).sum();
        let x_term: f64 = p.x.iter().map(|v| v.square() as f64).sum();
        let half_lambda = self.config.lambda as f64 / 2.0;

        error_term / 2.0 + half_lambda * w_term + half_lambda * x_term
    }

    /// Regularized squared error over the observed entries.
    pub fn cost(&self) -> f64 {
        self.cost_from(&self.residuals())
    }

    // ── Gradients ────────────────────────────────────────────────────────

    fn gradients_from(&self, residuals: &Residuals) -> Gradients {
        let p = self.store.params();
        let k = self.config.features;
        let lambda = self.config.lambda;
        let rows = &residuals.rows;

        let (w, b): (Vec<FixedVector>, Vec<f32>) = p
            .w
            .par_iter()
            .enumerate()
            .map(|(i, wi)| {
                let mut grad = vec![0.0f32; k];
                let mut grad_b = 0.0f32;
                for (row, xj) in rows.iter().zip(&p.x) {
                    let e = row[i];
                    if e != 0.0 {
                        axpy_f32(e, xj.as_slice(), &mut grad);
                        grad_b += e;
                    }
                }
                axpy_f32(lambda, wi.as_slice(), &mut grad);
                (FixedVector::from(grad), grad_b)
            })
            .unzip();

        let x: Vec<FixedVector> = p
            .x
            .par_iter()
            .zip(rows.par_iter())
            .map(|(xj, row)| {
                let mut grad = vec![0.0f32; k];
                for (&e, wi) in row.iter().zip(&p.w) {
                    if e != 0.0 {
                        axpy_f32(e, wi.as_slice(), &mut grad);
                    }
                }
                axpy_f32(lambda, xj.as_slice(), &mut grad);
                // x_j[0] is the pinned bias coordinate
                grad[0] = 0.0;
                FixedVector::from(grad)
            })
            .collect();

        Gradients {
            w,
            x,
            b: FixedVector::from(b),
        }
    }

    /// Full-batch gradient at the current parameters.
    pub fn gradients(&self) -> Gradients {
        self.gradients_from(&self.residuals())
    }

    /// Apply one descent step `θ ← θ − η ∇θ` for every parameter.
    pub fn apply(&mut self, mut grads: Gradients) -> Result<()> {
        let eta = self.config.learning_rate;
        let p = self.store.params_mut();
        p.w.par_iter_mut()
            .zip(grads.w.par_iter_mut())
            .try_for_each(|(w, g)| w.subtract(g.scale_by(eta)))?;
        p.x.par_iter_mut()
            .zip(grads.x.par_iter_mut())
            .try_for_each(|(x, g)| x.subtract(g.scale_by(eta)))?;
        p.b.subtract(grads.b.scale_by(eta))
    }

    /// One gradient-descent iteration. Returns the cost before the update.
    pub fn step(&mut self) -> Result<f64> {
        let residuals = self.residuals();
        let cost = self.cost_from(&residuals);
        let grads = self.gradients_from(&residuals);
        self.apply(grads)?;
        Ok(cost)
    }

    // ── Training loop ────────────────────────────────────────────────────

    /// Optionally resume, iterate until convergence or budget exhaustion,
    /// then persist the parameters.
    pub fn train(&mut self) -> Result<TrainReport> {
        let stopwatch = Stopwatch::start();
        let resumed = if self.config.resume {
            self.store.load()?
        } else {
            false
        };

        info!(
            users = self.data.n_users(),
            items = self.data.n_items(),
            features = self.config.features,
            lambda = self.config.lambda,
            learning_rate = self.config.learning_rate,
            max_iterations = self.config.max_iterations,
            resumed,
            "training started"
        );

        let verbose = self.config.verbose;
        if verbose {
            println!("  Batch GD Matrix Factorization");
            println!(
                "  Users: {}, Items: {}, Observed: {}",
                self.data.n_users(),
                self.data.n_items(),
                self.data.observed()
            );
            println!(
                "  Factors: {}, lr={}, reg={}",
                self.config.features, self.config.learning_rate, self.config.lambda
            );
            println!("  ITER |      COST      | TIME");
            println!("  ------------------------------------------------");
        }

        let mut history = Vec::with_capacity(self.config.max_iterations + 1);
        let mut iteration = 0;
        let mut warned = false;

        let mut row_start = std::time::Instant::now();

        let stop = loop {
            let residuals = self.residuals();
            let cost = self.cost_from(&residuals);
            history.push(cost);

            // row n is the cost after n updates
            if verbose {
                println!(
                    "  {:>4} | {:>14.6} | {:>6.2}s",
                    iteration,
                    cost,
                    row_start.elapsed().as_secs_f64()
                );
                row_start = std::time::Instant::now();
            }

            if !cost.is_finite() && !warned {
                warn!(iteration, cost, "cost is no longer finite");
                warned = true;
            }
            if cost.abs() < self.config.tolerance {
                break StopReason::Converged;
            }
            if iteration == self.config.max_iterations {
                break StopReason::Exhausted;
            }

            let grads = self.gradients_from(&residuals);
            self.apply(grads)?;
            iteration += 1;

            debug!(iteration, cost_before = cost, "update applied");
        };

        let elapsed = stopwatch.elapsed();
        let final_cost = history.last().copied().unwrap_or(f64::NAN);

        if verbose {
            println!("  ------------------------------------------------");
            println!("  Total time: {:.1}s", elapsed.as_secs_f64());
        }
        info!(
            iterations = iteration,
            final_cost,
            stop = ?stop,
            elapsed = %format_hms(elapsed),
            "training finished"
        );

        self.store.save()?;

        Ok(TrainReport {
            iterations: iteration,
            final_cost,
            stop,
            resumed,
            elapsed,
            history,
        })
    }

    /// Replace the parameters with the persisted state, if there is one.
    pub fn load(&mut self) -> Result<bool> {
        self.store.load()
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save()
    }

    /// Delete the persisted parameters. Live parameters are kept.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Init;
    use crate::store::MemoryBackend;

    fn toy() -> RatingData {
        RatingData::from_rows(
            vec![vec![5.0, 3.0], vec![4.0, 2.0]],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap()
    }

    fn model(data: RatingData, config: TrainConfig) -> FactorizationModel {
        FactorizationModel::new(data, config, Box::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn test_initial_cost_matches_formula() {
        // w = 0, b = 0, x_j = [1, 0]: error term ½ Σ Y², reg term λ/2 · J
        let m = model(toy(), TrainConfig::default().with_features(2).with_lambda(2.0));
        let expected = 0.5 * (25.0 + 9.0 + 16.0 + 4.0) + 1.0 * 2.0;
        assert!((m.cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_predict() {
        let mut m = model(toy(), TrainConfig::default().with_features(2));
        let p = m.params_mut();
        p.w[1] = FixedVector::from(vec![0.5, 2.0]);
        p.x[0] = FixedVector::from(vec![1.0, 3.0]);
        p.b.set(1, 0.25);
        assert_eq!(m.predict(0, 1), 0.5 + 6.0 + 0.25);
    }

    #[test]
    fn test_gradient_at_zero_init() {
        let m = model(toy(), TrainConfig::default().with_features(2).with_lambda(0.0));
        let g = m.gradients();
        // e_ji = −Y_ji, x_j = [1, 0]
        assert_eq!(g.w[0].as_slice(), &[-9.0, 0.0]);
        assert_eq!(g.w[1].as_slice(), &[-5.0, 0.0]);
        assert_eq!(g.b.as_slice(), &[-9.0, -5.0]);
        assert!(g.x.iter().all(|x| x.square() == 0.0));
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let data = RatingData::from_rows(
            vec![vec![5.0, 3.0, 1.0], vec![4.0, 0.0, 2.0], vec![1.0, 1.0, 5.0]],
            vec![vec![1.0, 1.0, 0.0], vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 1.0]],
        )
        .unwrap();
        let config = TrainConfig::default()
            .with_features(3)
            .with_lambda(0.7)
            .with_init(Init::Uniform { scale: 0.8, seed: 3 });
        let mut m = model(data, config);
        let g = m.gradients();

        for i in 0..3 {
            for f in 0..3 {
                assert_close(numeric_grad(&mut m, |p| &mut p.w[i][f]), g.w[i][f]);
            }
            assert_close(numeric_grad(&mut m, |p| &mut p.b[i]), g.b[i]);
        }
        for j in 0..3 {
            for f in 1..3 {
                assert_close(numeric_grad(&mut m, |p| &mut p.x[j][f]), g.x[j][f]);
            }
            assert_eq!(g.x[j][0], 0.0);
        }
    }

    // the cost is quadratic in any single coordinate, so a central difference is exact up to rounding
    fn numeric_grad(
        m: &mut FactorizationModel,
        get: impl Fn(&mut Parameters) -> &mut f32,
    ) -> f64 {
        let h = 1e-2f32;
        let orig = *get(m.params_mut());
        *get(m.params_mut()) = orig + h;
        let plus = m.cost();
        *get(m.params_mut()) = orig - h;
        let minus = m.cost();
        *get(m.params_mut()) = orig;
        (plus - minus) / (2.0 * h as f64)
    }

    fn assert_close(numeric: f64, analytic: f32) {
        let diff = (numeric - analytic as f64).abs();
        assert!(
            diff < 2e-2 * (1.0 + analytic.abs() as f64),
            "numeric {numeric} vs analytic {analytic}"
        );
    }

    #[test]
    fn test_step_keeps_user_bias_pinned() {
        let config = TrainConfig::default()
            .with_features(3)
            .with_learning_rate(0.01)
            .with_init(Init::Uniform { scale: 0.5, seed: 9 });
        let mut m = model(toy(), config);
        for _ in 0..10 {
            m.step().unwrap();
        }
        assert!(m.params().x.iter().all(|x| x.get(0) == 1.0));
    }

    #[test]
    fn test_empty_mask_leaves_only_regularization() {
        let data = RatingData::from_rows(
            vec![vec![5.0, 3.0], vec![4.0, 2.0]],
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
        )
        .unwrap();
        let config = TrainConfig::default()
            .with_features(2)
            .with_lambda(0.0)
            .with_init(Init::Uniform { scale: 1.0, seed: 5 });
        let mut m = model(data, config);

        // λ = 0: nothing contributes
        assert_eq!(m.cost(), 0.0);
        let g = m.gradients();
        assert!(g.w.iter().chain(&g.x).all(|v| v.square() == 0.0));
        assert_eq!(g.b.square(), 0.0);

        // λ > 0: exactly the penalty and its gradient
        m.config.lambda = 0.5;
        let p = m.params().clone();
        let penalty: f64 = p.w.iter().chain(&p.x).map(|v| v.square() as f64).sum();
        assert!((m.cost() - 0.25 * penalty).abs() < 1e-6);
        let g = m.gradients();
        for (gw, w) in g.w.iter().zip(&p.w) {
            for f in 0..2 {
                assert!((gw[f] - 0.5 * w[f]).abs() < 1e-7);
            }
        }
        assert_eq!(g.b.square(), 0.0);
    }

    #[test]
    fn test_train_converges_on_exact_fit() {
        // zero error and λ = 0 means the initial cost already satisfies the tolerance
        let data = RatingData::from_rows(vec![vec![0.0, 0.0]], vec![vec![1.0, 1.0]]).unwrap();
        let mut m = model(data, TrainConfig::default().with_features(2).with_lambda(0.0));
        let report = m.train().unwrap();
        assert_eq!(report.stop, StopReason::Converged);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.history, vec![0.0]);
    }

    #[test]
    fn test_train_zero_budget_does_not_update() {
        let mut m = model(toy(), TrainConfig::default().with_features(2).with_max_iterations(0));
        let before = m.params().clone();
        let report = m.train().unwrap();
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.iterations, 0);
        assert_eq!(m.params(), &before);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = FactorizationModel::new(
            toy(),
            TrainConfig::default().with_features(0),
            Box::new(MemoryBackend::new()),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::MfError::InvalidConfig(_)));
    }
}
