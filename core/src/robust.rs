//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.
//! Sampling is either OS-seeded or deterministic (`Sampling::Seeded`) so that
//! callers can reproduce exact inlier counts.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// How minimal samples are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Fresh entropy for every run.
    #[default]
    Random,
    /// Fixed seed; identical inputs give identical results.
    Seeded(u64),
}

impl Sampling {
    fn rng(self) -> StdRng {
        match self {
            Sampling::Random => StdRng::from_entropy(),
            Sampling::Seeded(seed) => StdRng::seed_from_u64(seed),
        }
    }
}

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    /// Maximum error for a datum to count as an inlier (strict).
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub sampling: Sampling,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            sampling: Sampling::Random,
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub residual: f64,
    pub iterations: usize,
}

impl<M> RobustResult<M> {
    fn no_model(n: usize, iterations: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
            iterations,
        }
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;

    /// Cheap rejection of samples that cannot produce a valid model.
    fn is_degenerate(&self, _sample: &[&D]) -> bool {
        false
    }

    /// Re-estimate from the full consensus set. `None` keeps the sampled model.
    fn refine(&self, _model: &Self::Model, _inliers: &[&D]) -> Option<Self::Model> {
        None
    }
}

struct Hypothesis<M> {
    model: M,
    inliers: Vec<bool>,
    num_inliers: usize,
    residual: f64,
}

impl<M> Hypothesis<M> {
    /// More inliers wins; equal counts fall back to lower mean residual.
    fn beats(&self, other: &Hypothesis<M>) -> bool {
        self.num_inliers > other.num_inliers
            || (self.num_inliers == other.num_inliers && self.residual < other.residual)
    }
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        &self.config
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if k == 0 || n < k {
            return RobustResult::no_model(n, 0);
        }

        let mut rng = self.config.sampling.rng();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut best: Option<Hypothesis<M::Model>> = None;

        let mut limit = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < limit {
            iterations += 1;

            // 1. Sample
            let (chosen, _) = indices.partial_shuffle(&mut rng, k);
            let sample: Vec<&D> = chosen.iter().map(|&i| &data[i]).collect();
            if estimator.is_degenerate(&sample) {
                continue;
            }

            // 2. Estimate
            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };

            // 3. Score
            let candidate = self.score(estimator, model, data);
            if candidate.num_inliers == 0 {
                continue;
            }
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                let inlier_ratio = candidate.num_inliers as f64 / n as f64;
                limit = limit.min(adaptive_iterations(
                    self.config.confidence,
                    inlier_ratio,
                    k,
                    self.config.max_iterations,
                ));
                best = Some(candidate);
            }
        }

        let Some(mut best) = best else {
            return RobustResult::no_model(n, iterations);
        };

        // 4. Refine on the consensus set
        let consensus: Vec<&D> = data
            .iter()
            .zip(&best.inliers)
            .filter_map(|(d, &inlier)| inlier.then_some(d))
            .collect();
        if let Some(refined) = estimator.refine(&best.model, &consensus) {
            let candidate = self.score(estimator, refined, data);
            if candidate.num_inliers >= best.num_inliers {
                best = candidate;
            }
        }

        RobustResult {
            model: Some(best.model),
            inliers: best.inliers,
            num_inliers: best.num_inliers,
            residual: best.residual,
            iterations,
        }
    }

    fn score(&self, estimator: &M, model: M::Model, data: &[D]) -> Hypothesis<M::Model> {
        let mut inliers = vec![false; data.len()];
        let mut num_inliers = 0;
        let mut total_error = 0.0;

        for (j, d) in data.iter().enumerate() {
            let err = estimator.compute_error(&model, d);
            if err < self.config.threshold {
                inliers[j] = true;
                num_inliers += 1;
                total_error += err;
            }
        }

        let residual = if num_inliers > 0 {
            total_error / num_inliers as f64
        } else {
            f64::INFINITY
        };

        Hypothesis {
            model,
            inliers,
            num_inliers,
            residual,
        }
    }
}

/// Number of iterations needed to draw one all-inlier sample with `confidence`.
pub fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    sample_size: usize,
    max_iterations: usize,
) -> usize {
    let p_good = inlier_ratio.clamp(0.0, 1.0).powi(sample_size as i32);
    if p_good >= 1.0 {
        return 1;
    }
    let denom = (1.0 - p_good).ln();
    if denom >= 0.0 || !denom.is_finite() {
        return max_iterations;
    }
    let numer = (1.0 - confidence.clamp(0.0, 1.0)).max(f64::MIN_POSITIVE).ln();
    let needed = (numer / denom).ceil();
    if needed.is_finite() && needed >= 0.0 {
        (needed as usize).clamp(1, max_iterations)
    } else {
        max_iterations
    }
}
