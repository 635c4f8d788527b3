use crate::ranker::Strategy;
use crate::{Result, SearchError};
use cv_core::{RobustConfig, Sampling};
use cv_features::{
    GeometricVerifier, Matcher, DEFAULT_CONFIDENCE, DEFAULT_MAX_ITERATIONS, DEFAULT_RATIO,
    DEFAULT_REPROJ_THRESHOLD, ORB_DESCRIPTOR_BYTES,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_N_PROBE: usize = 30;

/// RANSAC knobs for the verification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacSettings {
    pub max_iterations: usize,
    pub confidence: f64,
    pub sampling: Sampling,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence: DEFAULT_CONFIDENCE,
            sampling: Sampling::Random,
        }
    }
}

/// Parameters for a ranking run. [`SearchEngine::new`](crate::SearchEngine::new)
/// takes everything it needs from here.
///
/// Missing fields in a JSON file fall back to the defaults:
///
/// ```json
/// { "ratio": 0.7, "two_stage": true, "n_probe": 50, "ransac": { "sampling": { "seeded": 7 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Lowe ratio, strictly inside (0, 1).
    pub ratio: f32,
    /// Maximum reprojection error of an inlier, in keypoint pixel units.
    pub reproj_threshold: f64,
    /// Expected descriptor width in bytes.
    pub descriptor_bytes: usize,
    /// Number of results returned per query.
    pub top_k: usize,
    /// Shortlist by correspondence count before verifying.
    pub two_stage: bool,
    /// Shortlist size of the two-stage coarse phase.
    pub n_probe: usize,
    pub ransac: RansacSettings,
    /// Score gallery entries on the rayon pool.
    pub parallel: bool,
    /// Worker threads of a dedicated pool for parallel scoring. Falls back to
    /// `RUSTCV_CPU_THREADS`, then to the global pool.
    pub threads: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_RATIO,
            reproj_threshold: DEFAULT_REPROJ_THRESHOLD,
            descriptor_bytes: ORB_DESCRIPTOR_BYTES,
            top_k: DEFAULT_TOP_K,
            two_stage: false,
            n_probe: DEFAULT_N_PROBE,
            ransac: RansacSettings::default(),
            parallel: false,
            threads: None,
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| SearchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic RANSAC sampling with `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ransac.sampling = Sampling::Seeded(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ratio > 0.0 && self.ratio < 1.0) {
            return Err(SearchError::InvalidConfig(format!(
                "ratio must lie in (0, 1), got {}",
                self.ratio
            )));
        }
        if !(self.reproj_threshold > 0.0 && self.reproj_threshold.is_finite()) {
            return Err(SearchError::InvalidConfig(format!(
                "reproj_threshold must be positive, got {}",
                self.reproj_threshold
            )));
        }
        if self.descriptor_bytes == 0 {
            return Err(SearchError::InvalidConfig(
                "descriptor_bytes must be >= 1".to_string(),
            ));
        }
        if self.ransac.max_iterations == 0 {
            return Err(SearchError::InvalidConfig(
                "ransac.max_iterations must be >= 1".to_string(),
            ));
        }
        if !(self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0) {
            return Err(SearchError::InvalidConfig(format!(
                "ransac.confidence must lie in (0, 1), got {}",
                self.ransac.confidence
            )));
        }
        if self.threads == Some(0) {
            return Err(SearchError::InvalidConfig(
                "threads must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn strategy(&self) -> Strategy {
        if self.two_stage {
            Strategy::TwoStage {
                n_probe: self.n_probe,
            }
        } else {
            Strategy::BruteForce
        }
    }

    pub fn matcher(&self) -> Matcher {
        Matcher::new()
            .with_ratio_test(self.ratio)
            .with_descriptor_bytes(self.descriptor_bytes)
    }

    pub fn verifier(&self) -> GeometricVerifier {
        GeometricVerifier::with_config(RobustConfig {
            threshold: self.reproj_threshold,
            max_iterations: self.ransac.max_iterations,
            confidence: self.ransac.confidence,
            sampling: self.ransac.sampling,
        })
    }
}
