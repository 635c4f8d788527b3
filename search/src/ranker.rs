//! Brute-force and two-stage (coarse match count, fine inlier count) ranking.

use crate::config::DEFAULT_TOP_K;
use crate::{Result, SearchConfig, SearchError};
use cv_core::{Correspondences, FeatureSet};
use cv_features::{GeometricVerifier, Matcher, VerificationResult};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::cmp::Reverse;

/// Produces correspondences for one query/candidate pair.
pub trait MatchStage: Sync {
    fn correspondences(
        &self,
        query: &FeatureSet,
        candidate: &FeatureSet,
    ) -> cv_features::Result<Correspondences>;
}

/// Scores correspondences of one query/candidate pair geometrically.
pub trait VerifyStage: Sync {
    fn verify(
        &self,
        query: &FeatureSet,
        candidate: &FeatureSet,
        correspondences: &Correspondences,
    ) -> cv_features::Result<VerificationResult>;
}

impl MatchStage for Matcher {
    fn correspondences(
        &self,
        query: &FeatureSet,
        candidate: &FeatureSet,
    ) -> cv_features::Result<Correspondences> {
        self.try_match(query.descriptors(), candidate.descriptors())
    }
}

impl VerifyStage for GeometricVerifier {
    fn verify(
        &self,
        query: &FeatureSet,
        candidate: &FeatureSet,
        correspondences: &Correspondences,
    ) -> cv_features::Result<VerificationResult> {
        self.try_verify(query.points(), candidate.points(), correspondences)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedResult {
    pub image_id: String,
    pub score: usize,
}

/// Match and verification outcome for a single pair.
#[derive(Debug, Clone)]
pub struct PairScore {
    pub correspondences: Correspondences,
    pub verification: VerificationResult,
}

impl PairScore {
    pub fn inliers(&self) -> usize {
        self.verification.inlier_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Verify every gallery entry.
    BruteForce,
    /// Verify only the `n_probe` entries with the most correspondences.
    TwoStage { n_probe: usize },
}

struct CoarseHit<'g> {
    candidate: &'g FeatureSet,
    correspondences: Correspondences,
}

pub struct SearchEngine<M = Matcher, V = GeometricVerifier> {
    matcher: M,
    verifier: V,
    strategy: Strategy,
    top_k: usize,
    parallel: bool,
    /// Dedicated workers; `None` runs on the global rayon pool.
    pool: Option<ThreadPool>,
}

impl SearchEngine {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        config.validate()?;
        let pool = if config.parallel {
            cv_core::build_thread_pool(config.threads)
                .map_err(|e| SearchError::InvalidConfig(e.to_string()))?
        } else {
            None
        };
        Ok(Self {
            matcher: config.matcher(),
            verifier: config.verifier(),
            strategy: config.strategy(),
            top_k: config.top_k,
            parallel: config.parallel,
            pool,
        })
    }
}

impl<M: MatchStage, V: VerifyStage> SearchEngine<M, V> {
    pub fn with_stages(matcher: M, verifier: V) -> Self {
        Self {
            matcher,
            verifier,
            strategy: Strategy::BruteForce,
            top_k: DEFAULT_TOP_K,
            parallel: false,
            pool: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Ranks `gallery` with the configured strategy and result count.
    pub fn search(&self, query: &FeatureSet, gallery: &[FeatureSet]) -> Vec<RankedResult> {
        self.rank(self.strategy, query, gallery, self.top_k)
    }

    pub fn rank(
        &self,
        strategy: Strategy,
        query: &FeatureSet,
        gallery: &[FeatureSet],
        top_k: usize,
    ) -> Vec<RankedResult> {
        match strategy {
            Strategy::BruteForce => self.rank_brute_force(query, gallery, top_k),
            Strategy::TwoStage { n_probe } => self.rank_two_stage(query, gallery, top_k, n_probe),
        }
    }

    /// Matches and verifies a single pair.
    pub fn score_pair(&self, query: &FeatureSet, candidate: &FeatureSet) -> PairScore {
        let correspondences = self.match_pair(query, candidate);
        let verification = self.verify_pair(query, candidate, &correspondences);
        PairScore {
            correspondences,
            verification,
        }
    }

    /// Full verification of every gallery entry, ranked by inlier count.
    pub fn rank_brute_force(
        &self,
        query: &FeatureSet,
        gallery: &[FeatureSet],
        top_k: usize,
    ) -> Vec<RankedResult> {
        let candidates = candidates(query, gallery);
        let mut results = self.map_ordered(&candidates, |&candidate| RankedResult {
            image_id: candidate.id().to_string(),
            score: self.score_pair(query, candidate).inliers(),
        });

        results.sort_by_key(|r| Reverse(r.score));
        results.truncate(top_k);
        tracing::debug!(
            query = query.id(),
            gallery = candidates.len(),
            returned = results.len(),
            "brute-force ranking done"
        );
        results
    }

    /// Shortlists by correspondence count, then verifies only the shortlist,
    /// reusing the correspondences from the coarse phase.
    pub fn rank_two_stage(
        &self,
        query: &FeatureSet,
        gallery: &[FeatureSet],
        top_k: usize,
        n_probe: usize,
    ) -> Vec<RankedResult> {
        let candidates = candidates(query, gallery);

        // Coarse: stable on ties, so gallery order survives.
        let mut shortlist = self.map_ordered(&candidates, |&candidate| CoarseHit {
            candidate,
            correspondences: self.match_pair(query, candidate),
        });
        shortlist.sort_by_key(|hit| Reverse(hit.correspondences.len()));
        shortlist.truncate(n_probe);

        // Refine: stable on ties, so shortlist order survives.
        let mut results = self.map_ordered(&shortlist, |hit| RankedResult {
            image_id: hit.candidate.id().to_string(),
            score: self
                .verify_pair(query, hit.candidate, &hit.correspondences)
                .inlier_count,
        });
        results.sort_by_key(|r| Reverse(r.score));
        results.truncate(top_k);

        tracing::debug!(
            query = query.id(),
            gallery = candidates.len(),
            shortlisted = shortlist.len(),
            returned = results.len(),
            "two-stage ranking done"
        );
        results
    }

    fn match_pair(&self, query: &FeatureSet, candidate: &FeatureSet) -> Correspondences {
        self.matcher
            .correspondences(query, candidate)
            .unwrap_or_else(|err| {
                tracing::warn!(
                    query = query.id(),
                    candidate = candidate.id(),
                    "matching failed, scoring 0: {err}"
                );
                Correspondences::new()
            })
    }

    fn verify_pair(
        &self,
        query: &FeatureSet,
        candidate: &FeatureSet,
        correspondences: &Correspondences,
    ) -> VerificationResult {
        self.verifier
            .verify(query, candidate, correspondences)
            .unwrap_or_else(|err| {
                tracing::warn!(
                    query = query.id(),
                    candidate = candidate.id(),
                    "verification failed, scoring 0: {err}"
                );
                VerificationResult::not_attempted()
            })
    }

    /// Maps `items` preserving input order, on the rayon pool when enabled.
    fn map_ordered<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        if !self.parallel {
            return items.iter().map(f).collect();
        }
        match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            None => items.par_iter().map(f).collect(),
        }
    }
}

/// Gallery entries other than the query itself, in gallery order.
fn candidates<'g>(query: &FeatureSet, gallery: &'g [FeatureSet]) -> Vec<&'g FeatureSet> {
    gallery.iter().filter(|g| g.id() != query.id()).collect()
}
