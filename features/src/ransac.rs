//! RANSAC (Random Sample Consensus) for geometric verification
//!
//! Estimates a planar homography from putative correspondences and reports
//! how many of them agree with it. The inlier count is the similarity score
//! used for ranking.

use crate::{FeatureError, Result};
use cv_core::{Correspondences, Ransac, RobustConfig, RobustModel, Sampling};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

pub type RansacConfig = RobustConfig;
pub use cv_core::RobustResult as RansacResult;

/// Minimum correspondences for a homography (4 points × 2 constraints).
pub const MIN_CORRESPONDENCES: usize = 4;

pub const DEFAULT_REPROJ_THRESHOLD: f64 = 5.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 2000;
pub const DEFAULT_CONFIDENCE: f64 = 0.995;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchPair {
    pub src: Point2<f64>,
    pub dst: Point2<f64>,
}

pub struct HomographyEstimator;

impl RobustModel<MatchPair> for HomographyEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        MIN_CORRESPONDENCES
    }

    fn estimate(&self, data: &[&MatchPair]) -> Option<Self::Model> {
        solve_normalized_dlt(data)
    }

    fn compute_error(&self, model: &Self::Model, data: &MatchPair) -> f64 {
        let p1 = Vector3::new(data.src.x, data.src.y, 1.0);
        let p2_pred = model * p1;
        if p2_pred[2].abs() > 1e-10 {
            let x2_pred = p2_pred[0] / p2_pred[2];
            let y2_pred = p2_pred[1] / p2_pred[2];
            ((x2_pred - data.dst.x).powi(2) + (y2_pred - data.dst.y).powi(2)).sqrt()
        } else {
            f64::INFINITY
        }
    }

    fn is_degenerate(&self, sample: &[&MatchPair]) -> bool {
        let src: Vec<Point2<f64>> = sample.iter().map(|m| m.src).collect();
        let dst: Vec<Point2<f64>> = sample.iter().map(|m| m.dst).collect();
        has_collinear_triple(&src) || has_collinear_triple(&dst)
    }

    fn refine(&self, _model: &Self::Model, inliers: &[&MatchPair]) -> Option<Self::Model> {
        if inliers.len() <= MIN_CORRESPONDENCES {
            return None;
        }
        solve_normalized_dlt(inliers)
    }
}

/// Outcome of geometric verification for one image pair.
///
/// `inlier_mask` is `None` when no model was estimated: too few
/// correspondences, malformed indices or a degenerate configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub inlier_count: usize,
    pub inlier_mask: Option<Vec<bool>>,
    pub homography: Option<Matrix3<f64>>,
}

impl VerificationResult {
    pub fn not_attempted() -> Self {
        Self {
            inlier_count: 0,
            inlier_mask: None,
            homography: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.inlier_mask.is_some()
    }
}

/// Robust homography verification of descriptor correspondences.
#[derive(Debug, Clone)]
pub struct GeometricVerifier {
    config: RansacConfig,
}

impl GeometricVerifier {
    pub fn new(reproj_threshold: f64) -> Self {
        Self {
            config: RansacConfig {
                threshold: reproj_threshold,
                max_iterations: DEFAULT_MAX_ITERATIONS,
                confidence: DEFAULT_CONFIDENCE,
                sampling: Sampling::Random,
            },
        }
    }

    pub fn with_config(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.config.sampling = sampling;
        self
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Verifies `correspondences` between `src_points` (query) and
    /// `dst_points` (candidate). Failures degrade to a zero score.
    pub fn verify(
        &self,
        src_points: &[Point2<f64>],
        dst_points: &[Point2<f64>],
        correspondences: &Correspondences,
    ) -> VerificationResult {
        match self.try_verify(src_points, dst_points, correspondences) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("geometric verification skipped: {err}");
                VerificationResult::not_attempted()
            }
        }
    }

    pub fn try_verify(
        &self,
        src_points: &[Point2<f64>],
        dst_points: &[Point2<f64>],
        correspondences: &Correspondences,
    ) -> Result<VerificationResult> {
        if correspondences.len() < MIN_CORRESPONDENCES {
            return Ok(VerificationResult::not_attempted());
        }

        let result = estimate_homography(correspondences, src_points, dst_points, &self.config)?;
        let Some(h) = result.model else {
            tracing::debug!(
                correspondences = correspondences.len(),
                iterations = result.iterations,
                "no homography found"
            );
            return Ok(VerificationResult::not_attempted());
        };

        Ok(VerificationResult {
            inlier_count: result.num_inliers,
            inlier_mask: Some(result.inliers),
            homography: Some(h),
        })
    }
}

impl Default for GeometricVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_REPROJ_THRESHOLD)
    }
}

/// Estimate homography using RANSAC
pub fn estimate_homography(
    correspondences: &Correspondences,
    src_points: &[Point2<f64>],
    dst_points: &[Point2<f64>],
    config: &RansacConfig,
) -> Result<RansacResult<Matrix3<f64>>> {
    let data: Vec<MatchPair> = correspondences
        .point_pairs(src_points, dst_points)
        .ok_or_else(|| {
            FeatureError::VerificationError(format!(
                "correspondence index out of range ({} query points, {} train points)",
                src_points.len(),
                dst_points.len()
            ))
        })?
        .into_iter()
        .map(|(src, dst)| MatchPair { src, dst })
        .collect();

    let ransac = Ransac::new(config.clone());
    Ok(ransac.run(&HomographyEstimator, &data))
}

/// Filter correspondences to keep only inliers
pub fn filter_by_mask(correspondences: &Correspondences, inliers: &[bool]) -> Correspondences {
    correspondences
        .iter()
        .zip(inliers)
        .filter(|(_, &keep)| keep)
        .map(|(m, _)| *m)
        .collect()
}

/// Similarity transform moving the centroid to the origin with mean distance √2.
fn normalization_transform(points: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 || !mean_dist.is_finite() {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    ))
}

fn apply(t: &Matrix3<f64>, p: &Point2<f64>) -> (f64, f64) {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    (v[0] / v[2], v[1] / v[2])
}

/// Direct Linear Transform on Hartley-normalised points.
fn solve_normalized_dlt(data: &[&MatchPair]) -> Option<Matrix3<f64>> {
    if data.len() < MIN_CORRESPONDENCES {
        return None;
    }
    let src: Vec<Point2<f64>> = data.iter().map(|m| m.src).collect();
    let dst: Vec<Point2<f64>> = data.iter().map(|m| m.dst).collect();
    let t_src = normalization_transform(&src)?;
    let t_dst = normalization_transform(&dst)?;

    let n_rows = data.len() * 2;
    let mut a = vec![0.0f64; n_rows * 9];
    for (i, (s, d)) in src.iter().zip(&dst).enumerate() {
        let (x1, y1) = apply(&t_src, s);
        let (x2, y2) = apply(&t_dst, d);
        let row1 = i * 2;
        let row2 = i * 2 + 1;

        // [-x1, -y1, -1, 0, 0, 0, x2*x1, x2*y1, x2]
        a[row1 * 9] = -x1;
        a[row1 * 9 + 1] = -y1;
        a[row1 * 9 + 2] = -1.0;
        a[row1 * 9 + 6] = x2 * x1;
        a[row1 * 9 + 7] = x2 * y1;
        a[row1 * 9 + 8] = x2;

        // [0, 0, 0, -x1, -y1, -1, y2*x1, y2*y1, y2]
        a[row2 * 9 + 3] = -x1;
        a[row2 * 9 + 4] = -y1;
        a[row2 * 9 + 5] = -1.0;
        a[row2 * 9 + 6] = y2 * x1;
        a[row2 * 9 + 7] = y2 * y1;
        a[row2 * 9 + 8] = y2;
    }

    let h_norm = solve_dlt(&a, n_rows)?;
    let scale = h_norm.norm();
    if scale < 1e-12 || (h_norm / scale).determinant().abs() < 1e-8 {
        return None;
    }

    let h = t_dst.try_inverse()? * h_norm * t_src;
    let h = if h[(2, 2)].abs() > 1e-12 {
        h / h[(2, 2)]
    } else {
        h
    };
    h.iter().all(|v| v.is_finite()).then_some(h)
}

/// Null vector of the DLT system: right singular vector of the smallest singular value.
fn solve_dlt(a: &[f64], n_rows: usize) -> Option<Matrix3<f64>> {
    let mut matrix = DMatrix::from_row_slice(n_rows, 9, a);

    // If underdetermined, pad with zeros to ensure we get 9 singular vectors
    if n_rows < 9 {
        let mut padded = DMatrix::zeros(9, 9);
        padded.view_mut((0, 0), (n_rows, 9)).copy_from(&matrix);
        matrix = padded;
    }

    let svd = matrix.svd(false, true);
    let smallest = svd.singular_values.imin();
    let v_t = svd.v_t?;
    let h_vec = v_t.row(smallest);

    Some(Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2],
        h_vec[3], h_vec[4], h_vec[5],
        h_vec[6], h_vec[7], h_vec[8],
    ))
}

fn has_collinear_triple(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let ab = points[j] - points[i];
                let ac = points[k] - points[i];
                let cross = ab.x * ac.y - ab.y * ac.x;
                if cross.abs() <= 1e-9 * ab.norm() * ac.norm() {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::Correspondence;
    use nalgebra::Vector2;

    fn project(h: &Matrix3<f64>, p: Point2<f64>) -> Point2<f64> {
        let v = h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    fn known_homography() -> Matrix3<f64> {
        Matrix3::new(
            0.9, -0.1, 12.0,
            0.15, 1.05, -7.0,
            1e-4, -5e-5, 1.0,
        )
    }

    /// `n_inliers` grid points mapped through `h`, then `n_outliers` scrambled pairs.
    fn synthetic(
        h: &Matrix3<f64>,
        n_inliers: usize,
        n_outliers: usize,
    ) -> (Correspondences, Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..n_inliers {
            let p = Point2::new((i % 7) as f64 * 37.0 + 5.0, (i / 7) as f64 * 29.0 + 3.0);
            src.push(p);
            dst.push(project(h, p));
        }
        for i in 0..n_outliers {
            let p = Point2::new(i as f64 * 13.0 + 400.0, (i * i) as f64 * 3.0 + 11.0);
            src.push(p);
            dst.push(Point2::new(900.0 - i as f64 * 41.0, 50.0 + (i % 3) as f64 * 170.0));
        }
        let matches = (0..src.len())
            .map(|i| Correspondence::new(i, i, 0.0))
            .collect();
        (matches, src, dst)
    }

    #[test]
    fn fewer_than_four_correspondences_is_not_attempted() {
        let (matches, src, dst) = synthetic(&Matrix3::identity(), 3, 0);
        let result = GeometricVerifier::default().verify(&src, &dst, &matches);
        assert_eq!(result, VerificationResult::not_attempted());
    }

    #[test]
    fn recovers_known_homography_with_outliers() {
        let h = known_homography();
        let (matches, src, dst) = synthetic(&h, 28, 8);

        let verifier = GeometricVerifier::default().with_sampling(Sampling::Seeded(42));
        let result = verifier.verify(&src, &dst, &matches);

        assert!(result.is_verified());
        assert_eq!(result.inlier_count, 28);
        let mask = result.inlier_mask.as_ref().unwrap();
        assert_eq!(mask.len(), 36);
        assert!(mask[..28].iter().all(|&b| b));
        assert!(mask[28..].iter().all(|&b| !b));

        let estimated = result.homography.unwrap();
        for p in &src[..28] {
            let expected = project(&h, *p);
            let got = project(&estimated, *p);
            assert!((expected - got).norm() < 1e-6);
        }
    }

    #[test]
    fn seeded_verification_is_deterministic() {
        let (matches, src, dst) = synthetic(&known_homography(), 15, 15);
        let verifier = GeometricVerifier::default().with_sampling(Sampling::Seeded(3));
        let a = verifier.verify(&src, &dst, &matches);
        let b = verifier.verify(&src, &dst, &matches);
        assert_eq!(a, b);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let src: Vec<Point2<f64>> = (0..6)
            .map(|i| Point2::new(i as f64 * 10.0, i as f64 * 5.0))
            .collect();
        let dst: Vec<Point2<f64>> = src
            .iter()
            .map(|p| Point2::new(p.x + 10.0, p.y + 5.0))
            .collect();
        let matches: Correspondences = (0..6)
            .map(|i| Correspondence::new(i, i, 0.0))
            .collect();

        let result = GeometricVerifier::default()
            .with_sampling(Sampling::Seeded(1))
            .verify(&src, &dst, &matches);
        assert_eq!(result.inlier_count, 0);
        assert!(!result.is_verified());
    }

    #[test]
    fn out_of_range_indices_are_absorbed() {
        let (mut matches, src, dst) = synthetic(&Matrix3::identity(), 6, 0);
        matches.push(Correspondence::new(0, 99, 0.0));

        let verifier = GeometricVerifier::default();
        assert!(verifier.try_verify(&src, &dst, &matches).is_err());
        assert_eq!(
            verifier.verify(&src, &dst, &matches),
            VerificationResult::not_attempted()
        );
    }

    #[test]
    fn filter_by_mask_keeps_inliers() {
        let matches: Correspondences = (0..4)
            .map(|i| Correspondence::new(i, i, i as f32))
            .collect();
        let kept = filter_by_mask(&matches, &[true, false, true, false]);
        let idx: Vec<usize> = kept.iter().map(|m| m.query_idx).collect();
        assert_eq!(idx, vec![0, 2]);
    }

    /// Always proposes the identity so reprojection errors stay exact.
    struct IdentityProposal;

    impl RobustModel<MatchPair> for IdentityProposal {
        type Model = Matrix3<f64>;

        fn min_sample_size(&self) -> usize {
            MIN_CORRESPONDENCES
        }

        fn estimate(&self, _data: &[&MatchPair]) -> Option<Matrix3<f64>> {
            Some(Matrix3::identity())
        }

        fn compute_error(&self, model: &Matrix3<f64>, data: &MatchPair) -> f64 {
            HomographyEstimator.compute_error(model, data)
        }
    }

    #[test]
    fn error_equal_to_threshold_is_an_outlier() {
        let (_, src, mut dst) = synthetic(&Matrix3::identity(), 12, 0);
        dst[5] += Vector2::new(3.0, 4.0);
        let data: Vec<MatchPair> = src
            .iter()
            .zip(&dst)
            .map(|(&src, &dst)| MatchPair { src, dst })
            .collect();
        assert_eq!(
            HomographyEstimator.compute_error(&Matrix3::identity(), &data[5]),
            5.0
        );

        let config = RansacConfig {
            threshold: 5.0,
            max_iterations: 10,
            confidence: DEFAULT_CONFIDENCE,
            sampling: Sampling::Seeded(0),
        };
        let strict = Ransac::new(config.clone()).run(&IdentityProposal, &data);
        assert_eq!(strict.num_inliers, 11);
        assert!(!strict.inliers[5]);

        let looser = Ransac::new(RansacConfig {
            threshold: 5.0 + 1e-9,
            ..config
        })
        .run(&IdentityProposal, &data);
        assert_eq!(looser.num_inliers, 12);
    }
}
