//! Exhaustive Hamming matching of binary descriptors with Lowe's ratio test.

use crate::{FeatureError, Result};
use cv_core::{Correspondence, Correspondences, Descriptor, Descriptors};

pub const DEFAULT_RATIO: f32 = 0.75;

/// Byte width of a 256-bit ORB descriptor.
pub const ORB_DESCRIPTOR_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Matcher {
    ratio_threshold: f32,
    descriptor_bytes: Option<usize>,
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO,
            descriptor_bytes: None,
        }
    }

    /// Smaller ratios are stricter. Must lie in (0, 1).
    pub fn with_ratio_test(mut self, threshold: f32) -> Self {
        self.ratio_threshold = threshold;
        self
    }

    /// Require every descriptor to be exactly `bytes` wide. Without it the
    /// query set's width is used as the reference.
    pub fn with_descriptor_bytes(mut self, bytes: usize) -> Self {
        self.descriptor_bytes = Some(bytes);
        self
    }

    pub fn ratio_threshold(&self) -> f32 {
        self.ratio_threshold
    }

    /// Matches `query` against `train`, logging and swallowing any failure.
    pub fn match_descriptors(&self, query: &Descriptors, train: &Descriptors) -> Correspondences {
        match self.try_match(query, train) {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!("descriptor matching failed, treating pair as unmatched: {err}");
                Correspondences::new()
            }
        }
    }

    pub fn try_match(&self, query: &Descriptors, train: &Descriptors) -> Result<Correspondences> {
        let ratio = self.ratio_threshold;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(FeatureError::MatchingError(format!(
                "ratio threshold must lie in (0, 1), got {ratio}"
            )));
        }

        if query.is_empty() || train.is_empty() {
            return Ok(Correspondences::new());
        }

        let width = match self.descriptor_bytes {
            Some(w) => w,
            None => query.descriptors[0].size(),
        };
        query.check_width(width)?;
        train.check_width(width)?;

        let mut matches = Correspondences::with_capacity(query.len());
        for (query_idx, q_desc) in query.iter().enumerate() {
            // Fewer than two neighbours cannot pass the ratio test.
            let Some((train_idx, best, second)) = two_nearest(q_desc, train) else {
                continue;
            };
            if (best as f32) < ratio * second as f32 {
                matches.push(Correspondence::new(query_idx, train_idx, best as f32));
            }
        }

        Ok(matches)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Index and distance of the nearest neighbour plus the second-nearest distance.
///
/// Ties keep the lower train index as the best match.
fn two_nearest(q_desc: &Descriptor, train: &Descriptors) -> Option<(usize, u32, u32)> {
    let mut best_match: Option<(usize, u32)> = None;
    let mut second_best: Option<u32> = None;

    for (train_idx, t_desc) in train.iter().enumerate() {
        let distance = q_desc.hamming_distance(t_desc);

        match best_match {
            None => best_match = Some((train_idx, distance)),
            Some((_, best_dist)) if distance < best_dist => {
                second_best = Some(best_dist);
                best_match = Some((train_idx, distance));
            }
            Some(_) => {
                if second_best.map_or(true, |s| distance < s) {
                    second_best = Some(distance);
                }
            }
        }
    }

    let (train_idx, best) = best_match?;
    Some((train_idx, best, second_best?))
}

/// Brute-force Hamming matching with a ratio test.
pub fn match_descriptors(query: &Descriptors, train: &Descriptors, ratio: f32) -> Correspondences {
    Matcher::new()
        .with_ratio_test(ratio)
        .match_descriptors(query, train)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_descriptors(n: usize, seed: u64) -> Descriptors {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Descriptor::new((0..ORB_DESCRIPTOR_BYTES).map(|_| rng.gen()).collect()))
            .collect()
    }

    /// Copies `src` and flips `bits` low bits of the first bytes.
    fn perturbed(src: &Descriptor, bits: usize) -> Descriptor {
        let mut data = src.data.clone();
        for i in 0..bits {
            data[i / 8] ^= 1 << (i % 8);
        }
        Descriptor::new(data)
    }

    #[test]
    fn empty_inputs_give_no_matches() {
        let some = random_descriptors(5, 1);
        let none = Descriptors::new();
        assert!(match_descriptors(&none, &some, 0.75).is_empty());
        assert!(match_descriptors(&some, &none, 0.75).is_empty());
    }

    #[test]
    fn single_train_descriptor_cannot_pass_ratio_test() {
        let query = random_descriptors(4, 2);
        let train: Descriptors = vec![query.descriptors[0].clone()].into_iter().collect();
        assert!(match_descriptors(&query, &train, 0.75).is_empty());
    }

    #[test]
    fn self_match_accepts_every_unique_descriptor() {
        let set = random_descriptors(50, 3);
        let matches = match_descriptors(&set, &set, 0.75);

        assert_eq!(matches.len(), 50);
        for (i, m) in matches.iter().enumerate() {
            assert_eq!(m.query_idx, i);
            assert_eq!(m.train_idx, i);
            assert_eq!(m.distance, 0.0);
        }
    }

    #[test]
    fn duplicate_neighbours_are_ambiguous() {
        let base = random_descriptors(1, 4);
        let d = base.descriptors[0].clone();
        let train: Descriptors = vec![d.clone(), d.clone()].into_iter().collect();
        assert!(match_descriptors(&base, &train, 0.75).is_empty());
    }

    #[test]
    fn ratio_equal_to_threshold_is_rejected() {
        // Distances 3 and 4: 3 < 0.75 * 4 fails, 3 < 0.8 * 4 passes.
        let query = Descriptors::from(vec![vec![0x00]]);
        let train = Descriptors::from(vec![vec![0x07], vec![0x0F]]);

        assert!(match_descriptors(&query, &train, 0.75).is_empty());
        let looser = match_descriptors(&query, &train, 0.8);
        assert_eq!(looser.len(), 1);
        assert_eq!(looser.matches[0].train_idx, 0);
        assert_eq!(looser.matches[0].distance, 3.0);
    }

    #[test]
    fn output_is_ordered_by_query_index() {
        let train = random_descriptors(20, 5);
        let query: Descriptors = [7usize, 2, 15, 0]
            .iter()
            .map(|&i| perturbed(&train.descriptors[i], 3))
            .collect();

        let matches = match_descriptors(&query, &train, 0.75);
        let pairs: Vec<(usize, usize)> = matches
            .iter()
            .map(|m| (m.query_idx, m.train_idx))
            .collect();
        assert_eq!(pairs, vec![(0, 7), (1, 2), (2, 15), (3, 0)]);
        assert!(matches.iter().all(|m| m.distance == 3.0));
    }

    #[test]
    fn stricter_ratio_never_accepts_more() {
        let train = random_descriptors(60, 6);
        let query: Descriptors = train
            .iter()
            .enumerate()
            .map(|(i, d)| perturbed(d, (i * 7) % 90))
            .collect();

        let ratios = [0.2f32, 0.4, 0.6, 0.75, 0.9, 0.99];
        let counts: Vec<usize> = ratios
            .iter()
            .map(|&r| match_descriptors(&query, &train, r).len())
            .collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{counts:?}");
    }

    #[test]
    fn width_mismatch_is_absorbed() {
        let query = random_descriptors(3, 7);
        let train = Descriptors::from(vec![vec![0u8; 16], vec![1u8; 16]]);

        let matcher = Matcher::new();
        assert!(matches!(
            matcher.try_match(&query, &train),
            Err(FeatureError::DescriptorError(_))
        ));
        assert!(matcher.match_descriptors(&query, &train).is_empty());
    }

    #[test]
    fn configured_width_is_enforced() {
        let set = random_descriptors(3, 8);
        let matcher = Matcher::new().with_descriptor_bytes(64);
        assert!(matcher.try_match(&set, &set).is_err());
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        let set = random_descriptors(10, 9);
        for ratio in [0.0f32, 1.0, 1.5, -0.2, f32::NAN] {
            let matcher = Matcher::new().with_ratio_test(ratio);
            assert!(matches!(
                matcher.try_match(&set, &set),
                Err(FeatureError::MatchingError(_))
            ));
        }
    }
}
