//! Seeded synthetic feature sets for tests and benchmarks.
//!
//! A [`SyntheticScene`] produces a query and planar "views" of it: a subset
//! of the query keypoints warped by a random homography, with a few flipped
//! descriptor bits and sub-pixel jitter, mixed with unrelated keypoints.

use cv_core::{Descriptor, FeatureSet};
use nalgebra::{Matrix3, Point2, Vector3};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const FLIPPED_BITS: usize = 8;

fn random_descriptor(rng: &mut StdRng, bytes: usize) -> Descriptor {
    Descriptor::new((0..bytes).map(|_| rng.gen()).collect())
}

fn random_point(rng: &mut StdRng) -> Point2<f64> {
    Point2::new(rng.gen_range(0.0..WIDTH), rng.gen_range(0.0..HEIGHT))
}

/// Feature set with `n` uniformly random keypoints and descriptors.
pub fn random_feature_set(id: impl Into<String>, n: usize, bytes: usize, seed: u64) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let keypoints: Vec<_> = (0..n)
        .map(|_| (random_point(&mut rng), random_descriptor(&mut rng, bytes)))
        .collect();
    FeatureSet::from_keypoints(id, keypoints)
}

pub struct SyntheticScene {
    seed: u64,
    descriptor_bytes: usize,
}

impl SyntheticScene {
    pub fn new(seed: u64, descriptor_bytes: usize) -> Self {
        Self {
            seed,
            descriptor_bytes,
        }
    }

    fn rng_for(&self, id: &str) -> StdRng {
        // FNV-1a over the id keeps views with different ids independent.
        let hash = id.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
        StdRng::seed_from_u64(self.seed ^ hash)
    }

    pub fn query(&self, id: &str, n: usize) -> FeatureSet {
        random_feature_set(id, n, self.descriptor_bytes, self.seed)
    }

    /// A view sharing `keep` keypoints with `query`, plus `distractors` unrelated ones.
    pub fn view(
        &self,
        query: &FeatureSet,
        id: &str,
        keep: usize,
        distractors: usize,
    ) -> FeatureSet {
        let mut rng = self.rng_for(id);
        let h = random_homography(&mut rng);
        let keep = keep.min(query.len());

        let mut keypoints = Vec::with_capacity(keep + distractors);
        for i in index::sample(&mut rng, query.len(), keep) {
            let p = warp(&h, &query.points()[i]);
            let jitter = (rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5));
            let point = Point2::new(p.x + jitter.0, p.y + jitter.1);

            let mut data = query.descriptors().descriptors[i].data.clone();
            let bits = data.len() * 8;
            for bit in index::sample(&mut rng, bits, FLIPPED_BITS.min(bits)) {
                data[bit / 8] ^= 1 << (bit % 8);
            }
            keypoints.push((point, Descriptor::new(data)));
        }
        for _ in 0..distractors {
            let point = random_point(&mut rng);
            keypoints.push((point, random_descriptor(&mut rng, self.descriptor_bytes)));
        }

        keypoints.shuffle(&mut rng);
        FeatureSet::from_keypoints(id, keypoints)
    }

    /// `n` gallery entries alternating true views (growing overlap) and
    /// unrelated images, named `g00`, `g01`, ...
    pub fn gallery(&self, query: &FeatureSet, n: usize) -> Vec<FeatureSet> {
        let distractors = query.len() / 4;
        (0..n)
            .map(|i| {
                let id = format!("g{i:02}");
                if i % 2 == 0 {
                    let keep = query.len() * (i + 1) / (n + 1);
                    self.view(query, &id, keep, distractors)
                } else {
                    let mut rng = self.rng_for(&id);
                    random_feature_set(id, query.len(), self.descriptor_bytes, rng.gen())
                }
            })
            .collect()
    }
}

fn random_homography(rng: &mut StdRng) -> Matrix3<f64> {
    Matrix3::new(
        1.0 + rng.gen_range(-0.1..0.1),
        rng.gen_range(-0.1..0.1),
        rng.gen_range(-40.0..40.0),
        rng.gen_range(-0.1..0.1),
        1.0 + rng.gen_range(-0.1..0.1),
        rng.gen_range(-40.0..40.0),
        rng.gen_range(-1e-4..1e-4),
        rng.gen_range(-1e-4..1e-4),
        1.0,
    )
}

fn warp(h: &Matrix3<f64>, p: &Point2<f64>) -> Point2<f64> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v[0] / v[2], v[1] / v[2])
}
