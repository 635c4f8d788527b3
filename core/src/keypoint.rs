use nalgebra::Point2;

/// An accepted descriptor match between two feature sets.
///
/// `query_idx` indexes the query feature set, `train_idx` the candidate one,
/// `distance` is the Hamming distance of the best neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Correspondence {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Ordered correspondence list, in ascending query index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    pub matches: Vec<Correspondence>,
}

impl Correspondences {
    pub fn new() -> Self {
        Self {
            matches: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            matches: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, m: Correspondence) {
        self.matches.push(m);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> {
        self.matches.iter()
    }

    /// Resolves every correspondence to its `(src, dst)` point pair.
    ///
    /// Returns `None` if any index falls outside the given point slices.
    pub fn point_pairs(
        &self,
        src_points: &[Point2<f64>],
        dst_points: &[Point2<f64>],
    ) -> Option<Vec<(Point2<f64>, Point2<f64>)>> {
        self.matches
            .iter()
            .map(|m| Some((*src_points.get(m.query_idx)?, *dst_points.get(m.train_idx)?)))
            .collect()
    }
}

impl FromIterator<Correspondence> for Correspondences {
    fn from_iter<I: IntoIterator<Item = Correspondence>>(iter: I) -> Self {
        Self {
            matches: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_pairs_follow_indices() {
        let src = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        let dst = vec![Point2::new(5.0, 5.0), Point2::new(6.0, 6.0)];
        let c: Correspondences = vec![Correspondence::new(1, 0, 3.0)].into_iter().collect();

        let pairs = c.point_pairs(&src, &dst).unwrap();
        assert_eq!(pairs, vec![(Point2::new(1.0, 1.0), Point2::new(5.0, 5.0))]);
    }

    #[test]
    fn point_pairs_out_of_range_is_none() {
        let src = vec![Point2::new(0.0, 0.0)];
        let dst = vec![Point2::new(5.0, 5.0)];
        let c: Correspondences = vec![Correspondence::new(0, 3, 0.0)].into_iter().collect();
        assert!(c.point_pairs(&src, &dst).is_none());
    }
}
