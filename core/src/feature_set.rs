use crate::{Descriptor, Descriptors, Error, Result};
use nalgebra::Point2;

/// Keypoint locations and their binary descriptors for one image.
///
/// `points[i]` and `descriptors[i]` describe the same keypoint. The set is
/// immutable once built; an empty set is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    id: String,
    points: Vec<Point2<f64>>,
    descriptors: Descriptors,
}

impl FeatureSet {
    pub fn new(
        id: impl Into<String>,
        points: Vec<Point2<f64>>,
        descriptors: Descriptors,
    ) -> Result<Self> {
        if points.len() != descriptors.len() {
            return Err(Error::ShapeMismatch {
                points: points.len(),
                descriptors: descriptors.len(),
            });
        }
        Ok(Self {
            id: id.into(),
            points,
            descriptors,
        })
    }

    /// Builds a set from `(point, descriptor)` pairs, so lengths always agree.
    pub fn from_keypoints(
        id: impl Into<String>,
        keypoints: impl IntoIterator<Item = (Point2<f64>, Descriptor)>,
    ) -> Self {
        let (points, descriptors): (Vec<_>, Vec<_>) = keypoints.into_iter().unzip();
        Self {
            id: id.into(),
            points,
            descriptors: Descriptors { descriptors },
        }
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points: Vec::new(),
            descriptors: Descriptors::new(),
        }
    }

    /// Image identifier (file stem shared by artifacts and ground truth).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_lengths() {
        let points = vec![Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)];
        let descriptors = Descriptors::from(vec![vec![0u8; 32]]);
        let err = FeatureSet::new("img", points, descriptors).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                points: 2,
                descriptors: 1
            }
        ));
    }

    #[test]
    fn empty_set_is_valid() {
        let fs = FeatureSet::empty("blank");
        assert_eq!(fs.id(), "blank");
        assert!(fs.is_empty());
        assert!(fs.descriptors().is_empty());
    }

    #[test]
    fn from_keypoints_keeps_pairs_aligned() {
        let fs = FeatureSet::from_keypoints(
            "kp",
            vec![
                (Point2::new(1.0, 1.0), Descriptor::new(vec![7u8; 4])),
                (Point2::new(2.0, 2.0), Descriptor::new(vec![9u8; 4])),
            ],
        );
        assert_eq!(fs.len(), 2);
        assert_eq!(fs.descriptors().len(), 2);
        assert_eq!(fs.points()[1], Point2::new(2.0, 2.0));
        assert_eq!(fs.descriptors().get(1).unwrap().data, vec![9u8; 4]);
    }

    #[test]
    fn accessors_preserve_order() {
        let points = vec![Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)];
        let descriptors = Descriptors::from(vec![vec![1u8; 4], vec![2u8; 4]]);
        let fs = FeatureSet::new("0001", points.clone(), descriptors).unwrap();
        assert_eq!(fs.len(), 2);
        assert_eq!(fs.points(), &points[..]);
        assert_eq!(fs.descriptors().get(1).unwrap().data, vec![2u8; 4]);
    }
}
