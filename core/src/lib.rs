pub mod descriptor;
pub mod feature_set;
pub mod keypoint;
pub mod robust;
pub mod runtime;

pub use descriptor::*;
pub use feature_set::*;
pub use keypoint::*;
pub use robust::{Ransac, RobustConfig, RobustModel, RobustResult, Sampling};
pub use runtime::{build_thread_pool, init_global_thread_pool};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Shape mismatch: {points} points but {descriptors} descriptors")]
    ShapeMismatch { points: usize, descriptors: usize },

    #[error("Descriptor width mismatch: expected {expected} bytes, found {found} at index {index}")]
    DescriptorWidth {
        expected: usize,
        found: usize,
        index: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
