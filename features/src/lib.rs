pub mod matcher;
pub mod ransac;

pub use matcher::*;
pub use ransac::*;

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Descriptor error: {0}")]
    DescriptorError(#[from] cv_core::Error),

    #[error("Matching error: {0}")]
    MatchingError(String),

    #[error("Verification error: {0}")]
    VerificationError(String),
}
