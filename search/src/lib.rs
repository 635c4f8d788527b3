//! Gallery ranking on top of descriptor matching and homography verification.
//!
//! Feature sets are loaded once per run ([`store`]), the [`ranker`] scores
//! every gallery entry against the query, and [`evaluate`] measures
//! precision@K against a ground-truth listing.

pub mod config;
pub mod evaluate;
pub mod ranker;
pub mod store;
pub mod synthetic;

pub use config::{RansacSettings, SearchConfig};
pub use evaluate::{evaluate, EvaluationReport, GroundTruth};
pub use ranker::{MatchStage, PairScore, RankedResult, SearchEngine, Strategy, VerifyStage};
pub use store::{FeatureStore, Gallery, SkippedEntry};

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed feature file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid feature set: {0}")]
    Core(#[from] cv_core::Error),

    #[error("Query features unavailable ({path}): {source}")]
    QueryUnavailable {
        path: PathBuf,
        source: Box<SearchError>,
    },

    #[error("Ground truth line {line}: {message}")]
    GroundTruth { line: usize, message: String },
}
