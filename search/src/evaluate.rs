//! Precision@K against a ground-truth listing.
//!
//! Ground truth is a CSV of `query_filename,gt_filename` rows. Results are
//! compared by file stem, never by full path, since the ranker reports image
//! identifiers.

use crate::ranker::{MatchStage, RankedResult, SearchEngine, VerifyStage};
use crate::store::FeatureStore;
use crate::{Result, SearchError};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruthEntry {
    pub query: PathBuf,
    /// Stem of the expected gallery image.
    pub expected: String,
}

#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    entries: Vec<GroundTruthEntry>,
}

impl GroundTruth {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses CSV rows; blank lines and a `query_filename,...` header are
    /// skipped, extra columns ignored. A repeated query keeps its first
    /// position but takes the last expected image.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries: Vec<GroundTruthEntry> = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| SearchError::GroundTruth {
                line: line_no,
                message: e.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let (Some(query), Some(expected)) = (fields.next(), fields.next()) else {
                return Err(SearchError::GroundTruth {
                    line: line_no,
                    message: format!("expected `query,ground_truth`, got '{line}'"),
                });
            };
            if entries.is_empty() && query.eq_ignore_ascii_case("query_filename") {
                continue;
            }
            if query.is_empty() || expected.is_empty() {
                return Err(SearchError::GroundTruth {
                    line: line_no,
                    message: "empty field".to_string(),
                });
            }

            let entry = GroundTruthEntry {
                query: PathBuf::from(query),
                expected: file_stem(expected),
            };
            match entries.iter_mut().find(|e| e.query == entry.query) {
                Some(existing) => existing.expected = entry.expected,
                None => entries.push(entry),
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroundTruthEntry> {
        self.entries.iter()
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

/// Whether `expected_id` appears in an already ranked and truncated list.
pub fn is_hit(results: &[RankedResult], expected_id: &str) -> bool {
    results.iter().any(|r| r.image_id == expected_id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub top_k: usize,
    pub total: usize,
    pub hits: usize,
    /// Queries whose features could not be loaded; counted as misses.
    pub failed_queries: Vec<PathBuf>,
}

impl EvaluationReport {
    pub fn precision(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Precision@{}: {}/{} = {:.3}",
            self.top_k,
            self.hits,
            self.total,
            self.precision()
        )
    }
}

/// Runs every ground-truth query against the store's gallery with the
/// engine's strategy and result count.
///
/// The gallery is loaded once; each query is excluded from its own ranking.
pub fn evaluate<M: MatchStage, V: VerifyStage>(
    engine: &SearchEngine<M, V>,
    store: &FeatureStore,
    ground_truth: &GroundTruth,
) -> Result<EvaluationReport> {
    let gallery = store.load_gallery(None)?;
    tracing::debug!(
        queries = ground_truth.len(),
        gallery = gallery.len(),
        strategy = ?engine.strategy(),
        "evaluating"
    );
    let mut report = EvaluationReport {
        top_k: engine.top_k(),
        total: 0,
        hits: 0,
        failed_queries: Vec::new(),
    };

    for entry in ground_truth.iter() {
        report.total += 1;
        let query = match store.load_query(&entry.query) {
            Ok(query) => query,
            Err(err) => {
                tracing::warn!("counting query as a miss: {err}");
                report.failed_queries.push(entry.query.clone());
                continue;
            }
        };

        let results = engine.search(&query, &gallery.entries);
        if is_hit(&results, &entry.expected) {
            report.hits += 1;
        }
    }

    tracing::info!(
        hits = report.hits,
        total = report.total,
        failed = report.failed_queries.len(),
        "{report}"
    );
    Ok(report)
}
