//! On-disk feature sets: one `<image stem>.json` file per image.
//!
//! ```json
//! { "pts": [[12.5, 40.0], ...], "des": [[17, 250, ...], ...] }
//! ```
//!
//! `pts` and `des` are parallel arrays. A missing `des` is read as an empty
//! descriptor list, so a file with points but no descriptors fails the shape
//! check instead of being silently accepted.

use crate::{Result, SearchError};
use cv_core::{Descriptors, FeatureSet};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const FEATURE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct FeatureRecord {
    #[serde(default)]
    pts: Vec<[f64; 2]>,
    #[serde(default)]
    des: Vec<Vec<u8>>,
}

/// A gallery entry that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub id: String,
    pub reason: String,
}

/// Gallery snapshot for one run, in identifier order.
#[derive(Debug, Default)]
pub struct Gallery {
    pub entries: Vec<FeatureSet>,
    pub skipped: Vec<SkippedEntry>,
}

impl Gallery {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureStore {
    root: PathBuf,
    descriptor_bytes: Option<usize>,
}

impl FeatureStore {
    /// Opens an existing feature directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|source| SearchError::Io {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(SearchError::Io {
                path: root,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        Ok(Self {
            root,
            descriptor_bytes: None,
        })
    }

    /// Opens `root`, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| SearchError::Io {
            path: root.clone(),
            source,
        })?;
        Self::open(root)
    }

    /// Reject feature files whose descriptors are not `bytes` wide.
    pub fn with_descriptor_bytes(mut self, bytes: usize) -> Self {
        self.descriptor_bytes = Some(bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{FEATURE_EXTENSION}"))
    }

    /// Identifiers of all stored feature sets, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let io_err = |source| SearchError::Io {
            path: self.root.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FEATURE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn save(&self, features: &FeatureSet) -> Result<PathBuf> {
        let record = FeatureRecord {
            pts: features.points().iter().map(|p| [p.x, p.y]).collect(),
            des: features
                .descriptors()
                .iter()
                .map(|d| d.data.clone())
                .collect(),
        };
        let path = self.path_for(features.id());
        let json = serde_json::to_string(&record)?;
        fs::write(&path, json).map_err(|source| SearchError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<FeatureSet> {
        self.load_path(&self.path_for(id))
    }

    /// Loads a feature file; the identifier is the file stem.
    pub fn load_path(&self, path: &Path) -> Result<FeatureSet> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let raw = fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record: FeatureRecord =
            serde_json::from_str(&raw).map_err(|source| SearchError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let points = record.pts.iter().map(|&[x, y]| Point2::new(x, y)).collect();
        let descriptors = Descriptors::from(record.des);
        if let Some(bytes) = self.descriptor_bytes {
            descriptors.check_width(bytes)?;
        }
        Ok(FeatureSet::new(id, points, descriptors)?)
    }

    /// Loads every stored feature set except `exclude`.
    ///
    /// Unreadable or malformed entries are logged and listed in
    /// [`Gallery::skipped`]; only an unreadable directory is an error.
    pub fn load_gallery(&self, exclude: Option<&str>) -> Result<Gallery> {
        let mut gallery = Gallery::default();
        for id in self.ids()? {
            if exclude == Some(id.as_str()) {
                continue;
            }
            match self.load(&id) {
                Ok(features) => gallery.entries.push(features),
                Err(err) => {
                    tracing::warn!(id = %id, "skipping gallery entry: {err}");
                    gallery.skipped.push(SkippedEntry {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            root = %self.root.display(),
            loaded = gallery.entries.len(),
            skipped = gallery.skipped.len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    /// Maps a query to its feature file: a `.json` path is used as is,
    /// anything else (e.g. an image path) resolves to `<root>/<stem>.json`.
    pub fn resolve_query(&self, query: &Path) -> PathBuf {
        if query.extension().and_then(|e| e.to_str()) == Some(FEATURE_EXTENSION) {
            return query.to_path_buf();
        }
        let stem = query
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        self.path_for(stem)
    }

    /// Loads the query's features. Failure here is fatal for the run.
    pub fn load_query(&self, query: &Path) -> Result<FeatureSet> {
        let path = self.resolve_query(query);
        self.load_path(&path)
            .map_err(|source| SearchError::QueryUnavailable {
                path,
                source: Box::new(source),
            })
    }
}
