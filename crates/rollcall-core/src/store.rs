//! Persistent label store.
//!
//! Every enrolled sample is kept as one `(name, feature vector)` entry in a
//! single JSON document, so the pairing between vectors and names is part of
//! the data structure rather than a positional convention between two files.
//! Updates take an exclusive lock, rewrite the document to a temporary file
//! and rename it into place: a reader sees either the old or the new store.

use crate::acquisition::Enrollment;
use crate::lock::FileLock;
use crate::types::{LabeledSample, CROP_CHANNELS, CROP_HEIGHT, CROP_WIDTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const STORE_FILE: &str = "faces.json";
const LOCK_FILE: &str = "faces.lock";
const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no enrolled faces at {0} — run `rollcall enroll` first")]
    NotFound(String),
    #[error("label store {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("feature length mismatch: store holds {expected}-value vectors, batch has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The in-memory contents of the label store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub samples: Vec<LabeledSample>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            width: CROP_WIDTH,
            height: CROP_HEIGHT,
            channels: CROP_CHANNELS,
            samples: Vec::new(),
        }
    }
}

impl LabelSet {
    /// Length every stored feature vector must have.
    pub fn feature_len(&self) -> usize {
        (self.width * self.height * self.channels) as usize
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per name, in order of first enrollment.
    pub fn summary(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for sample in &self.samples {
            match counts.iter_mut().find(|(name, _)| *name == sample.name) {
                Some((_, n)) => *n += 1,
                None => counts.push((sample.name.clone(), 1)),
            }
        }
        counts
    }

    /// Append a batch after the existing rows, in capture order.
    pub fn append(&mut self, enrollment: Enrollment) -> Result<usize, StoreError> {
        let expected = self.feature_len();
        if let Some(bad) = enrollment.samples().iter().find(|v| v.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        let added = enrollment.len();
        self.samples.extend(enrollment.into_labeled());
        Ok(added)
    }

    fn validate(&self, path: &Path) -> Result<(), StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.display().to_string(),
            reason,
        };
        if self.version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", self.version)));
        }
        let expected = self.feature_len();
        if expected == 0 {
            return Err(corrupt("zero-sized crop geometry".into()));
        }
        for (i, sample) in self.samples.iter().enumerate() {
            if sample.features.len() != expected {
                return Err(corrupt(format!(
                    "row {i} has {} values, expected {expected}",
                    sample.features.len()
                )));
            }
            if sample.name.is_empty() {
                return Err(corrupt(format!("row {i} has an empty name")));
            }
        }
        Ok(())
    }
}

/// Result of merging one enrollment into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub total: usize,
}

/// Handle to the label store directory.
pub struct LabelStore {
    dir: PathBuf,
}

impl LabelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the store document.
    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the store; a missing store is an error.
    ///
    /// Used by recognition sessions, which cannot run without enrollments.
    pub fn load(&self) -> Result<LabelSet, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        self.read(&path)
    }

    /// Load the store, treating a missing store as empty.
    ///
    /// A store that exists but cannot be parsed is still an error: prior
    /// enrollments are never silently discarded.
    pub fn load_or_empty(&self) -> Result<LabelSet, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(LabelSet::default());
        }
        self.read(&path)
    }

    /// Append a finished enrollment to the store and persist it.
    pub fn merge(&self, enrollment: Enrollment) -> Result<MergeSummary, StoreError> {
        let name = enrollment.name().to_string();
        let (added, total) = self.update(|set| {
            let added = set.append(enrollment)?;
            Ok((added, set.len()))
        })?;
        tracing::info!(name = %name, added, total, "label store updated");
        Ok(MergeSummary { added, total })
    }

    /// Drop every sample enrolled under `name`. Returns the number removed.
    pub fn remove(&self, name: &str) -> Result<usize, StoreError> {
        if !self.exists() {
            return Ok(0);
        }
        let removed = self.update(|set| {
            let before = set.len();
            set.samples.retain(|s| s.name != name);
            Ok(before - set.len())
        })?;
        tracing::info!(name, removed, "samples removed from label store");
        Ok(removed)
    }

    /// Locked read-modify-write of the store document.
    fn update<T>(
        &self,
        apply: impl FnOnce(&mut LabelSet) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let _lock = FileLock::open(&self.dir.join(LOCK_FILE))?;

        let mut set = self.load_or_empty()?;
        let out = apply(&mut set)?;
        self.write(&set)?;
        Ok(out)
    }

    fn read(&self, path: &Path) -> Result<LabelSet, StoreError> {
        let file = fs::File::open(path)?;
        let set: LabelSet = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        set.validate(path)?;
        tracing::debug!(path = %path.display(), samples = set.len(), "label store loaded");
        Ok(set)
    }

    fn write(&self, set: &LabelSet) -> Result<(), StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, set)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(self.path()).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}
