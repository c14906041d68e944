//! Resumable progress.
//!
//! The checkpoint artifact is an ordinary record file in the output's format
//! holding every record merged so far. It defaults to the output path itself,
//! so a finished output doubles as a complete checkpoint. Every write goes to
//! `<path>.tmp` first and is renamed into place, so the artifact on disk
//! always reflects whole batches.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::dataset::{self, DatasetError, DatasetFormat, IdentifierColumn};
use crate::enrichment::{
    EnrichedRecord, EnrichmentManifest, FailureReason, Outcome, Record, RecordKey,
};

/// Records already merged, by key.
#[derive(Debug, Default)]
pub struct Checkpoint {
    pub processed: HashSet<RecordKey>,
    pub records: Vec<EnrichedRecord>,
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.processed.contains(key)
    }

    /// Add records whose key is not present yet. Returns how many were added.
    fn extend(&mut self, records: &[EnrichedRecord]) -> usize {
        let mut added = 0;
        for record in records {
            if self.processed.insert(record.key.clone()) {
                self.records.push(record.clone());
                added += 1;
            }
        }
        added
    }
}

/// Owns the checkpoint artifact and the final output artifact.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    format: DatasetFormat,
    output: PathBuf,
    state: Checkpoint,
}

impl CheckpointStore {
    /// A store writing progress to `path` and the finished run to `output`.
    ///
    /// Both must use the same format: resumed records are copied into the
    /// output as read, and a CSV checkpoint would turn JSON numbers into text.
    pub fn new(path: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let output = output.into();
        let format = DatasetFormat::from_path(&path)?;
        let output_format = DatasetFormat::from_path(&output)?;
        if format != output_format {
            return Err(CheckpointError::FormatMismatch {
                checkpoint: path,
                output,
            });
        }
        Ok(Self {
            format,
            path,
            output,
            state: Checkpoint::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.state
    }

    /// Load the existing checkpoint, if any.
    ///
    /// An unreadable artifact, or one without the identifier column, yields
    /// an empty checkpoint. Resumed records are classified against the input
    /// record with the same key in `sources`: enriched when a core feature
    /// column holds a value the input did not have.
    pub fn load(
        &mut self,
        column: &IdentifierColumn,
        manifest: &EnrichmentManifest,
        sources: &HashMap<RecordKey, &Record>,
    ) -> &Checkpoint {
        self.state = Checkpoint::default();
        if !self.path.exists() {
            return &self.state;
        }

        let loaded = match dataset::read(&self.path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(target: "checkpoint", path = %self.path.display(), error = %e, "Ignoring unreadable checkpoint");
                return &self.state;
            }
        };

        if !loaded.records.is_empty() && !loaded.columns.iter().any(|c| c == column.name()) {
            tracing::warn!(
                target: "checkpoint",
                path = %self.path.display(),
                column = column.name(),
                "Ignoring checkpoint without identifier column"
            );
            return &self.state;
        }

        let keys = column.keys(&loaded.records);
        let records: Vec<EnrichedRecord> = keys
            .into_iter()
            .zip(loaded.records)
            .map(|(key, record)| {
                let outcome = classify(&record, sources.get(&key).copied(), column, manifest);
                EnrichedRecord { key, record, outcome }
            })
            .collect();
        self.state.extend(&records);

        tracing::info!(target: "checkpoint", path = %self.path.display(), records = self.state.len(), "Loaded checkpoint");
        &self.state
    }

    /// Drop checkpointed records whose key is not in `known`. Returns how
    /// many were dropped.
    pub fn retain(&mut self, known: &HashSet<RecordKey>) -> usize {
        let before = self.state.records.len();
        self.state.records.retain(|r| known.contains(&r.key));
        self.state.processed.retain(|k| known.contains(k));
        before - self.state.records.len()
    }

    /// Record newly merged records and rewrite the artifact. Keys already
    /// present are skipped.
    pub fn append(&mut self, records: &[EnrichedRecord]) -> Result<usize, CheckpointError> {
        let added = self.state.extend(records);
        let all: Vec<Record> = self.state.records.iter().map(|r| r.record.clone()).collect();
        write_atomic(&self.path, self.format, &all)?;
        tracing::debug!(target: "checkpoint", added, total = all.len(), "Checkpoint saved");
        Ok(added)
    }

    /// Write the complete output and clean up the checkpoint.
    pub fn finalize(&mut self, records: &[Record]) -> Result<(), CheckpointError> {
        write_atomic(&self.output, self.format, records)?;

        if self.path != self.output {
            remove_if_exists(&self.path)?;
        }
        remove_if_exists(&tmp_path(&self.path))?;
        Ok(())
    }

    /// Remove any existing checkpoint.
    pub fn discard(&mut self) -> Result<(), CheckpointError> {
        self.state = Checkpoint::default();
        if self.path.exists() {
            tracing::info!(target: "checkpoint", path = %self.path.display(), "Discarding existing checkpoint");
        }
        remove_if_exists(&self.path)?;
        remove_if_exists(&tmp_path(&self.path))
    }
}

fn classify(
    record: &Record,
    source: Option<&Record>,
    column: &IdentifierColumn,
    manifest: &EnrichmentManifest,
) -> Outcome {
    let enriched = match source {
        Some(source) => manifest.adds_features(record, source),
        None => manifest.is_enriched(record),
    };
    if enriched {
        Outcome::Enriched
    } else if column.track_id(record).is_err() {
        Outcome::Failed(FailureReason::MalformedIdentifier)
    } else {
        Outcome::Failed(FailureReason::NoData)
    }
}

/// `<path>.tmp`
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, format: DatasetFormat, records: &[Record]) -> Result<(), CheckpointError> {
    let tmp = tmp_path(path);
    if let Err(e) = dataset::write_as(&tmp, format, records) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    std::fs::rename(&tmp, path).map_err(|source| CheckpointError::Rename {
        from: tmp,
        to: path.to_path_buf(),
        source,
    })
}

fn remove_if_exists(path: &Path) -> Result<(), CheckpointError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CheckpointError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Checkpoint and output write errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint {checkpoint} and output {output} must use the same format")]
    FormatMismatch { checkpoint: PathBuf, output: PathBuf },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
