use crate::enrichment::{IdentifierError, Record, RecordKey, TrackId};

use super::{DatasetError, cell_text};

/// The column holding each record's track identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierColumn {
    name: String,
}

impl IdentifierColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Pick the first candidate present among `columns`.
    pub fn resolve(columns: &[String], candidates: &[String]) -> Result<Self, DatasetError> {
        candidates
            .iter()
            .find(|c| columns.contains(c))
            .map(Self::new)
            .ok_or_else(|| DatasetError::MissingIdentifierColumn {
                candidates: candidates.to_vec(),
            })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw identifier cell, empty when the field is absent.
    pub fn cell(&self, record: &Record) -> String {
        record.get(&self.name).map(cell_text).unwrap_or_default()
    }

    pub fn track_id(&self, record: &Record) -> Result<TrackId, IdentifierError> {
        TrackId::extract(&self.cell(record))
    }

    /// Checkpoint keys for `records`, in order.
    pub fn keys(&self, records: &[Record]) -> Vec<RecordKey> {
        RecordKey::assign(records.iter().map(|r| self.cell(r)))
    }
}
