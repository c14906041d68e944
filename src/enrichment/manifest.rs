//! Declarative enrichment field manifest.
//!
//! A manifest maps fields of remote payloads to output columns. Sources are
//! either a top-level key (`energy`) or a JSON pointer (`/sections/0/tempo`).
//! A trailing `#` turns the source into the length of the array found there
//! (`bars#`), which is how the analysis aggregates are expressed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{Features, Record};
use crate::dataset::cell_text;

/// One remote field and the output column it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub column: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            column: column.into(),
        }
    }

    /// Resolve this mapping against a payload. Missing values become `null`,
    /// missing arrays count as empty.
    pub fn resolve(&self, payload: &Value) -> Value {
        let (path, count) = match self.source.strip_suffix('#') {
            Some(path) => (path, true),
            None => (self.source.as_str(), false),
        };

        let found = if path.starts_with('/') {
            payload.pointer(path)
        } else {
            payload.get(path)
        };

        match (found, count) {
            (Some(Value::Array(items)), true) => Value::from(items.len()),
            (None, true) => Value::from(0),
            (Some(_), true) => Value::Null,
            (Some(value), false) => value.clone(),
            (None, false) => Value::Null,
        }
    }
}

/// The full set of enrichment fields for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentManifest {
    pub features: Vec<FieldMapping>,
    pub analysis: Vec<FieldMapping>,
}

impl Default for EnrichmentManifest {
    fn default() -> Self {
        Self {
            features: default_feature_fields(),
            analysis: default_analysis_fields(),
        }
    }
}

impl EnrichmentManifest {
    /// Project a batch-features entry into feature columns.
    pub fn project_features(&self, payload: &Value) -> Features {
        project(&self.features, payload)
    }

    /// Project an analysis object into analysis columns.
    pub fn project_analysis(&self, payload: &Value) -> Features {
        project(&self.analysis, payload)
    }

    /// Whether a record carries any non-empty core feature column.
    ///
    /// Input columns that share a name with a feature column (`duration_ms`)
    /// count too. Prefer [`Self::adds_features`] when the input record is at
    /// hand.
    pub fn is_enriched(&self, record: &Record) -> bool {
        self.features
            .iter()
            .any(|f| record.get(&f.column).is_some_and(is_present))
    }

    /// Whether `record` holds a core feature value that `source`, the input
    /// record it was merged from, did not already carry.
    ///
    /// Used to classify records read back from a checkpoint or output file,
    /// where the in-memory outcome is no longer available.
    pub fn adds_features(&self, record: &Record, source: &Record) -> bool {
        self.features.iter().any(|f| {
            record.get(&f.column).is_some_and(|value| {
                is_present(value) && source.get(&f.column).is_none_or(|before| !same_cell(before, value))
            })
        })
    }

    /// Output columns, core features first.
    pub fn columns(&self, include_analysis: bool) -> Vec<&str> {
        let analysis = if include_analysis {
            self.analysis.as_slice()
        } else {
            &[]
        };
        self.features
            .iter()
            .chain(analysis)
            .map(|f| f.column.as_str())
            .collect()
    }
}

fn project(fields: &[FieldMapping], payload: &Value) -> Features {
    fields
        .iter()
        .map(|f| (f.column.clone(), f.resolve(payload)))
        .collect()
}

/// A cell counts as present unless it is null or an empty string.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Cells compare by their rendered text, so `200000` read from CSV equals
/// `200000` read from JSON.
fn same_cell(a: &Value, b: &Value) -> bool {
    cell_text(a).trim() == cell_text(b).trim()
}

/// The 13 core audio attributes.
pub fn default_feature_fields() -> Vec<FieldMapping> {
    let prefixed = [
        "acousticness",
        "danceability",
        "energy",
        "instrumentalness",
        "liveness",
        "loudness",
        "speechiness",
        "tempo",
        "valence",
        "key",
        "mode",
        "time_signature",
    ];
    prefixed
        .iter()
        .map(|name| FieldMapping::new(*name, format!("enhanced_{name}")))
        .chain(std::iter::once(FieldMapping::new("duration_ms", "duration_ms")))
        .collect()
}

/// Aggregates of the secondary per-track analysis.
pub fn default_analysis_fields() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("bars#", "bars_count"),
        FieldMapping::new("beats#", "beats_count"),
        FieldMapping::new("sections#", "sections_count"),
        FieldMapping::new("segments#", "segments_count"),
        FieldMapping::new("tatums#", "tatums_count"),
        FieldMapping::new("/sections/0/tempo", "first_section_tempo"),
        FieldMapping::new("/sections/0/loudness", "first_section_loudness"),
        FieldMapping::new("/sections/0/key", "first_section_key"),
        FieldMapping::new("/sections/0/mode", "first_section_mode"),
    ]
}
