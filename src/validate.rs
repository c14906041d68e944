//! Inspect an enriched file and report how much of it carries features.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::dataset::{self, Dataset, DatasetError, IdentifierColumn};
use crate::enrichment::manifest::is_present;
use crate::enrichment::{EnrichmentManifest, Record, RecordKey};

/// Fill level of one manifest column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCoverage {
    pub column: String,
    pub present: bool,
    /// Rows with a non-empty value
    pub filled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    /// Rows where a core feature column holds a value. Without a source
    /// file, input columns that share a feature name count as well.
    pub enriched_rows: usize,
    pub enhancement_rate: f64,
    pub features: Vec<ColumnCoverage>,
    /// Analysis columns found in the file; absent ones are omitted
    pub analysis: Vec<ColumnCoverage>,
}

impl ValidationReport {
    pub fn missing_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|c| !c.present)
            .map(|c| c.column.as_str())
    }
}

/// Read `path` and measure manifest column coverage.
pub fn validate(path: &Path, manifest: &EnrichmentManifest) -> Result<ValidationReport, DatasetError> {
    let dataset = dataset::read(path)?;
    let enriched: Vec<bool> = dataset.records.iter().map(|r| manifest.is_enriched(r)).collect();
    Ok(measure(&dataset, manifest, &enriched))
}

/// Like [`validate`], but a row only counts as enriched when it adds a
/// feature value to the `source` record it was produced from.
pub fn validate_against(
    path: &Path,
    source: &Path,
    manifest: &EnrichmentManifest,
    id_candidates: &[String],
) -> Result<ValidationReport, DatasetError> {
    let dataset = dataset::read(path)?;
    let input = dataset::read(source)?;
    if dataset.records.is_empty() {
        return Ok(measure(&dataset, manifest, &[]));
    }

    let column = IdentifierColumn::resolve(&dataset.columns, id_candidates)?;
    let sources: HashMap<RecordKey, &Record> =
        column.keys(&input.records).into_iter().zip(&input.records).collect();
    let enriched: Vec<bool> = column
        .keys(&dataset.records)
        .iter()
        .zip(&dataset.records)
        .map(|(key, record)| match sources.get(key) {
            Some(source) => manifest.adds_features(record, source),
            None => manifest.is_enriched(record),
        })
        .collect();
    Ok(measure(&dataset, manifest, &enriched))
}

fn measure(dataset: &Dataset, manifest: &EnrichmentManifest, enriched: &[bool]) -> ValidationReport {
    let records = &dataset.records;

    let coverage = |column: &str| ColumnCoverage {
        column: column.to_string(),
        present: dataset.columns.iter().any(|c| c == column),
        filled: records
            .iter()
            .filter(|r| r.get(column).is_some_and(is_present))
            .count(),
    };

    let features = manifest.features.iter().map(|f| coverage(&f.column)).collect();
    let analysis = manifest
        .analysis
        .iter()
        .map(|f| coverage(&f.column))
        .filter(|c| c.present)
        .collect();

    let total_rows = records.len();
    let enriched_rows = enriched.iter().filter(|e| **e).count();
    let enhancement_rate = if total_rows == 0 {
        0.0
    } else {
        enriched_rows as f64 / total_rows as f64
    };

    ValidationReport {
        total_rows,
        enriched_rows,
        enhancement_rate,
        features,
        analysis,
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total rows:       {}", self.total_rows)?;
        writeln!(f, "Enriched rows:    {}", self.enriched_rows)?;
        writeln!(f, "Enhancement rate: {:.1}%", self.enhancement_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Feature columns:")?;
        for c in &self.features {
            if c.present {
                writeln!(f, "  ✓ {:<26} {}/{}", c.column, c.filled, self.total_rows)?;
            } else {
                writeln!(f, "  ✗ {:<26} missing", c.column)?;
            }
        }
        if !self.analysis.is_empty() {
            writeln!(f)?;
            writeln!(f, "Analysis columns:")?;
            for c in &self.analysis {
                writeln!(f, "  ✓ {:<26} {}/{}", c.column, c.filled, self.total_rows)?;
            }
        }
        Ok(())
    }
}
