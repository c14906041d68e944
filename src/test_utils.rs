//! Test utilities and fixtures for track-enricher tests.
//!
//! Identifiers are generated deterministically with [`track_id`] so tests can
//! refer to the n-th track without hand-writing 22-character strings.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{track_id, write_tracks_csv};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let input = write_tracks_csv(dir.path(), "in.csv", 0..10);
//! ```

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::dataset::IdentifierColumn;
use crate::enrichment::{EnrichedRecord, FailureReason, Outcome, Record};

/// Identifier column used by every fixture.
pub const ID_COLUMN: &str = "track_uri";

/// A valid 22-character identifier for track `n`.
pub fn track_id(n: usize) -> String {
    format!("trk{n:019}")
}

/// `spotify:track:<id>` for track `n`.
pub fn track_uri(n: usize) -> String {
    format!("spotify:track:{}", track_id(n))
}

/// A source record with an identifier URI and a name.
pub fn track_record(id: &str, name: &str) -> Record {
    let mut record = Record::new();
    record.insert(ID_COLUMN.to_string(), json!(format!("spotify:track:{id}")));
    record.insert("name".to_string(), json!(name));
    record
}

/// Wrap a record as a merge result. Enriched records gain one core feature.
pub fn enriched(mut record: Record, is_enriched: bool) -> EnrichedRecord {
    let column = IdentifierColumn::new(ID_COLUMN);
    let key = column.keys(std::slice::from_ref(&record)).remove(0);
    let outcome = if is_enriched {
        record.insert("enhanced_energy".to_string(), json!(0.5));
        Outcome::Enriched
    } else {
        Outcome::Failed(FailureReason::NoData)
    };
    EnrichedRecord {
        key,
        record,
        outcome,
    }
}

/// A catalog payload for track `n`, as the batch endpoint would return it.
pub fn feature_payload(n: usize) -> Value {
    json!({
        "id": track_id(n),
        "energy": 0.5,
        "danceability": (n % 10) as f64 / 10.0,
        "tempo": 120.0,
        "key": n % 12,
        "duration_ms": 200_000 + n,
    })
}

/// Write `track_uri,name` rows for every track in `tracks`.
pub fn write_tracks_csv(dir: &Path, name: &str, tracks: Range<usize>) -> PathBuf {
    let mut contents = format!("{ID_COLUMN},name\n");
    for n in tracks {
        contents.push_str(&format!("{},Track {n}\n", track_uri(n)));
    }
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture");
    path
}

/// Write records as a JSON array.
pub fn write_records_json(dir: &Path, name: &str, records: &[Record]) -> PathBuf {
    let path = dir.join(name);
    let contents = serde_json::to_string_pretty(records).expect("Failed to serialize fixture");
    std::fs::write(&path, contents).expect("Failed to write fixture");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::TrackId;

    #[test]
    fn test_generated_ids_are_valid() {
        for n in [0, 1, 99, 123_456] {
            assert!(TrackId::parse(&track_id(n)).is_ok());
        }
        assert_ne!(track_id(1), track_id(2));
    }

    #[test]
    fn test_tracks_csv_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tracks_csv(dir.path(), "in.csv", 0..3);
        let dataset = crate::dataset::read(&path).unwrap();
        assert_eq!(dataset.records.len(), 3);
        assert_eq!(dataset.records[2]["name"], json!("Track 2"));
    }
}
