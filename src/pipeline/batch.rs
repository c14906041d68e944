use std::collections::HashSet;
use std::ops::Range;

use crate::dataset::IdentifierColumn;
use crate::enrichment::{MAX_BATCH, Record, TrackId};

/// A contiguous run of records and the new identifiers it needs fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Record positions covered by this batch
    pub range: Range<usize>,
    /// Valid identifiers first seen in this batch, in record order
    pub ids: Vec<TrackId>,
}

/// Split records into batches of at most `batch_size` distinct identifiers.
///
/// Ranges are contiguous and cover every record. An identifier is requested
/// only by the first batch that contains it; malformed identifiers are never
/// requested. `batch_size` is clamped to `1..=MAX_BATCH`.
pub fn partition<'a, I>(records: I, column: &IdentifierColumn, batch_size: usize) -> Vec<Batch>
where
    I: IntoIterator<Item = &'a Record>,
{
    let batch_size = batch_size.clamp(1, MAX_BATCH);
    let mut batches = Vec::new();
    let mut seen = HashSet::new();
    let mut start = 0;
    let mut ids = Vec::new();
    let mut len = 0;

    for (index, record) in records.into_iter().enumerate() {
        len = index + 1;
        let Ok(id) = column.track_id(record) else {
            continue;
        };
        if seen.contains(&id) {
            continue;
        }
        if ids.len() == batch_size {
            batches.push(Batch {
                range: start..index,
                ids: std::mem::take(&mut ids),
            });
            start = index;
        }
        seen.insert(id.clone());
        ids.push(id);
    }

    if start < len {
        batches.push(Batch {
            range: start..len,
            ids,
        });
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ID_COLUMN, track_id, track_record};
    use proptest::prelude::*;
    use serde_json::json;

    fn column() -> IdentifierColumn {
        IdentifierColumn::new(ID_COLUMN)
    }

    fn malformed() -> Record {
        let mut r = Record::new();
        r.insert(ID_COLUMN.to_string(), json!("test_1"));
        r
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(&Vec::<Record>::new(), &column(), 10).is_empty());
    }

    #[test]
    fn test_splits_at_batch_size() {
        let records: Vec<Record> = (0..250).map(|n| track_record(&track_id(n), "t")).collect();
        let batches = partition(&records, &column(), 100);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].range, 0..100);
        assert_eq!(batches[1].range, 100..200);
        assert_eq!(batches[2].range, 200..250);
        assert_eq!(batches[2].ids.len(), 50);
        assert_eq!(batches[0].ids[0].as_str(), track_id(0));
    }

    #[test]
    fn test_malformed_records_ride_along() {
        let records = vec![
            malformed(),
            track_record(&track_id(1), "a"),
            malformed(),
            track_record(&track_id(2), "b"),
            malformed(),
        ];
        let batches = partition(&records, &column(), 1);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].range, 0..3);
        assert_eq!(batches[1].range, 3..5);
        assert_eq!(batches[1].ids.len(), 1);
    }

    #[test]
    fn test_only_malformed_yields_idless_batch() {
        let records = vec![malformed(), malformed()];
        let batches = partition(&records, &column(), 10);
        assert_eq!(batches, vec![Batch { range: 0..2, ids: vec![] }]);
    }

    #[test]
    fn test_repeated_identifier_requested_once() {
        let records = vec![
            track_record(&track_id(1), "a"),
            track_record(&track_id(2), "b"),
            track_record(&track_id(1), "again"),
        ];
        let batches = partition(&records, &column(), 2);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].range, 0..3);
        assert_eq!(batches[0].ids.len(), 2);
    }

    #[test]
    fn test_batch_size_clamped() {
        let records: Vec<Record> = (0..150).map(|n| track_record(&track_id(n), "t")).collect();
        let batches = partition(&records, &column(), 1000);
        assert!(batches.iter().all(|b| b.ids.len() <= MAX_BATCH));

        let batches = partition(&records[..3], &column(), 0);
        assert_eq!(batches.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_distinct_ids(
            picks in prop::collection::vec(prop::option::weighted(0.8, 0usize..60), 0..300),
            batch_size in 1usize..120,
        ) {
            let records: Vec<Record> = picks
                .iter()
                .map(|p| match p {
                    Some(n) => track_record(&track_id(*n), "t"),
                    None => malformed(),
                })
                .collect();

            let batches = partition(&records, &column(), batch_size);

            let mut expected = Vec::new();
            let mut seen = HashSet::new();
            for n in picks.iter().flatten() {
                if seen.insert(*n) {
                    expected.push(track_id(*n));
                }
            }
            let actual: Vec<String> = batches
                .iter()
                .flat_map(|b| b.ids.iter().map(|id| id.to_string()))
                .collect();
            prop_assert_eq!(actual, expected);

            let mut next = 0;
            for batch in &batches {
                prop_assert!(batch.ids.len() <= batch_size.min(MAX_BATCH));
                prop_assert_eq!(batch.range.start, next);
                prop_assert!(batch.range.end > batch.range.start);
                next = batch.range.end;
            }
            prop_assert_eq!(next, records.len());
        }
    }
}
