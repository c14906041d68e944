use std::collections::HashMap;

use crate::dataset::IdentifierColumn;

use super::domain::{
    EnrichedRecord, FailureReason, FetchResult, Outcome, Record, RecordKey, TrackId,
};

/// Fold fetch results into source records.
///
/// Output has one entry per input, in input order. An enriched record keeps
/// every original field and gains the feature fields; on a name collision the
/// fetched value wins and the field keeps its original position.
pub fn merge<I>(
    records: I,
    column: &IdentifierColumn,
    results: &HashMap<TrackId, FetchResult>,
) -> Vec<EnrichedRecord>
where
    I: IntoIterator<Item = (RecordKey, Record)>,
{
    records
        .into_iter()
        .map(|(key, mut record)| {
            let outcome = match column.track_id(&record) {
                Err(_) => Outcome::Failed(FailureReason::MalformedIdentifier),
                Ok(id) => match results.get(&id).and_then(FetchResult::features) {
                    Some(features) => {
                        for (name, value) in features {
                            record.insert(name.clone(), value.clone());
                        }
                        Outcome::Enriched
                    }
                    None => Outcome::Failed(FailureReason::NoData),
                },
            };
            EnrichedRecord {
                key,
                record,
                outcome,
            }
        })
        .collect()
}
