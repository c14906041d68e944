//! Adapters: convert remote DTOs into domain types.

use std::collections::HashMap;

use super::dto;
use crate::enrichment::domain::{FetchResult, TrackId};
use crate::enrichment::manifest::EnrichmentManifest;

/// Match a batch response back to the requested identifiers.
///
/// Entries are keyed by the `id` embedded in each one, never by position:
/// the service may reorder entries or return `null` for unknown tracks.
/// Every requested identifier appears in the result; those without a
/// non-null entry map to [`FetchResult::NoData`]. Entries for identifiers
/// that were not requested are ignored.
pub fn to_fetch_results(
    response: &dto::BatchFeaturesResponse,
    requested: &[TrackId],
    manifest: &EnrichmentManifest,
) -> HashMap<TrackId, FetchResult> {
    let mut results: HashMap<TrackId, FetchResult> = requested
        .iter()
        .map(|id| (id.clone(), FetchResult::NoData))
        .collect();

    for entry in response.entries() {
        let Some(id) = entry
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|raw| TrackId::parse(raw).ok())
        else {
            tracing::debug!(target: "fetcher", "Skipping entry without a usable id");
            continue;
        };

        match results.get_mut(&id) {
            Some(slot) => *slot = FetchResult::Features(manifest.project_features(entry)),
            None => tracing::debug!(target: "fetcher", %id, "Ignoring entry for unrequested id"),
        }
    }

    results
}
