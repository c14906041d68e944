//! Track enrichment - fetches audio features for batches of identifiers and
//! merges them back into the source records.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal types that represent our business logic
//! - **API DTOs** (`remote/dto.rs`) - Exact API response shapes
//! - **Manifest** (`manifest.rs`) - Which payload fields become which columns
//! - **Adapter** (`remote/adapter.rs`) - Converts DTOs to domain models
//! - **Token manager** (`token.rs`) - Bearer token lifecycle
//! - **Fetcher** (`fetcher.rs`) - One batch request with bounded retries
//! - **Merge** (`merge.rs`) - Folds fetch results into records
//!
//! The HTTP client sits behind the [`MetadataApi`] trait so every layer above
//! it can be tested against scripted responses.

pub mod domain;
pub mod fetcher;
pub mod manifest;
pub mod merge;
pub mod remote;
pub mod token;
pub mod traits;

pub use domain::{
    AuthError, EnrichedRecord, FailureReason, FetchError, FetchResult, Features,
    IdentifierError, MAX_BATCH, Outcome, Record, RecordKey, TrackId, TransportError,
};
pub use fetcher::{BatchFetcher, RetryPolicy};
pub use manifest::{EnrichmentManifest, FieldMapping};
pub use merge::merge;
pub use remote::RemoteClient;
pub use token::{ClientCredentials, TokenManager};
pub use traits::MetadataApi;
