//! Internal domain models for batch enrichment.
//!
//! These types are OUR types - they don't change when the remote API changes.
//! Wire payloads live in `remote::dto` and get projected into these types
//! through the field manifest.

use std::fmt;

use serde_json::{Map, Value};

/// One input track: field name to scalar value, in input column order.
pub type Record = Map<String, Value>;

/// Enrichment field name to value, as produced by the manifest.
pub type Features = Map<String, Value>;

/// Length of a valid track identifier.
pub const TRACK_ID_LEN: usize = 22;

/// Service-imposed maximum number of identifiers per batch request.
pub const MAX_BATCH: usize = 100;

/// A validated remote track identifier.
///
/// Only constructible from a 22-character string of ASCII letters, digits,
/// `-` and `_`, so anything holding a `TrackId` may be sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    /// Validate a bare identifier.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Missing);
        }
        let valid = raw.len() == TRACK_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdentifierError::Malformed(raw.to_string()))
        }
    }

    /// Extract an identifier from a URI (`spotify:track:<id>`), a URL
    /// (`https://host/track/<id>?si=...`) or a raw ID.
    pub fn extract(value: &str) -> Result<Self, IdentifierError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Missing);
        }

        let candidate = if let Some(pos) = trimmed.find("/track/") {
            let rest = &trimmed[pos + "/track/".len()..];
            rest.split(['?', '/', '#']).next().unwrap_or_default()
        } else if trimmed.contains(":track:") {
            trimmed.rsplit(':').next().unwrap_or_default()
        } else {
            trimmed
        };

        Self::parse(candidate).map_err(|_| IdentifierError::Malformed(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a record's identifier could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Record has no identifier")]
    Missing,

    #[error("Malformed identifier: {0:?}")]
    Malformed(String),
}

/// What the remote service returned for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Enrichment fields projected through the manifest
    Features(Features),
    /// The service had nothing (null entry, omitted entry, or failed batch)
    NoData,
}

impl FetchResult {
    pub fn features(&self) -> Option<&Features> {
        match self {
            Self::Features(f) => Some(f),
            Self::NoData => None,
        }
    }
}

/// Checkpoint identity of a record.
///
/// The identifier cell alone is not unique (the same track may be listed
/// many times, and malformed cells still need an identity), so the key also
/// carries the occurrence ordinal of that cell value within the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub value: String,
    pub occurrence: usize,
}

impl RecordKey {
    /// Assign keys to identifier cells in dataset order.
    pub fn assign<I>(cells: I) -> Vec<RecordKey>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        cells
            .into_iter()
            .map(|value| {
                let counter = seen.entry(value.clone()).or_insert(0);
                let key = RecordKey {
                    value,
                    occurrence: *counter,
                };
                *counter += 1;
                key
            })
            .collect()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.value, self.occurrence)
    }
}

/// Why a record was not enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No features came back for a valid identifier
    NoData,
    /// Identifier missing or malformed; never sent to the service
    MalformedIdentifier,
}

/// Per-record classification used for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Enriched,
    Failed(FailureReason),
}

/// A source record after merging, with its checkpoint key.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub key: RecordKey,
    pub record: Record,
    pub outcome: Outcome,
}

impl EnrichedRecord {
    pub fn is_enriched(&self) -> bool {
        self.outcome == Outcome::Enriched
    }
}

/// Credential exchange failures. Always fatal to a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Credential exchange rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error during credential exchange: {0}")]
    Network(String),

    #[error("Failed to parse token response: {0}")]
    Parse(String),
}

/// Batch-level fetch failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Rate limited - gave up after {attempts} retries")]
    RateLimitExceeded { attempts: u32 },

    #[error("Bearer token rejected after refresh")]
    TokenRejected,

    #[error("Request failed after {attempts} attempts: {last}")]
    Transient { attempts: u32, last: String },

    #[error("Batch of {len} identifiers exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
}

impl FetchError {
    /// Only authentication failures abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// A request that never produced an HTTP status.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Network error: {0}")]
pub struct TransportError(pub String);
