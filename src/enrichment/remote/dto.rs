//! Remote metadata service Data Transfer Objects
//!
//! These types match what the service returns.
//! DO NOT use these types outside the remote module - convert to domain types
//! via the adapter.
//!
//! Example batch response (the reference service calls the array
//! `audio_features`, the abstract contract calls it `results`):
//! ```json
//! {
//!   "audio_features": [
//!     {"id": "7qiZfU4dY1lWllzX7mPBI3", "energy": 0.652, "tempo": 95.977, ...},
//!     null
//!   ]
//! }
//! ```
//!
//! Entries are kept as raw JSON objects: which fields matter is decided by
//! the enrichment manifest, not by this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-credentials token response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    /// Token lifetime in seconds
    pub expires_in: Option<u64>,
}

/// Batch features response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchFeaturesResponse {
    /// One entry per requested id; `null` for unknown tracks. The array
    /// itself may be `null` when nothing matched.
    #[serde(alias = "audio_features", default)]
    pub results: Option<Vec<Option<Value>>>,
}

impl BatchFeaturesResponse {
    /// Non-null entries, in response order.
    pub fn entries(&self) -> impl Iterator<Item = &Value> {
        self.results.iter().flatten().flatten()
    }
}

/// Error envelope returned with non-success statuses
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    pub status: Option<u16>,
    pub message: Option<String>,
}

/// Best-effort human readable message for a failed response body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(envelope) => envelope
            .error
            .message
            .unwrap_or_else(|| "no message".to_string()),
        Err(_) => body.chars().take(200).collect(),
    }
}

// ============================================================================
// CONTRACT TESTS
// These verify our DTOs match what the real API returns.
// ============================================================================

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let json = r#"{
            "access_token": "BQDk9...",
            "token_type": "Bearer",
            "expires_in": 3600
        }"#;

        let token: TokenResponse = serde_json::from_str(json).expect("Should parse token");
        assert_eq!(token.access_token, "BQDk9...");
        assert_eq!(token.expires_in, Some(3600));
    }

    #[test]
    fn test_parse_token_without_lifetime() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).expect("Should parse token");
        assert!(token.expires_in.is_none());
        assert!(token.token_type.is_none());
    }

    #[test]
    fn test_parse_audio_features_with_nulls() {
        let json = r#"{
            "audio_features": [
                {
                    "danceability": 0.825,
                    "energy": 0.652,
                    "key": 1,
                    "loudness": -3.183,
                    "mode": 0,
                    "speechiness": 0.0802,
                    "acousticness": 0.581,
                    "instrumentalness": 0,
                    "liveness": 0.0931,
                    "valence": 0.931,
                    "tempo": 95.977,
                    "type": "audio_features",
                    "id": "7qiZfU4dY1lWllzX7mPBI3",
                    "duration_ms": 233713,
                    "time_signature": 4
                },
                null
            ]
        }"#;

        let response: BatchFeaturesResponse =
            serde_json::from_str(json).expect("Should parse batch");
        assert_eq!(response.results.as_ref().map(Vec::len), Some(2));

        let entries: Vec<_> = response.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "7qiZfU4dY1lWllzX7mPBI3");
        assert_eq!(entries[0]["duration_ms"], 233713);
    }

    #[test]
    fn test_parse_generic_results_key() {
        let json = r#"{"results": [null, {"id": "abc", "energy": 0.1}]}"#;
        let response: BatchFeaturesResponse =
            serde_json::from_str(json).expect("Should parse batch");
        assert_eq!(response.entries().count(), 1);
    }

    #[test]
    fn test_parse_null_array() {
        let response: BatchFeaturesResponse =
            serde_json::from_str(r#"{"audio_features": null}"#).expect("Should parse");
        assert_eq!(response.entries().count(), 0);

        let response: BatchFeaturesResponse =
            serde_json::from_str("{}").expect("Should parse empty object");
        assert_eq!(response.entries().count(), 0);
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error": {"status": 401, "message": "The access token expired"}}"#;
        assert_eq!(error_message(body), "The access token expired");
        assert_eq!(error_message("plain text"), "plain text");
    }
}
