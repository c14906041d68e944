//! Trait definition for the remote metadata service.
//!
//! The trait is thin: it performs one HTTP exchange and hands
//! back the raw status, `Retry-After` and body. Status interpretation and
//! retries live in the token manager and batch fetcher, so tests can drive
//! every branch through a mock without an HTTP server.
//!
//! # Example
//!
//! ```ignore
//! use crate::enrichment::traits::MetadataApi;
//!
//! // In production code:
//! let api: Arc<dyn MetadataApi> = Arc::new(RemoteClient::new(&config.api)?);
//!
//! // In tests:
//! let api = Arc::new(MockApi::new().with_features(id, json!({...})));
//! ```

use std::time::Duration;

use async_trait::async_trait;

use super::domain::{TrackId, TransportError};
use super::token::ClientCredentials;

/// Raw outcome of one remote call that produced an HTTP status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Server-advised wait, from the `Retry-After` header
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The three calls the pipeline makes against the metadata service.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// Exchange client credentials for a bearer token.
    async fn request_token(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<ApiResponse, TransportError>;

    /// Look up features for up to `MAX_BATCH` identifiers in one request.
    async fn batch_features(
        &self,
        ids: &[TrackId],
        bearer: &str,
    ) -> Result<ApiResponse, TransportError>;

    /// Fetch the secondary analysis object for one identifier.
    async fn analysis(&self, id: &TrackId, bearer: &str) -> Result<ApiResponse, TransportError>;
}

// Implement the trait for the real client

#[async_trait]
impl MetadataApi for super::remote::RemoteClient {
    async fn request_token(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<ApiResponse, TransportError> {
        self.request_token(credentials).await
    }

    async fn batch_features(
        &self,
        ids: &[TrackId],
        bearer: &str,
    ) -> Result<ApiResponse, TransportError> {
        self.batch_features(ids, bearer).await
    }

    async fn analysis(&self, id: &TrackId, bearer: &str) -> Result<ApiResponse, TransportError> {
        self.analysis(id, bearer).await
    }
}
