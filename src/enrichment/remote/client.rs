//! Remote metadata service HTTP client
//!
//! Performs the three raw exchanges (token, batch features, analysis) and
//! reports status, `Retry-After` and body. Status handling and retries live
//! in the token manager and batch fetcher.
//!
//! ## Batch URL
//! Identifiers are joined with a literal `,`. Each id is URL-encoded on its
//! own so the separator is never turned into `%2C`.

use std::time::Duration;

use crate::config::ApiConfig;
use crate::enrichment::domain::{TrackId, TransportError};
use crate::enrichment::token::ClientCredentials;
use crate::enrichment::traits::ApiResponse;

/// User agent string sent with every request
const USER_AGENT: &str = concat!("TrackEnricher/", env!("CARGO_PKG_VERSION"));

/// Metadata service API client
pub struct RemoteClient {
    http_client: reqwest::Client,
    token_url: String,
    base_url: String,
    batch_path: String,
    analysis_path: String,
}

impl RemoteClient {
    /// Create a new client for the configured endpoints
    ///
    /// The client is configured to:
    /// - Accept gzip-compressed responses
    /// - Send a User-Agent header identifying the application
    /// - Give up on a single request after the configured timeout
    pub fn new(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            token_url: config.token_url.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            batch_path: config.batch_path.trim_matches('/').to_string(),
            analysis_path: config.analysis_path.trim_matches('/').to_string(),
        })
    }

    /// Exchange client credentials for a bearer token
    pub async fn request_token(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<ApiResponse, TransportError> {
        let request = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(credentials.secret()))
            .form(&[("grant_type", "client_credentials")]);
        send(request).await
    }

    /// Look up features for a batch of identifiers
    pub async fn batch_features(
        &self,
        ids: &[TrackId],
        bearer: &str,
    ) -> Result<ApiResponse, TransportError> {
        let request = self.http_client.get(self.batch_url(ids)).bearer_auth(bearer);
        send(request).await
    }

    /// Fetch the analysis object for one identifier
    pub async fn analysis(&self, id: &TrackId, bearer: &str) -> Result<ApiResponse, TransportError> {
        let request = self.http_client.get(self.analysis_url(id)).bearer_auth(bearer);
        send(request).await
    }

    fn batch_url(&self, ids: &[TrackId]) -> String {
        let joined = ids
            .iter()
            .map(|id| urlencoding::encode(id.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/{}?ids={}", self.base_url, self.batch_path, joined)
    }

    fn analysis_url(&self, id: &TrackId) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.analysis_path,
            urlencoding::encode(id.as_str())
        )
    }
}

/// Send a request and capture status, `Retry-After` and body.
async fn send(request: reqwest::RequestBuilder) -> Result<ApiResponse, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError(e.to_string()))?;

    let status = response.status().as_u16();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    let body = response
        .text()
        .await
        .map_err(|e| TransportError(e.to_string()))?;

    Ok(ApiResponse {
        status,
        retry_after,
        body,
    })
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// The HTTP-date form is not used by the service and yields `None`, which
/// callers treat as "use the default wait".
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RemoteClient {
        RemoteClient::new(&ApiConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = RemoteClient::new(&ApiConfig::default()).unwrap();
        assert_eq!(client.base_url, "https://api.spotify.com/v1");
        assert_eq!(client.token_url, "https://accounts.spotify.com/api/token");
    }

    #[test]
    fn test_batch_url_keeps_literal_commas() {
        let ids = vec![
            TrackId::parse("7qiZfU4dY1lWllzX7mPBI3").unwrap(),
            TrackId::parse("0VjIjW4GlUZAMYd2vXMi3b").unwrap(),
        ];
        assert_eq!(
            client().batch_url(&ids),
            "http://localhost:8080/v1/audio-features?ids=7qiZfU4dY1lWllzX7mPBI3,0VjIjW4GlUZAMYd2vXMi3b"
        );
    }

    #[test]
    fn test_analysis_url() {
        let id = TrackId::parse("7qiZfU4dY1lWllzX7mPBI3").unwrap();
        assert_eq!(
            client().analysis_url(&id),
            "http://localhost:8080/v1/audio-analysis/7qiZfU4dY1lWllzX7mPBI3"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some(" 10 ")), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_user_agent_format() {
        assert!(USER_AGENT.starts_with("TrackEnricher/"));
    }
}
