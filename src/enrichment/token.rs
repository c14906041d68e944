//! Bearer token lifecycle.
//!
//! The token manager owns the client credentials and the current bearer
//! token. It hands out the cached token while it is comfortably valid and
//! performs a client-credentials exchange otherwise. It never retries: a
//! failed exchange is an [`AuthError`] and ends the run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::domain::AuthError;
use super::remote::dto;
use super::traits::MetadataApi;

/// Refresh tokens this long before they actually expire.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Lifetime assumed when the service omits `expires_in`.
const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// Client id and secret for the credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A bearer token and the instant it stops being accepted.
#[derive(Clone)]
pub struct Token {
    access_token: String,
    expires_at: Instant,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Still valid for at least `margin` from now.
    fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at > Instant::now() + margin
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owns the credentials and the current bearer token.
pub struct TokenManager {
    api: Arc<dyn MetadataApi>,
    credentials: ClientCredentials,
    token: Option<Token>,
    safety_margin: Duration,
}

impl TokenManager {
    pub fn new(api: Arc<dyn MetadataApi>, credentials: ClientCredentials) -> Self {
        Self {
            api,
            credentials,
            token: None,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Return the cached token, exchanging credentials first if it is
    /// missing or expires within the safety margin.
    pub async fn ensure_valid_token(&mut self) -> Result<Token, AuthError> {
        if let Some(token) = &self.token
            && token.is_fresh(self.safety_margin)
        {
            return Ok(token.clone());
        }

        let token = self.exchange().await?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call performs an exchange.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    async fn exchange(&self) -> Result<Token, AuthError> {
        tracing::debug!(target: "auth", client_id = %self.credentials.client_id, "Requesting bearer token");

        let response = self
            .api
            .request_token(&self.credentials)
            .await
            .map_err(|e| AuthError::Network(e.0))?;

        if !response.is_success() {
            return Err(AuthError::Rejected {
                status: response.status,
                body: dto::error_message(&response.body),
            });
        }

        let parsed: dto::TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| AuthError::Parse(e.to_string()))?;
        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS));

        tracing::info!(target: "auth", expires_in = lifetime.as_secs(), "Obtained bearer token");

        Ok(Token {
            access_token: parsed.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::traits::mocks::{MockApi, MockReply};
    use serde_json::json;

    fn manager(api: &Arc<MockApi>) -> TokenManager {
        TokenManager::new(api.clone(), ClientCredentials::new("client", "secret"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_reused_while_fresh() {
        let api = Arc::new(MockApi::new());
        let mut tokens = manager(&api);

        let first = tokens.ensure_valid_token().await.unwrap();
        let second = tokens.ensure_valid_token().await.unwrap();

        assert_eq!(first.as_str(), "mock-token-1");
        assert_eq!(second.as_str(), "mock-token-1");
        assert_eq!(api.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_refreshed_inside_safety_margin() {
        let api = Arc::new(MockApi::new().script_token(MockReply::ok(json!({
            "access_token": "short",
            "expires_in": 600,
        }))));
        let mut tokens = manager(&api);

        assert_eq!(tokens.ensure_valid_token().await.unwrap().as_str(), "short");

        // 4 minutes in: 6 minutes left, still outside the 5 minute margin
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert_eq!(tokens.ensure_valid_token().await.unwrap().as_str(), "short");
        assert_eq!(api.token_calls(), 1);

        // 6 minutes in: 4 minutes left, inside the margin
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(tokens.ensure_valid_token().await.unwrap().as_str(), "mock-token-2");
        assert_eq!(api.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_lifetime_defaults_to_an_hour() {
        let api = Arc::new(
            MockApi::new().script_token(MockReply::ok(json!({"access_token": "abc"}))),
        );
        let mut tokens = manager(&api);

        let token = tokens.ensure_valid_token().await.unwrap();
        assert_eq!(token.expires_at() - Instant::now(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_auth_error() {
        let api = Arc::new(MockApi::new().script_token(MockReply::Status {
            status: 400,
            retry_after: None,
            body: r#"{"error": {"message": "invalid_client"}}"#.to_string(),
        }));
        let mut tokens = manager(&api);

        match tokens.ensure_valid_token().await {
            Err(AuthError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_client");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(api.token_calls(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_is_auth_error() {
        let api = Arc::new(MockApi::new().script_token(MockReply::network("dns failure")));
        let mut tokens = manager(&api);
        assert!(matches!(
            tokens.ensure_valid_token().await,
            Err(AuthError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let api = Arc::new(MockApi::new().script_token(MockReply::Status {
            status: 200,
            retry_after: None,
            body: "not json".to_string(),
        }));
        let mut tokens = manager(&api);
        assert!(matches!(
            tokens.ensure_valid_token().await,
            Err(AuthError::Parse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_exchange() {
        let api = Arc::new(MockApi::new());
        let mut tokens = manager(&api);

        tokens.ensure_valid_token().await.unwrap();
        tokens.invalidate();
        let token = tokens.ensure_valid_token().await.unwrap();

        assert_eq!(token.as_str(), "mock-token-2");
        assert_eq!(api.token_calls(), 2);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ClientCredentials::new("client", "super-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("client"));
        assert!(!rendered.contains("super-secret"));
    }
}
