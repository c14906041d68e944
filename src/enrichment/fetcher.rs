//! Batch fetcher - one bounded remote lookup with retries.
//!
//! Retry policy, per request:
//! - `429`: sleep for the advised `Retry-After` (default 1s) and retry,
//!   at most `max_rate_limit_retries` times.
//! - `401`: drop the token, refresh, retry once.
//! - any other failure status or transport error: fixed backoff, at most
//!   `max_transient_retries` retries.
//!
//! None of these abort the run. Only an [`AuthError`](super::AuthError) from
//! the token manager does, surfaced as [`FetchError::Auth`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::domain::{Features, FetchError, FetchResult, MAX_BATCH, TrackId};
use super::manifest::EnrichmentManifest;
use super::remote::{self, dto};
use super::token::TokenManager;
use super::traits::{ApiResponse, MetadataApi};

/// Bounded retry settings shared by batch and analysis requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
    pub transient_backoff: Duration,
    /// Wait used when a 429 carries no usable `Retry-After`
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_transient_retries: 3,
            transient_backoff: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(1),
        }
    }
}

/// The two request shapes the fetcher retries.
#[derive(Clone, Copy)]
enum Request<'a> {
    Batch(&'a [TrackId]),
    Analysis(&'a TrackId),
}

impl Request<'_> {
    /// Statuses other than 2xx that end the retry loop normally.
    fn is_terminal(&self, response: &ApiResponse) -> bool {
        response.is_success() || (matches!(self, Request::Analysis(_)) && response.status == 404)
    }
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Batch(ids) => write!(f, "batch of {}", ids.len()),
            Request::Analysis(id) => write!(f, "analysis {id}"),
        }
    }
}

/// Performs batch and analysis lookups against the metadata service.
pub struct BatchFetcher {
    api: Arc<dyn MetadataApi>,
    tokens: TokenManager,
    manifest: EnrichmentManifest,
    policy: RetryPolicy,
}

impl BatchFetcher {
    pub fn new(
        api: Arc<dyn MetadataApi>,
        tokens: TokenManager,
        manifest: EnrichmentManifest,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            tokens,
            manifest,
            policy,
        }
    }

    pub fn manifest(&self) -> &EnrichmentManifest {
        &self.manifest
    }

    /// Obtain a token up front so credential problems surface before any
    /// batch is attempted.
    pub async fn authenticate(&mut self) -> Result<(), FetchError> {
        self.tokens.ensure_valid_token().await?;
        Ok(())
    }

    /// Fetch features for up to [`MAX_BATCH`] identifiers in one request.
    ///
    /// Every distinct requested identifier is present in the returned map;
    /// identifiers the service had nothing for map to [`FetchResult::NoData`].
    pub async fn fetch(
        &mut self,
        ids: &[TrackId],
    ) -> Result<HashMap<TrackId, FetchResult>, FetchError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<TrackId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();

        if unique.is_empty() {
            return Ok(HashMap::new());
        }
        if unique.len() > MAX_BATCH {
            return Err(FetchError::BatchTooLarge {
                len: unique.len(),
                max: MAX_BATCH,
            });
        }

        let response = self.execute(Request::Batch(&unique)).await?;
        let parsed: dto::BatchFeaturesResponse =
            serde_json::from_str(&response.body).map_err(|e| FetchError::Transient {
                attempts: 1,
                last: format!("Failed to parse response: {e}"),
            })?;

        let results = remote::to_fetch_results(&parsed, &unique, &self.manifest);
        let found = results.values().filter(|r| r.features().is_some()).count();
        tracing::debug!(target: "fetcher", requested = unique.len(), found, "Batch fetched");

        Ok(results)
    }

    /// Fetch and project the secondary analysis for one identifier.
    ///
    /// Returns `None` when the service has no analysis for the track.
    pub async fn fetch_analysis(&mut self, id: &TrackId) -> Result<Option<Features>, FetchError> {
        let response = self.execute(Request::Analysis(id)).await?;
        if response.status == 404 {
            return Ok(None);
        }

        let payload: Value =
            serde_json::from_str(&response.body).map_err(|e| FetchError::Transient {
                attempts: 1,
                last: format!("Failed to parse analysis: {e}"),
            })?;
        Ok(Some(self.manifest.project_analysis(&payload)))
    }

    /// Run one request through the bounded retry loop.
    async fn execute(&mut self, request: Request<'_>) -> Result<ApiResponse, FetchError> {
        let mut rate_limited: u32 = 0;
        let mut failures: u32 = 0;
        let mut refreshed = false;

        loop {
            let token = self.tokens.ensure_valid_token().await?;
            let outcome = match request {
                Request::Batch(ids) => self.api.batch_features(ids, token.as_str()).await,
                Request::Analysis(id) => self.api.analysis(id, token.as_str()).await,
            };

            let failure = match outcome {
                Ok(response) if request.is_terminal(&response) => return Ok(response),
                Ok(response) if response.status == 429 => {
                    if rate_limited >= self.policy.max_rate_limit_retries {
                        return Err(FetchError::RateLimitExceeded {
                            attempts: rate_limited,
                        });
                    }
                    rate_limited += 1;
                    let wait = response.retry_after.unwrap_or(self.policy.default_retry_after);
                    tracing::warn!(
                        target: "fetcher",
                        %request,
                        attempt = rate_limited,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(response) if response.status == 401 => {
                    if refreshed {
                        return Err(FetchError::TokenRejected);
                    }
                    refreshed = true;
                    tracing::warn!(target: "fetcher", %request, "Token rejected, refreshing");
                    self.tokens.invalidate();
                    continue;
                }
                Ok(response) => format!(
                    "HTTP {}: {}",
                    response.status,
                    dto::error_message(&response.body)
                ),
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures > self.policy.max_transient_retries {
                return Err(FetchError::Transient {
                    attempts: failures,
                    last: failure,
                });
            }
            tracing::warn!(
                target: "fetcher",
                %request,
                attempt = failures,
                error = %failure,
                "Request failed, retrying"
            );
            tokio::time::sleep(self.policy.transient_backoff).await;
        }
    }
}
