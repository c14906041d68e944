//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error for everything that ends a run
//! - Module-specific errors ([`DatasetError`], [`CheckpointError`],
//!   [`AuthError`], [`FetchError`], [`ConfigError`]) for detailed handling
//! - Per-record and per-batch failures never reach this type; they are
//!   counted in the run report instead
//!
//! # Example
//!
//! ```ignore
//! use crate::error::{Result, ResultExt};
//!
//! fn load(path: &Path) -> Result<Dataset> {
//!     dataset::read(path).with_context("loading input")
//! }
//! ```

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::enrichment::{AuthError, FetchError};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates the fatal errors from all subsystems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable input, unsupported format, missing identifier column
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Output or checkpoint write failure
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Credential exchange failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A fetch failure escalated to the run level
    #[error("Fetch error: {0}")]
    Fetch(FetchError),

    /// HTTP client construction failure
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Report serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Client id or secret not supplied
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(auth) => Self::Auth(auth),
            other => Self::Fetch(other),
        }
    }
}

impl Error {
    /// Create a missing credentials error.
    pub fn missing_credentials(message: impl Into<String>) -> Self {
        Self::MissingCredentials(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for credential problems, so the CLI can print a hint.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) | Self::MissingCredentials(_) => true,
            Self::WithContext { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, DatasetError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Dataset(e).context(ctx))
    }
}
