//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\track-enricher\config.toml
//! - macOS: ~/Library/Application Support/track-enricher/config.toml
//! - Linux: ~/.config/track-enricher/config.toml
//!
//! Every section has defaults, so a config file only needs the values it
//! changes. Command-line flags override the file per run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enrichment::manifest::{default_analysis_fields, default_feature_fields};
use crate::enrichment::{EnrichmentManifest, FieldMapping, MAX_BATCH, RetryPolicy};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client credentials for the metadata service
    pub credentials: Credentials,

    /// Service endpoints
    pub api: ApiConfig,

    /// Batching, pacing and checkpointing
    pub pipeline: PipelineConfig,

    /// Bounded retry caps
    pub retry: RetryConfig,

    /// Bearer token handling
    pub auth: AuthConfig,

    /// Optional per-track secondary analysis
    pub analysis: AnalysisConfig,

    /// Identifier column candidates and enrichment field manifest
    pub fields: FieldsConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Remote service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Client-credentials token endpoint
    pub token_url: String,

    /// Base URL for data requests
    pub base_url: String,

    /// Batch features path under `base_url`
    pub batch_path: String,

    /// Per-track analysis path under `base_url`
    pub analysis_path: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            base_url: "https://api.spotify.com/v1".to_string(),
            batch_path: "audio-features".to_string(),
            analysis_path: "audio-analysis".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Identifiers per request (clamped to 1..=100)
    pub batch_size: usize,

    /// Pause between batch requests
    pub batch_delay_ms: u64,

    /// Persist progress every N merged records
    pub checkpoint_every: usize,

    /// Pick up an existing checkpoint
    pub resume: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH,
            batch_delay_ms: 100,
            checkpoint_every: 1000,
            resume: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
    pub transient_backoff_ms: u64,
    /// Wait used when a rate-limit response has no `Retry-After`
    pub default_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_transient_retries: 3,
            transient_backoff_ms: 1000,
            default_retry_after_secs: 1,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_rate_limit_retries: self.max_rate_limit_retries,
            max_transient_retries: self.max_transient_retries,
            transient_backoff: Duration::from_millis(self.transient_backoff_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh the token when it expires within this many seconds
    pub token_safety_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_safety_margin_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub enabled: bool,

    /// Stop requesting analysis after this many tracks (unlimited if unset)
    pub max_tracks: Option<usize>,

    /// Pause after each analysis request
    pub delay_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tracks: None,
            delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Identifier column names, in priority order
    pub id_candidates: Vec<String>,

    /// Core feature fields
    pub features: Vec<FieldMapping>,

    /// Secondary analysis fields
    pub analysis: Vec<FieldMapping>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            id_candidates: default_id_candidates(),
            features: default_feature_fields(),
            analysis: default_analysis_fields(),
        }
    }
}

impl FieldsConfig {
    pub fn manifest(&self) -> EnrichmentManifest {
        EnrichmentManifest {
            features: self.features.clone(),
            analysis: self.analysis.clone(),
        }
    }
}

pub fn default_id_candidates() -> Vec<String> {
    [
        "spotify_track_uri",
        "track_uri",
        "uri",
        "url",
        "id",
        "track_id",
        "spotify_id",
        "trackId",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// A copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.credentials.client_secret.is_some() {
            copy.credentials.client_secret = Some("<redacted>".to_string());
        }
        copy
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("track-enricher"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load(path: Option<&Path>) -> Config {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to `path`, or to the default location.
///
/// Creates the parent directory if it doesn't exist. Returns the path written.
pub fn save(config: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[credentials]"));
        assert!(toml.contains("[api]"));
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("[retry]"));
        assert!(toml.contains("[analysis]"));
        assert!(toml.contains("[[fields.features]]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.credentials.client_id = Some("client-123".to_string());
        config.pipeline.batch_size = 50;
        config.analysis.max_tracks = Some(10);
        config.fields.features.truncate(2);

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Config with only some fields
        let toml = r#"
[credentials]
client_id = "my-client"

[pipeline]
batch_size = 20
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Specified fields are set
        assert_eq!(config.credentials.client_id, Some("my-client".to_string()));
        assert_eq!(config.pipeline.batch_size, 20);

        // Other fields use defaults
        assert_eq!(config.pipeline.checkpoint_every, 1000);
        assert_eq!(config.retry.max_rate_limit_retries, 3);
        assert_eq!(config.auth.token_safety_margin_secs, 300);
        assert!(!config.analysis.enabled);
        assert_eq!(config.fields.id_candidates[0], "spotify_track_uri");
        assert_eq!(config.fields.features.len(), 13);
    }

    #[test]
    fn test_custom_field_manifest() {
        let toml = r#"
[fields]
id_candidates = ["isrc_uri"]
features = [{ source = "energy", column = "energy" }]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let manifest = config.fields.manifest();

        assert_eq!(config.fields.id_candidates, vec!["isrc_uri"]);
        assert_eq!(manifest.features, vec![FieldMapping::new("energy", "energy")]);
        assert_eq!(manifest.analysis.len(), 9);
    }

    #[test]
    fn test_retry_policy_conversion() {
        let retry = RetryConfig {
            transient_backoff_ms: 250,
            default_retry_after_secs: 2,
            ..Default::default()
        };
        let policy = retry.policy();
        assert_eq!(policy.transient_backoff, Duration::from_millis(250));
        assert_eq!(policy.default_retry_after, Duration::from_secs(2));
        assert_eq!(policy.max_rate_limit_retries, 3);
    }

    #[test]
    fn test_redacted_hides_secret() {
        let mut config = Config::default();
        config.credentials.client_secret = Some("hunter2".to_string());
        let rendered = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.pipeline.batch_delay_ms = 5;
        save(&config, Some(path.as_path())).unwrap();

        assert!(!path.with_extension("toml.tmp").exists());
        assert_eq!(load(Some(path.as_path())), config);
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.toml");
        assert_eq!(load(Some(missing.as_path())), Config::default());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[pipeline\nbatch_size = ").unwrap();
        assert_eq!(load(Some(broken.as_path())), Config::default());
    }
}
