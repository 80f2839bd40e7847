//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playlist-minder\config.toml
//! - macOS: ~/Library/Application Support/playlist-minder/config.toml
//! - Linux: ~/.config/playlist-minder/config.toml
//!
//! Every section is optional and falls back to defaults, except the daily
//! quota budget: providers disagree on it, so it must come from the file or
//! the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{IngestSettings, Privacy, RetryPolicy};
use crate::matching::DuplicateDetector;
use crate::model::ProcessingMode;
use crate::quota::{OperationCosts, QuotaLedger};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daily budget and per-operation costs
    pub quota: QuotaConfig,

    /// Batch processing settings
    pub processing: ProcessingConfig,

    /// Duplicate/ambiguity thresholds
    pub matching: MatchingConfig,

    /// Target playlist settings
    pub playlist: PlaylistConfig,
}

/// Quota settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Tokens available per day. No default.
    pub daily_budget: Option<u64>,

    /// Token cost per operation kind
    pub costs: OperationCosts,
}

/// Batch processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// "quick" or "robust"
    pub mode: ProcessingMode,

    /// Deadline for each external call, in seconds
    pub per_item_timeout_secs: u64,

    /// Rows past this count are not processed
    pub max_batch_size: usize,

    /// Concurrent searches
    pub resolve_workers: usize,

    /// Attempts per playlist mutation, including the first
    pub retry_attempts: u32,

    /// Wait before the first retry, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Quick,
            per_item_timeout_secs: 10,
            max_batch_size: 500,
            resolve_workers: 1,
            retry_attempts: 2,
            retry_backoff_ms: 1000,
        }
    }
}

/// Duplicate detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Title similarity treated as the same song (0.0 - 1.0)
    pub title_threshold: f64,

    /// Score gap below which the top two candidates are ambiguous
    pub ambiguity_delta: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.92,
            ambiguity_delta: 0.05,
        }
    }
}

/// Playlist settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Visibility of newly created playlists
    pub privacy: Privacy,

    /// Provider limit on entries per playlist
    pub capacity: usize,

    /// Provider limit on identifiers per append call
    pub max_items_per_call: usize,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            privacy: Privacy::Private,
            capacity: 5000,
            max_items_per_call: 50,
        }
    }
}

impl Config {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matching.title_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.title_threshold must be between 0 and 1, got {}",
                threshold
            )));
        }
        if self.matching.ambiguity_delta < 0.0 {
            return Err(ConfigError::Invalid(
                "matching.ambiguity_delta must not be negative".to_string(),
            ));
        }
        if self.processing.per_item_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "processing.per_item_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.playlist.max_items_per_call == 0 {
            return Err(ConfigError::Invalid(
                "playlist.max_items_per_call must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the ledger, preferring an explicit budget over the file.
    pub fn ledger(&self, budget_override: Option<u64>) -> Result<QuotaLedger, ConfigError> {
        let budget = budget_override
            .or(self.quota.daily_budget)
            .ok_or(ConfigError::MissingBudget)?;
        Ok(QuotaLedger::new(budget, self.quota.costs.clone()))
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        let p = &self.processing;
        IngestSettings {
            mode: p.mode,
            per_item_timeout: Duration::from_secs(p.per_item_timeout_secs),
            max_batch_size: p.max_batch_size,
            resolve_workers: p.resolve_workers.max(1),
            retry: RetryPolicy::new(p.retry_attempts, Duration::from_millis(p.retry_backoff_ms)),
            max_items_per_call: self.playlist.max_items_per_call,
            playlist_capacity: self.playlist.capacity,
        }
    }

    pub fn detector(&self) -> DuplicateDetector {
        DuplicateDetector::new(self.matching.title_threshold, self.matching.ambiguity_delta)
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playlist-minder"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path
///
/// Unlike [`load`], any problem is an error: a file the user named must be
/// usable.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: Config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    config.validate()?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &dir.join("config.toml"))
}

/// Save configuration to `path`, atomically
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write to temp, then rename
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("No daily quota budget: set quota.daily_budget or pass --budget")]
    MissingBudget,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

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
