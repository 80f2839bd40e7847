//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`
//! ([`CatalogError`](crate::ingest::CatalogError),
//! [`IngestError`](crate::ingest::IngestError),
//! [`ConfigError`](crate::config::ConfigError)); this module aggregates them
//! for code that touches several subsystems at once. The CLI uses `anyhow`.
//!
//! Item-level failures during a batch never surface here: the orchestrator
//! turns them into outcome records.
//!
//! # Example
//!
//! ```ignore
//! use playlist_minder::error::{Result, ResultExt};
//!
//! fn load(path: &Path) -> Result<OfflineCatalog> {
//!     let text = std::fs::read_to_string(path).with_context("reading catalog")?;
//!     Ok(serde_json::from_str(&text)?)
//! }
//! ```

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON (offline catalog)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or unwritable CSV (song lists, reports)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Catalog or playlist provider error
    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::ingest::CatalogError),

    /// Batch could not start
    #[error("Ingest error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Input that cannot be turned into song queries
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
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

impl<T> ResultExt<T> for std::result::Result<T, csv::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Csv(e).context(ctx))
    }
}
