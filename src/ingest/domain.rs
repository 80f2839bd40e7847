//! Domain types shared by the orchestrator and its collaborators.
//!
//! Catalog and playlist clients translate their wire-level failures into
//! [`CatalogError`] so the orchestrator can decide on retries and halts
//! without knowing which provider it talks to.

use serde::{Deserialize, Serialize};

/// Opaque playlist identifier issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistId(pub String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Visibility of a newly created playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
            Privacy::Public => "public",
        }
    }
}

impl std::str::FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Privacy::Private),
            "unlisted" => Ok(Privacy::Unlisted),
            "public" => Ok(Privacy::Public),
            other => Err(format!("unknown privacy '{}'", other)),
        }
    }
}

/// Where accepted tracks go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistTarget {
    /// Create a fresh playlist; nothing is known up front
    New { name: String, privacy: Privacy },
    /// Append to an existing playlist, seeding known tracks from it
    Existing(PlaylistId),
}

/// A track already in the target playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub catalog_id: String,
    pub title: String,
    pub artist: Option<String>,
}

/// Per-identifier result of an append call.
#[derive(Debug, Clone)]
pub struct AppendResult {
    pub catalog_id: String,
    pub result: Result<(), CatalogError>,
}

impl AppendResult {
    pub fn ok(catalog_id: impl Into<String>) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            result: Ok(()),
        }
    }

    pub fn failed(catalog_id: impl Into<String>, error: CatalogError) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            result: Err(error),
        }
    }
}

/// Errors reported by catalog and playlist collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by provider: {0}")]
    Rejected(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Worth one more attempt on a mutation call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Timeout | CatalogError::Transport(_) | CatalogError::RateLimited
        )
    }

    /// Stops the whole batch: credentials are gone or revoked.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::Unauthorized(_))
    }
}

/// Failures that stop a batch before any item is processed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Quota exhausted: {operation} needs {needed} tokens, {remaining} remaining")]
    QuotaExhausted {
        operation: &'static str,
        needed: u64,
        remaining: u64,
    },

    #[error("Playlist setup failed: {0}")]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CatalogError::Timeout.is_retryable());
        assert!(CatalogError::Transport("reset".into()).is_retryable());
        assert!(CatalogError::RateLimited.is_retryable());
        assert!(!CatalogError::NotFound("x".into()).is_retryable());
        assert!(!CatalogError::Unauthorized("expired".into()).is_retryable());
        assert!(CatalogError::Unauthorized("expired".into()).is_fatal());
        assert!(!CatalogError::Timeout.is_fatal());
    }

    #[test]
    fn test_privacy_parsing() {
        assert_eq!("Public".parse::<Privacy>(), Ok(Privacy::Public));
        assert!("secret".parse::<Privacy>().is_err());
    }

    #[test]
    fn test_ingest_error_display() {
        let err = IngestError::QuotaExhausted {
            operation: "playlist_create",
            needed: 50,
            remaining: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("playlist_create"));
        assert!(msg.contains("50"));
    }
}
