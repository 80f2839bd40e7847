//! Core data models for song ingestion.
//!
//! Defines the input entity [`SongQuery`], the catalog-side [`CandidateMatch`]
//! and the [`ProcessingMode`] that decides how much work (and quota) each
//! query is allowed to use.

use serde::{Deserialize, Serialize};

use crate::quota::OperationKind;

/// One row of the input song list.
///
/// Immutable once read. The row index is the identity: two queries with the
/// same title on different rows are different queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongQuery {
    row: usize,
    title: String,
    artist: Option<String>,
    album: Option<String>,
}

impl SongQuery {
    /// Create a query with only a title.
    pub fn new(row: usize, title: impl Into<String>) -> Self {
        Self {
            row,
            title: title.into(),
            artist: None,
            album: None,
        }
    }

    /// Attach an artist. Blank values are treated as absent.
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = non_blank(artist.into());
        self
    }

    /// Attach an album. Blank values are treated as absent.
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = non_blank(album.into());
        self
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn album(&self) -> Option<&str> {
        self.album.as_deref()
    }

    /// A row is usable only if it carries a non-empty title.
    pub fn is_viable(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Free-text form of the query as the user wrote it, for logging.
    pub fn display(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// How confident the catalog is about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    /// Title (and artist, if given) matched exactly
    Exact,
    /// Close but not exact
    Fuzzy,
    /// Several plausible tracks, the catalog could not pick one
    Multiple,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::Fuzzy => "fuzzy",
            MatchConfidence::Multiple => "multiple",
        }
    }
}

/// A track returned by the catalog for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    /// Opaque catalog identifier
    pub catalog_id: String,
    /// Display title as returned by the catalog
    pub title: String,
    /// Display artist (or channel) if known
    pub artist: Option<String>,
    /// Relevance score (0.0 to 1.0)
    pub score: f64,
    pub confidence: MatchConfidence,
}

impl CandidateMatch {
    pub fn new(catalog_id: impl Into<String>, title: impl Into<String>, score: f64) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            title: title.into(),
            artist: None,
            score,
            confidence: MatchConfidence::Fuzzy,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = non_blank(artist.into());
        self
    }

    pub fn with_confidence(mut self, confidence: MatchConfidence) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Sort candidates best-first. Equal scores keep catalog order.
pub fn rank_candidates(candidates: &mut [CandidateMatch]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// How each query is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Take the top search result, no disambiguation.
    #[default]
    Quick,
    /// Disambiguation lookup, ambiguity detection and artist comparison.
    Robust,
}

impl ProcessingMode {
    /// Operations invoked for one query that ends up appended.
    pub fn operations(&self) -> &'static [OperationKind] {
        match self {
            ProcessingMode::Quick => &[OperationKind::Search, OperationKind::PlaylistInsert],
            ProcessingMode::Robust => &[
                OperationKind::Search,
                OperationKind::Lookup,
                OperationKind::PlaylistInsert,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Quick => "quick",
            ProcessingMode::Robust => "robust",
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(ProcessingMode::Quick),
            "robust" => Ok(ProcessingMode::Robust),
            other => Err(format!("unknown processing mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
