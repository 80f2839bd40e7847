//! Test utilities and fixtures for playlist-minder tests.
//!
//! Common builders for queries, candidates, ledgers and catalogs, to keep
//! the orchestrator and catalog tests short.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{queries, ledger, settings};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut ctx = BatchContext::new(ledger(300, 100, 50));
//!     let rows = queries(&["One", "Two"]);
//!     // ... test logic
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::offline::{CatalogData, CatalogTrack};
use crate::ingest::{IngestSettings, PlaylistEntry, RetryPolicy};
use crate::model::{CandidateMatch, SongQuery};
use crate::quota::{OperationCosts, QuotaLedger};

/// Title-only queries, numbered from row 1.
pub fn queries(titles: &[&str]) -> Vec<SongQuery> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| SongQuery::new(i + 1, *title))
        .collect()
}

/// A fuzzy candidate with a comfortable score.
pub fn candidate(id: &str, title: &str) -> CandidateMatch {
    CandidateMatch::new(id, title, 0.9)
}

/// A ledger with custom search/insert costs and default costs otherwise.
pub fn ledger(budget: u64, search: u64, insert: u64) -> QuotaLedger {
    QuotaLedger::new(
        budget,
        OperationCosts {
            search,
            playlist_insert: insert,
            ..Default::default()
        },
    )
}

/// Sequential quick-mode settings with a short retry backoff.
pub fn settings() -> IngestSettings {
    IngestSettings {
        retry: RetryPolicy::new(2, Duration::from_millis(100)),
        ..Default::default()
    }
}

pub fn entry(id: &str, title: &str) -> PlaylistEntry {
    PlaylistEntry {
        catalog_id: id.to_string(),
        title: title.to_string(),
        artist: None,
    }
}

fn track(id: &str, title: &str, artist: &str) -> CatalogTrack {
    CatalogTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: Some(artist.to_string()),
        album: None,
    }
}

/// Small catalog with one title shared by two artists.
pub fn sample_catalog() -> CatalogData {
    CatalogData {
        tracks: vec![
            track("vid-shape", "Shape of You", "Ed Sheeran"),
            track("vid-perfect", "Perfect", "Ed Sheeran"),
            track("vid-hello-adele", "Hello", "Adele"),
            track("vid-hello-lionel", "Hello", "Lionel Richie"),
            track("vid-yellow", "Yellow", "Coldplay"),
        ],
        playlists: Default::default(),
    }
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_are_numbered_from_one() {
        let rows = queries(&["a", "b"]);
        assert_eq!(rows[0].row(), 1);
        assert_eq!(rows[1].title(), "b");
    }

    #[test]
    fn test_ledger_costs() {
        let ledger = ledger(300, 100, 50);
        assert_eq!(ledger.costs().search, 100);
        assert_eq!(ledger.costs().lookup, 1);
    }

    #[test]
    fn test_sample_catalog_has_shared_title() {
        let data = sample_catalog();
        let hellos = data.tracks.iter().filter(|t| t.title == "Hello").count();
        assert_eq!(hellos, 2);
    }
}
