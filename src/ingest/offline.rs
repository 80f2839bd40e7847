//! File-backed catalog for dry runs.
//!
//! Implements both collaborator traits over a JSON document:
//!
//! ```json
//! {
//!   "tracks": [{ "id": "vid-1", "title": "Shape of You", "artist": "Ed Sheeran" }],
//!   "playlists": { "PL-1": { "name": "Mix", "privacy": "private", "tracks": ["vid-1"] } }
//! }
//! ```
//!
//! Search scores tracks with the same normalizer the duplicate detector
//! uses, so results behave like a real provider's fuzzy search without any
//! network traffic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::domain::{AppendResult, CatalogError, PlaylistEntry, PlaylistId, Privacy};
use super::traits::{PlaylistMutator, ResolutionClient};
use crate::error::{Result, ResultExt};
use crate::matching::{NormalizedKey, normalize, normalize_opt};
use crate::model::{CandidateMatch, MatchConfidence, ProcessingMode, SongQuery, rank_candidates};

/// Candidates scoring below this are not returned.
const MIN_SCORE: f64 = 0.5;

/// Results returned per search.
const MAX_RESULTS: usize = 5;

/// Weight of the title when the query also names an artist.
const TITLE_WEIGHT: f64 = 0.7;

/// A track in the offline catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

/// A playlist in the offline catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPlaylist {
    pub name: String,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// On-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
    #[serde(default)]
    pub playlists: BTreeMap<String, CatalogPlaylist>,
}

/// JSON-backed catalog and playlist store.
pub struct OfflineCatalog {
    path: Option<PathBuf>,
    data: Mutex<CatalogData>,
    max_items_per_call: usize,
}

impl OfflineCatalog {
    pub fn new(data: CatalogData) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
            max_items_per_call: 50,
        }
    }

    /// Load a catalog document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(format!("reading catalog {}", path.display()))?;
        let data: CatalogData = serde_json::from_str(&text)?;
        tracing::info!(
            path = %path.display(),
            tracks = data.tracks.len(),
            playlists = data.playlists.len(),
            "Loaded offline catalog"
        );
        let mut catalog = Self::new(data);
        catalog.path = Some(path.to_path_buf());
        Ok(catalog)
    }

    pub fn with_max_items_per_call(mut self, max: usize) -> Self {
        self.max_items_per_call = max.max(1);
        self
    }

    /// Write playlists (and tracks) back to the file it was loaded from.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    /// Write the document to `path` (temp file + rename).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.data.lock())?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).with_context("writing catalog")?;
        std::fs::rename(&temp_path, path).with_context("replacing catalog")?;
        tracing::info!(path = %path.display(), "Saved offline catalog");
        Ok(())
    }

    /// Track identifiers of a playlist, if it exists.
    pub fn playlist_tracks(&self, id: &PlaylistId) -> Option<Vec<String>> {
        self.data
            .lock()
            .playlists
            .get(id.as_str())
            .map(|p| p.tracks.clone())
    }

    fn score(&self, track: &CatalogTrack, title: &NormalizedKey, artist: Option<&NormalizedKey>) -> (f64, bool) {
        let track_title = normalize(&track.title);
        let title_score = strsim::normalized_levenshtein(title.as_str(), track_title.as_str());
        let title_exact = *title == track_title;

        match (artist, normalize_opt(track.artist.as_deref())) {
            (Some(wanted), Some(actual)) => {
                let artist_score =
                    strsim::normalized_levenshtein(wanted.as_str(), actual.as_str());
                let score = TITLE_WEIGHT * title_score + (1.0 - TITLE_WEIGHT) * artist_score;
                (score, title_exact && *wanted == actual)
            }
            _ => (title_score, title_exact),
        }
    }
}

#[async_trait]
impl ResolutionClient for OfflineCatalog {
    async fn search(
        &self,
        query: &SongQuery,
        _mode: ProcessingMode,
    ) -> std::result::Result<Vec<CandidateMatch>, CatalogError> {
        let title = normalize(query.title());
        let artist = normalize_opt(query.artist());

        let mut exact = 0;
        let mut candidates: Vec<CandidateMatch> = {
            let data = self.data.lock();
            data.tracks
                .iter()
                .filter_map(|track| {
                    let (score, is_exact) = self.score(track, &title, artist.as_ref());
                    if score < MIN_SCORE {
                        return None;
                    }
                    if is_exact {
                        exact += 1;
                    }
                    let mut candidate = CandidateMatch::new(&track.id, &track.title, score)
                        .with_confidence(if is_exact {
                            MatchConfidence::Exact
                        } else {
                            MatchConfidence::Fuzzy
                        });
                    if let Some(ref a) = track.artist {
                        candidate = candidate.with_artist(a.clone());
                    }
                    Some(candidate)
                })
                .collect()
        };

        // Several exact hits for the same title: let the caller decide
        if exact > 1 {
            for candidate in candidates
                .iter_mut()
                .filter(|c| c.confidence == MatchConfidence::Exact)
            {
                candidate.confidence = MatchConfidence::Multiple;
            }
        }

        rank_candidates(&mut candidates);
        candidates.truncate(MAX_RESULTS);
        tracing::debug!(query = %query.display(), hits = candidates.len(), "Offline search");
        Ok(candidates)
    }

    async fn lookup(
        &self,
        candidates: &[CandidateMatch],
    ) -> std::result::Result<Vec<CandidateMatch>, CatalogError> {
        let data = self.data.lock();
        Ok(candidates
            .iter()
            .map(|c| {
                let track = data.tracks.iter().find(|t| t.id == c.catalog_id);
                match track.and_then(|t| t.artist.clone()) {
                    Some(artist) => c.clone().with_artist(artist),
                    None => c.clone(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl PlaylistMutator for OfflineCatalog {
    async fn create_playlist(
        &self,
        name: &str,
        privacy: Privacy,
    ) -> std::result::Result<PlaylistId, CatalogError> {
        let mut data = self.data.lock();
        let mut n = data.playlists.len() + 1;
        while data.playlists.contains_key(&format!("PL{:04}", n)) {
            n += 1;
        }
        let id = format!("PL{:04}", n);
        data.playlists.insert(
            id.clone(),
            CatalogPlaylist {
                name: name.to_string(),
                privacy,
                tracks: Vec::new(),
            },
        );
        Ok(PlaylistId(id))
    }

    async fn append_tracks(
        &self,
        playlist: &PlaylistId,
        catalog_ids: &[String],
    ) -> std::result::Result<Vec<AppendResult>, CatalogError> {
        let mut data = self.data.lock();
        let CatalogData { tracks, playlists } = &mut *data;
        let target = playlists
            .get_mut(playlist.as_str())
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {}", playlist)))?;

        Ok(catalog_ids
            .iter()
            .map(|id| {
                if tracks.iter().any(|t| &t.id == id) {
                    target.tracks.push(id.clone());
                    AppendResult::ok(id.clone())
                } else {
                    AppendResult::failed(id.clone(), CatalogError::Rejected("unknown track".into()))
                }
            })
            .collect())
    }

    async fn existing_tracks(
        &self,
        playlist: &PlaylistId,
    ) -> std::result::Result<Vec<PlaylistEntry>, CatalogError> {
        let data = self.data.lock();
        let target = data
            .playlists
            .get(playlist.as_str())
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {}", playlist)))?;

        Ok(target
            .tracks
            .iter()
            .map(|id| {
                let track = data.tracks.iter().find(|t| &t.id == id);
                PlaylistEntry {
                    catalog_id: id.clone(),
                    title: track.map(|t| t.title.clone()).unwrap_or_default(),
                    artist: track.and_then(|t| t.artist.clone()),
                }
            })
            .collect())
    }

    fn max_items_per_call(&self) -> usize {
        self.max_items_per_call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_catalog, write_file};

    #[tokio::test]
    async fn test_search_ranks_closest_title_first() {
        let catalog = OfflineCatalog::new(sample_catalog());
        let results = catalog
            .search(&SongQuery::new(1, "shape of you"), ProcessingMode::Quick)
            .await
            .unwrap();

        assert_eq!(results[0].catalog_id, "vid-shape");
        assert_eq!(results[0].confidence, MatchConfidence::Exact);
        assert_eq!(results[0].artist.as_deref(), Some("Ed Sheeran"));
    }

    #[tokio::test]
    async fn test_search_without_match_is_empty() {
        let catalog = OfflineCatalog::new(sample_catalog());
        let results = catalog
            .search(&SongQuery::new(1, "Zzzz Qqqq"), ProcessingMode::Quick)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_same_title_different_artists_is_multiple() {
        let catalog = OfflineCatalog::new(sample_catalog());
        let results = catalog
            .search(&SongQuery::new(1, "Hello"), ProcessingMode::Robust)
            .await
            .unwrap();
        assert!(results.len() >= 2);
        assert_eq!(results[0].confidence, MatchConfidence::Multiple);

        let with_artist = catalog
            .search(&SongQuery::new(1, "Hello").with_artist("Adele"), ProcessingMode::Robust)
            .await
            .unwrap();
        assert_eq!(with_artist[0].catalog_id, "vid-hello-adele");
        assert_eq!(with_artist[0].confidence, MatchConfidence::Exact);
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let catalog = OfflineCatalog::new(sample_catalog());
        let playlist = catalog.create_playlist("Mix", Privacy::Public).await.unwrap();

        let results = catalog
            .append_tracks(&playlist, &["vid-shape".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(results[0].result.is_ok());
        assert!(matches!(results[1].result, Err(CatalogError::Rejected(_))));

        let entries = catalog.existing_tracks(&playlist).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Shape of You");
    }

    #[tokio::test]
    async fn test_unknown_playlist_is_not_found() {
        let catalog = OfflineCatalog::new(sample_catalog());
        let err = catalog
            .existing_tracks(&PlaylistId("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_string(&sample_catalog()).unwrap();
        let path = write_file(dir.path(), "catalog.json", &json);

        let catalog = OfflineCatalog::load(&path).unwrap();
        let playlist = catalog.create_playlist("Saved", Privacy::Private).await.unwrap();
        catalog
            .append_tracks(&playlist, &["vid-yellow".to_string()])
            .await
            .unwrap();
        catalog.save().unwrap();

        let reloaded = OfflineCatalog::load(&path).unwrap();
        assert_eq!(
            reloaded.playlist_tracks(&playlist),
            Some(vec!["vid-yellow".to_string()])
        );
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "catalog.json", "{ not json");
        assert!(matches!(
            OfflineCatalog::load(&path),
            Err(crate::error::Error::Json(_))
        ));
    }
}
