//! Duplicate and ambiguity detection.
//!
//! A candidate is a duplicate if either signal fires:
//! 1. its catalog identifier is already known (in the playlist, or queued for
//!    append earlier in this batch), or
//! 2. one of its title forms is close enough to a form of a known title.
//!    Forms include the song part of "Artist - Song" uploads and bracketed
//!    alternative names. In robust mode the artist must match too when both
//!    sides have one.

use std::collections::HashSet;

use crate::matching::normalize::{NormalizedKey, TitleKeys, normalize_opt};
use crate::model::{CandidateMatch, MatchConfidence, ProcessingMode};

/// Words ignored by the word-overlap comparison.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "in", "on", "at", "to", "from", "by", "for", "with", "of",
    "is", "it", "this", "that", "be", "are", "was", "not", "no", "all", "so", "too", "very",
];

/// Minimum word-overlap ratio for two titles to count as the same song.
const WORD_OVERLAP_THRESHOLD: f64 = 0.75;

/// Both titles need at least this many significant words for the overlap
/// signal to apply; short titles only compare by edit distance.
const MIN_OVERLAP_WORDS: usize = 3;

/// A title already present in the playlist or accepted in this batch.
#[derive(Debug, Clone)]
pub struct KnownTitle {
    pub catalog_id: String,
    pub title: TitleKeys,
    /// Given artist, else the one credited in the title
    pub artist: Option<NormalizedKey>,
}

/// Identifiers and titles the target playlist already holds.
///
/// Entries are either confirmed (present in the playlist) or held (accepted
/// and waiting for a batched append). Held entries count as known, so a later
/// item in the same batch cannot queue the same identifier again.
#[derive(Debug, Clone, Default)]
pub struct KnownTracks {
    confirmed: HashSet<String>,
    held: HashSet<String>,
    titles: Vec<KnownTitle>,
}

impl KnownTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a track confirmed to be in the playlist.
    ///
    /// Returns `false` if the identifier was already known.
    pub fn insert(&mut self, catalog_id: &str, title: &str, artist: Option<&str>) -> bool {
        if self.contains_id(catalog_id) {
            return false;
        }
        self.confirmed.insert(catalog_id.to_string());
        self.push_title(catalog_id, title, artist);
        true
    }

    /// Hold an identifier for a pending append.
    ///
    /// Returns `false` if the identifier was already known or held.
    pub fn hold(&mut self, candidate: &CandidateMatch) -> bool {
        if self.contains_id(&candidate.catalog_id) {
            return false;
        }
        self.held.insert(candidate.catalog_id.clone());
        self.push_title(
            &candidate.catalog_id,
            &candidate.title,
            candidate.artist.as_deref(),
        );
        true
    }

    /// Promote a held identifier once the append succeeded.
    pub fn confirm(&mut self, catalog_id: &str) -> bool {
        if self.held.remove(catalog_id) {
            self.confirmed.insert(catalog_id.to_string());
            true
        } else {
            false
        }
    }

    /// Drop a held identifier whose append failed.
    pub fn release(&mut self, catalog_id: &str) {
        if self.held.remove(catalog_id) {
            self.titles.retain(|t| t.catalog_id != catalog_id);
        }
    }

    pub fn contains_id(&self, catalog_id: &str) -> bool {
        self.confirmed.contains(catalog_id) || self.held.contains(catalog_id)
    }

    pub fn is_confirmed(&self, catalog_id: &str) -> bool {
        self.confirmed.contains(catalog_id)
    }

    /// Number of confirmed identifiers.
    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn titles(&self) -> &[KnownTitle] {
        &self.titles
    }

    fn push_title(&mut self, catalog_id: &str, title: &str, artist: Option<&str>) {
        let keys = TitleKeys::parse(title);
        if keys.key().is_empty() {
            return;
        }
        let artist = normalize_opt(artist).or_else(|| keys.credited_artist().cloned());
        self.titles.push(KnownTitle {
            catalog_id: catalog_id.to_string(),
            title: keys,
            artist,
        });
    }
}

/// Which signal classified a candidate as a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateSignal {
    /// Identifier already in the playlist or queued in this batch
    Identifier,
    /// Title (and artist, in robust mode) close to a known entry
    Title { catalog_id: String, similarity: f64 },
}

impl DuplicateSignal {
    pub fn describe(&self) -> String {
        match self {
            DuplicateSignal::Identifier => "identifier already in playlist".to_string(),
            DuplicateSignal::Title {
                catalog_id,
                similarity,
            } => format!("title matches {} ({:.0}% similar)", catalog_id, similarity * 100.0),
        }
    }
}

/// Verdict on the result set for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment<'a> {
    /// Best candidate is new; append it
    Accept(&'a CandidateMatch),
    /// Best candidate is already represented
    Duplicate {
        candidate: &'a CandidateMatch,
        signal: DuplicateSignal,
    },
    /// No dominant candidate (robust mode only)
    Ambiguous {
        candidate: &'a CandidateMatch,
        runner_up: Option<&'a CandidateMatch>,
    },
}

/// Duplicate/ambiguity classifier with configurable thresholds.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    /// Similarity at or above which titles are the same song (0.0 to 1.0)
    title_threshold: f64,
    /// Top two candidates closer than this are ambiguous
    ambiguity_delta: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(0.92, 0.05)
    }
}

impl DuplicateDetector {
    pub fn new(title_threshold: f64, ambiguity_delta: f64) -> Self {
        Self {
            title_threshold: title_threshold.clamp(0.0, 1.0),
            ambiguity_delta: ambiguity_delta.max(0.0),
        }
    }

    pub fn is_duplicate(
        &self,
        candidate: &CandidateMatch,
        known: &KnownTracks,
        mode: ProcessingMode,
    ) -> bool {
        self.check(candidate, known, mode).is_some()
    }

    /// Run both signals; the identifier signal wins if both fire.
    pub fn check(
        &self,
        candidate: &CandidateMatch,
        known: &KnownTracks,
        mode: ProcessingMode,
    ) -> Option<DuplicateSignal> {
        if known.contains_id(&candidate.catalog_id) {
            return Some(DuplicateSignal::Identifier);
        }

        let title = TitleKeys::parse(&candidate.title);
        if title.key().is_empty() {
            return None;
        }
        let artist = normalize_opt(candidate.artist.as_deref())
            .or_else(|| title.credited_artist().cloned());

        known.titles().iter().find_map(|entry| {
            let similarity = self.forms_similarity(&title, &entry.title)?;
            if mode == ProcessingMode::Robust
                && let (Some(a), Some(b)) = (&artist, &entry.artist)
                && artist_similarity(a, b) < self.title_threshold
            {
                return None;
            }
            Some(DuplicateSignal::Title {
                catalog_id: entry.catalog_id.clone(),
                similarity,
            })
        })
    }

    /// Is there no dominant candidate? Only robust mode ever says yes.
    ///
    /// Returns the runner-up when the top candidate is ambiguous. Candidates
    /// must already be ranked best-first. Entries sharing the top
    /// identifier are the same track and never make it ambiguous. An exact
    /// top candidate only dominates fuzzy runners-up; against another exact
    /// or multiple hit the score gap decides.
    pub fn ambiguity<'a>(
        &self,
        candidates: &'a [CandidateMatch],
        mode: ProcessingMode,
    ) -> Option<Option<&'a CandidateMatch>> {
        if mode == ProcessingMode::Quick {
            return None;
        }
        let top = candidates.first()?;
        let runner_up = candidates
            .iter()
            .skip(1)
            .find(|c| c.catalog_id != top.catalog_id);

        match (top.confidence, runner_up) {
            (MatchConfidence::Multiple, second) => Some(second),
            (_, None) => None,
            (MatchConfidence::Exact, Some(second)) if second.confidence == MatchConfidence::Fuzzy => {
                None
            }
            (_, Some(second)) => {
                (top.score - second.score < self.ambiguity_delta).then_some(Some(second))
            }
        }
    }

    /// Classify a ranked, non-empty result set. Returns `None` if empty.
    pub fn assess<'a>(
        &self,
        candidates: &'a [CandidateMatch],
        known: &KnownTracks,
        mode: ProcessingMode,
    ) -> Option<Assessment<'a>> {
        let top = candidates.first()?;

        if let Some(signal) = self.check(top, known, mode) {
            return Some(Assessment::Duplicate {
                candidate: top,
                signal,
            });
        }
        if let Some(runner_up) = self.ambiguity(candidates, mode) {
            return Some(Assessment::Ambiguous {
                candidate: top,
                runner_up,
            });
        }
        Some(Assessment::Accept(top))
    }

    /// Best similarity between any form of two titles, if one pair matches.
    fn forms_similarity(&self, a: &TitleKeys, b: &TitleKeys) -> Option<f64> {
        a.forms()
            .flat_map(|x| b.forms().map(move |y| (x, y)))
            .filter_map(|(x, y)| self.title_similarity(x, y))
            .max_by(f64::total_cmp)
    }

    /// Similarity of two title keys if they count as the same song.
    fn title_similarity(&self, a: &NormalizedKey, b: &NormalizedKey) -> Option<f64> {
        if a == b {
            return Some(1.0);
        }
        let edit = strsim::normalized_levenshtein(a.as_str(), b.as_str());
        if edit >= self.title_threshold {
            return Some(edit);
        }
        let overlap = word_overlap(a.as_str(), b.as_str())?;
        (overlap >= WORD_OVERLAP_THRESHOLD).then_some(overlap)
    }
}

/// Best of edit-distance and token-set similarity for two artist keys.
fn artist_similarity(a: &NormalizedKey, b: &NormalizedKey) -> f64 {
    if a == b {
        return 1.0;
    }
    let edit = strsim::normalized_levenshtein(a.as_str(), b.as_str());
    let tokens_a: HashSet<&str> = a.as_str().split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.as_str().split_whitespace().collect();
    let shared = tokens_a.intersection(&tokens_b).count();
    let jaccard = shared as f64 / tokens_a.union(&tokens_b).count().max(1) as f64;
    edit.max(jaccard)
}

/// Jaccard overlap of significant words, if both titles have enough of them.
fn word_overlap(a: &str, b: &str) -> Option<f64> {
    let words_a = significant_words(a);
    let words_b = significant_words(b);
    if words_a.len() < MIN_OVERLAP_WORDS || words_b.len() < MIN_OVERLAP_WORDS {
        return None;
    }
    let shared = words_a.intersection(&words_b).count();
    let total = words_a.union(&words_b).count();
    Some(shared as f64 / total as f64)
}

fn significant_words(key: &str) -> HashSet<&str> {
    key.split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w))
        .collect()
}
