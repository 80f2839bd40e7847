//! Per-item outcomes and the batch report.
//!
//! The orchestrator writes exactly one [`OutcomeRecord`] per input row. The
//! [`ReportAggregator`] only collects them; it never edits a record or
//! re-derives an outcome. Export is a pure projection over the records, in
//! input order.

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::domain::CatalogError;
use crate::matching::DuplicateSignal;
use crate::model::{CandidateMatch, SongQuery};

/// Final state of one input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Added,
    SkippedDuplicate,
    AmbiguousSkipped,
    Failed,
    /// Never reached because the batch stopped first
    NotProcessed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Added => "added",
            Outcome::SkippedDuplicate => "skipped_duplicate",
            Outcome::AmbiguousSkipped => "ambiguous_skipped",
            Outcome::Failed => "failed",
            Outcome::NotProcessed => "not_processed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Outcome::Added => "✓",
            Outcome::SkippedDuplicate => "=",
            Outcome::AmbiguousSkipped => "?",
            Outcome::Failed => "✗",
            Outcome::NotProcessed => "-",
        }
    }
}

/// Why a row ended up where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Duplicate,
    Ambiguous,
    NotFound,
    Timeout,
    TransportError,
    Rejected,
    Unauthorized,
    InvalidInput,
    QuotaExhausted,
    Cancelled,
    BatchLimit,
    PlaylistFull,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Duplicate => "Duplicate",
            Reason::Ambiguous => "Ambiguous",
            Reason::NotFound => "NotFound",
            Reason::Timeout => "Timeout",
            Reason::TransportError => "TransportError",
            Reason::Rejected => "Rejected",
            Reason::Unauthorized => "Unauthorized",
            Reason::InvalidInput => "InvalidInput",
            Reason::QuotaExhausted => "QuotaExhausted",
            Reason::Cancelled => "Cancelled",
            Reason::BatchLimit => "BatchLimit",
            Reason::PlaylistFull => "PlaylistFull",
        }
    }
}

impl From<&CatalogError> for Reason {
    fn from(error: &CatalogError) -> Self {
        match error {
            CatalogError::Timeout => Reason::Timeout,
            CatalogError::Transport(_) | CatalogError::RateLimited | CatalogError::Parse(_) => {
                Reason::TransportError
            }
            CatalogError::Unauthorized(_) => Reason::Unauthorized,
            CatalogError::NotFound(_) => Reason::NotFound,
            CatalogError::Rejected(_) => Reason::Rejected,
        }
    }
}

/// Why a batch stopped before the end of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    QuotaExhausted,
    Unauthorized,
    Cancelled,
    PlaylistFull,
}

impl HaltReason {
    /// Reason recorded on rows left unprocessed by this halt.
    pub fn reason(&self) -> Reason {
        match self {
            HaltReason::QuotaExhausted => Reason::QuotaExhausted,
            HaltReason::Unauthorized => Reason::Unauthorized,
            HaltReason::Cancelled => Reason::Cancelled,
            HaltReason::PlaylistFull => Reason::PlaylistFull,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.reason().as_str()
    }
}

/// Work spent on one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCost {
    pub searches: u32,
    pub tokens: u64,
}

/// Result for one input row. Immutable once built.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    query: SongQuery,
    outcome: Outcome,
    candidate: Option<CandidateMatch>,
    reason: Option<Reason>,
    detail: Option<String>,
    cost: ItemCost,
    recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    fn build(
        query: SongQuery,
        outcome: Outcome,
        candidate: Option<CandidateMatch>,
        reason: Option<Reason>,
        detail: Option<String>,
        cost: ItemCost,
    ) -> Self {
        Self {
            query,
            outcome,
            candidate,
            reason,
            detail,
            cost,
            recorded_at: Utc::now(),
        }
    }

    pub fn added(query: SongQuery, candidate: CandidateMatch, cost: ItemCost) -> Self {
        Self::build(query, Outcome::Added, Some(candidate), None, None, cost)
    }

    pub fn duplicate(
        query: SongQuery,
        candidate: CandidateMatch,
        signal: &DuplicateSignal,
        cost: ItemCost,
    ) -> Self {
        Self::build(
            query,
            Outcome::SkippedDuplicate,
            Some(candidate),
            Some(Reason::Duplicate),
            Some(signal.describe()),
            cost,
        )
    }

    pub fn ambiguous(
        query: SongQuery,
        candidate: CandidateMatch,
        runner_up: Option<&CandidateMatch>,
        cost: ItemCost,
    ) -> Self {
        let detail = match runner_up {
            Some(other) => format!(
                "top candidates {} ({:.2}) and {} ({:.2}) too close",
                candidate.catalog_id, candidate.score, other.catalog_id, other.score
            ),
            None => "catalog reported multiple candidates".to_string(),
        };
        Self::build(
            query,
            Outcome::AmbiguousSkipped,
            Some(candidate),
            Some(Reason::Ambiguous),
            Some(detail),
            cost,
        )
    }

    pub fn failed(
        query: SongQuery,
        reason: Reason,
        detail: Option<String>,
        candidate: Option<CandidateMatch>,
        cost: ItemCost,
    ) -> Self {
        Self::build(query, Outcome::Failed, candidate, Some(reason), detail, cost)
    }

    pub fn not_processed(
        query: SongQuery,
        reason: Reason,
        candidate: Option<CandidateMatch>,
        cost: ItemCost,
    ) -> Self {
        Self::build(query, Outcome::NotProcessed, candidate, Some(reason), None, cost)
    }

    pub fn row(&self) -> usize {
        self.query.row()
    }

    pub fn query(&self) -> &SongQuery {
        &self.query
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn candidate(&self) -> Option<&CandidateMatch> {
        self.candidate.as_ref()
    }

    pub fn reason(&self) -> Option<Reason> {
        self.reason
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn cost(&self) -> ItemCost {
        self.cost
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    fn to_row(&self) -> ExportRow {
        ExportRow {
            row: self.query.row(),
            original_title: self.query.title().to_string(),
            original_artist: self.query.artist().unwrap_or_default().to_string(),
            matched_title: self
                .candidate
                .as_ref()
                .map(|c| c.title.clone())
                .unwrap_or_default(),
            matched_artist: self
                .candidate
                .as_ref()
                .and_then(|c| c.artist.clone())
                .unwrap_or_default(),
            catalog_id: self
                .candidate
                .as_ref()
                .map(|c| c.catalog_id.clone())
                .unwrap_or_default(),
            outcome: self.outcome.as_str(),
            reason: match (&self.reason, &self.detail) {
                (Some(reason), Some(detail)) => format!("{}: {}", reason.as_str(), detail),
                (Some(reason), None) => reason.as_str().to_string(),
                (None, _) => String::new(),
            },
            tokens: self.cost.tokens,
        }
    }
}

/// Which rows to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFilter {
    #[default]
    All,
    SuccessOnly,
    FailureOnly,
    DuplicatesOnly,
}

impl ExportFilter {
    pub fn matches(&self, outcome: Outcome) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::SuccessOnly => outcome == Outcome::Added,
            ExportFilter::FailureOnly => outcome == Outcome::Failed,
            ExportFilter::DuplicatesOnly => outcome == Outcome::SkippedDuplicate,
        }
    }
}

impl std::str::FromStr for ExportFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ExportFilter::All),
            "success" | "added" => Ok(ExportFilter::SuccessOnly),
            "failure" | "failed" => Ok(ExportFilter::FailureOnly),
            "duplicates" | "duplicate" => Ok(ExportFilter::DuplicatesOnly),
            other => Err(format!(
                "unknown filter '{}' (expected all, success, failure or duplicates)",
                other
            )),
        }
    }
}

/// One exported report line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub row: usize,
    pub original_title: String,
    pub original_artist: String,
    pub matched_title: String,
    pub matched_artist: String,
    pub catalog_id: String,
    pub outcome: &'static str,
    pub reason: String,
    pub tokens: u64,
}

/// Counters over a finished (or halted) batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub searches: u64,
    /// Tokens spent by this run, including playlist setup
    pub tokens_consumed: u64,
    pub tokens_remaining: u64,
    pub added: usize,
    pub duplicates: usize,
    pub ambiguous: usize,
    pub failed: usize,
    pub not_processed: usize,
    pub halted: Option<HaltReason>,
}

/// Finalized report: records in input order plus summary counters.
#[derive(Debug, Clone)]
pub struct BatchReport {
    records: Vec<OutcomeRecord>,
    summary: BatchSummary,
}

impl BatchReport {
    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.summary.halted
    }

    pub fn record(&self, row: usize) -> Option<&OutcomeRecord> {
        self.records.iter().find(|r| r.row() == row)
    }

    /// Tabular projection, in input order.
    pub fn export(&self, filter: ExportFilter) -> Vec<ExportRow> {
        export_rows(self.records.iter(), filter)
    }

    /// Write the filtered rows as CSV with a header line.
    pub fn write_csv<W: io::Write>(&self, filter: ExportFilter, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in self.export(filter) {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn export_rows<'a>(
    records: impl Iterator<Item = &'a OutcomeRecord>,
    filter: ExportFilter,
) -> Vec<ExportRow> {
    records
        .filter(|r| filter.matches(r.outcome))
        .map(OutcomeRecord::to_row)
        .collect()
}

/// Collects outcome records for one batch.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    records: BTreeMap<usize, OutcomeRecord>,
    setup_tokens: u64,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. A second record for the same row is dropped.
    pub fn record(&mut self, record: OutcomeRecord) {
        let row = record.row();
        if self.records.contains_key(&row) {
            tracing::warn!(row, "Ignoring second outcome for row");
            return;
        }
        tracing::debug!(
            row,
            outcome = record.outcome.as_str(),
            tokens = record.cost.tokens,
            "Recorded outcome"
        );
        self.records.insert(row, record);
    }

    /// Tokens spent on playlist setup, not attributable to a row.
    pub fn add_setup_tokens(&mut self, tokens: u64) {
        self.setup_tokens += tokens;
    }

    pub fn contains(&self, row: usize) -> bool {
        self.records.contains_key(&row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counters over the records collected so far.
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.records.len(),
            tokens_consumed: self.setup_tokens,
            ..Default::default()
        };
        for record in self.records.values() {
            summary.searches += u64::from(record.cost.searches);
            summary.tokens_consumed += record.cost.tokens;
            match record.outcome {
                Outcome::Added => summary.added += 1,
                Outcome::SkippedDuplicate => summary.duplicates += 1,
                Outcome::AmbiguousSkipped => summary.ambiguous += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::NotProcessed => summary.not_processed += 1,
            }
        }
        summary
    }

    pub fn export(&self, filter: ExportFilter) -> Vec<ExportRow> {
        export_rows(self.records.values(), filter)
    }

    /// Freeze the records into a report.
    pub fn finalize(self, halted: Option<HaltReason>, tokens_remaining: u64) -> BatchReport {
        let mut summary = self.summary();
        summary.halted = halted;
        summary.tokens_remaining = tokens_remaining;
        BatchReport {
            records: self.records.into_values().collect(),
            summary,
        }
    }
}
