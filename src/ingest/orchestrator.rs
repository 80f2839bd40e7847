//! Quota-aware batch ingestion.
//!
//! Every item moves through reserve → resolve → deduplicate → mutate →
//! record. Resolution may run on a small pool of concurrent searches, but
//! results are settled strictly in input order: quota reservations after the
//! search, known-track updates and playlist appends all happen at that single
//! serialization point.
//!
//! The batch state ([`BatchContext`]) is owned by the caller and passed in
//! explicitly, so separate batches never share a ledger or a known-track set.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use tokio_util::sync::CancellationToken;

use super::domain::{CatalogError, IngestError, PlaylistId, PlaylistTarget};
use super::retry::RetryPolicy;
use super::traits::{PlaylistMutator, ResolutionClient};
use crate::matching::{Assessment, DuplicateDetector, KnownTracks};
use crate::model::{CandidateMatch, ProcessingMode, SongQuery, rank_candidates};
use crate::quota::{OperationKind, QuotaLedger};
use crate::report::{BatchReport, HaltReason, ItemCost, OutcomeRecord, Reason, ReportAggregator};

/// Mutable state of one batch run. Single owner, never shared.
#[derive(Debug)]
pub struct BatchContext {
    ledger: QuotaLedger,
    known: KnownTracks,
    /// Entries currently in the target playlist
    playlist_size: usize,
    /// Tokens spent on playlist setup and not yet reported
    setup_tokens: u64,
}

impl BatchContext {
    pub fn new(ledger: QuotaLedger) -> Self {
        Self {
            ledger,
            known: KnownTracks::new(),
            playlist_size: 0,
            setup_tokens: 0,
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn known(&self) -> &KnownTracks {
        &self.known
    }

    pub fn playlist_size(&self) -> usize {
        self.playlist_size
    }

    fn reserve_setup(&mut self, kind: OperationKind) -> Result<(), IngestError> {
        if self.ledger.reserve(kind) {
            self.setup_tokens += self.ledger.cost(kind);
            Ok(())
        } else {
            Err(IngestError::QuotaExhausted {
                operation: kind.as_str(),
                needed: self.ledger.cost(kind),
                remaining: self.ledger.remaining(),
            })
        }
    }
}

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub mode: ProcessingMode,
    /// Deadline for every external call
    pub per_item_timeout: Duration,
    /// Rows past this are not processed
    pub max_batch_size: usize,
    /// Concurrent searches (1 = strictly sequential)
    pub resolve_workers: usize,
    /// Applied to playlist mutations only
    pub retry: RetryPolicy,
    /// Upper bound on identifiers per append call
    pub max_items_per_call: usize,
    pub playlist_capacity: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Quick,
            per_item_timeout: Duration::from_secs(10),
            max_batch_size: 500,
            resolve_workers: 1,
            retry: RetryPolicy::default(),
            max_items_per_call: 50,
            playlist_capacity: 5000,
        }
    }
}

/// Search result for one query, ready to be settled.
struct Resolved {
    query: SongQuery,
    result: Result<Vec<CandidateMatch>, CatalogError>,
}

/// Accepted item waiting for the batched append.
struct Accepted {
    query: SongQuery,
    candidate: CandidateMatch,
    cost: ItemCost,
}

/// Bookkeeping for a single `run` call.
#[derive(Default)]
struct RunState {
    report: ReportAggregator,
    pending: Vec<Accepted>,
    halt: Option<HaltReason>,
    /// The playlist provider refused credentials; nothing more is appended
    append_refused: bool,
}

impl RunState {
    fn halt(&mut self, reason: HaltReason) {
        if self.halt.is_none() {
            tracing::warn!(reason = reason.as_str(), "Halting batch");
            self.halt = Some(reason);
        }
    }

    fn is_halted(&self) -> bool {
        self.halt.is_some()
    }
}

/// Drives a batch of queries into a playlist.
pub struct Orchestrator<R, M> {
    resolver: R,
    mutator: M,
    detector: DuplicateDetector,
    settings: IngestSettings,
}

impl<R: ResolutionClient, M: PlaylistMutator> Orchestrator<R, M> {
    pub fn new(resolver: R, mutator: M, settings: IngestSettings) -> Self {
        Self {
            resolver,
            mutator,
            detector: DuplicateDetector::default(),
            settings,
        }
    }

    pub fn with_detector(mut self, detector: DuplicateDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn mutator(&self) -> &M {
        &self.mutator
    }

    fn chunk_size(&self) -> usize {
        self.settings
            .max_items_per_call
            .min(self.mutator.max_items_per_call())
            .max(1)
    }

    /// Create or open the target playlist and seed the known tracks.
    ///
    /// Fails before any item is processed if setup cannot be paid for or the
    /// provider refuses it.
    pub async fn prepare(
        &self,
        ctx: &mut BatchContext,
        target: &PlaylistTarget,
    ) -> Result<PlaylistId, IngestError> {
        let deadline = self.settings.per_item_timeout;

        match target {
            PlaylistTarget::New { name, privacy } => {
                ctx.reserve_setup(OperationKind::PlaylistCreate)?;
                let id = self
                    .settings
                    .retry
                    .run("create_playlist", deadline, || {
                        self.mutator.create_playlist(name, *privacy)
                    })
                    .await?;
                tracing::info!(playlist = %id, privacy = privacy.as_str(), "Created playlist");
                Ok(id)
            }
            PlaylistTarget::Existing(id) => {
                ctx.reserve_setup(OperationKind::PlaylistRead)?;
                let entries = tokio::time::timeout(deadline, self.mutator.existing_tracks(id))
                    .await
                    .map_err(|_| CatalogError::Timeout)??;

                for entry in &entries {
                    ctx.known
                        .insert(&entry.catalog_id, &entry.title, entry.artist.as_deref());
                }
                ctx.playlist_size = entries.len();
                tracing::info!(
                    playlist = %id,
                    tracks = entries.len(),
                    "Seeded known tracks from playlist"
                );
                Ok(id.clone())
            }
        }
    }

    /// Process `queries` into `playlist`.
    ///
    /// Always returns a report, also when the batch halts early. Rows that
    /// were never reached are recorded as not processed.
    pub async fn run(
        &self,
        ctx: &mut BatchContext,
        playlist: &PlaylistId,
        queries: &[SongQuery],
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut state = RunState::default();
        state.report.add_setup_tokens(std::mem::take(&mut ctx.setup_tokens));

        let limit = self.settings.max_batch_size.min(queries.len());
        let (batch, overflow) = queries.split_at(limit);
        for query in overflow {
            state.report.record(OutcomeRecord::not_processed(
                query.clone(),
                Reason::BatchLimit,
                None,
                ItemCost::default(),
            ));
        }
        if !overflow.is_empty() {
            tracing::warn!(
                limit,
                skipped = overflow.len(),
                "Input exceeds batch size, extra rows not processed"
            );
        }

        tracing::info!(
            playlist = %playlist,
            items = batch.len(),
            mode = self.settings.mode.as_str(),
            remaining = ctx.ledger.remaining(),
            "Starting batch"
        );

        let mut queue: VecDeque<SongQuery> = batch.iter().cloned().collect();
        let mut in_flight = FuturesOrdered::new();
        let workers = self.settings.resolve_workers.max(1);

        loop {
            while !state.is_halted() && in_flight.len() < workers {
                if cancel.is_cancelled() {
                    state.halt(HaltReason::Cancelled);
                    break;
                }
                let Some(query) = queue.pop_front() else {
                    break;
                };
                if !query.is_viable() {
                    tracing::debug!(row = query.row(), "Skipping row without title");
                    state.report.record(OutcomeRecord::failed(
                        query,
                        Reason::InvalidInput,
                        Some("empty title".to_string()),
                        None,
                        ItemCost::default(),
                    ));
                    continue;
                }
                if !self.can_prefetch(ctx, in_flight.len()) {
                    queue.push_front(query);
                    break;
                }
                if !ctx.ledger.reserve(OperationKind::Search) {
                    queue.push_front(query);
                    state.halt(HaltReason::QuotaExhausted);
                    break;
                }
                tracing::debug!(row = query.row(), "Dispatching search");
                in_flight.push_back(self.resolve(query));
            }

            let Some(resolved) = in_flight.next().await else {
                break;
            };
            self.settle(ctx, resolved, &mut state).await;

            if state.pending.len() >= self.chunk_size() {
                self.flush(ctx, playlist, &mut state).await;
            }
        }

        self.flush(ctx, playlist, &mut state).await;

        let reason = state.halt.map(|h| h.reason()).unwrap_or(Reason::Cancelled);
        for query in queue {
            state.report.record(OutcomeRecord::not_processed(
                query,
                reason,
                None,
                ItemCost::default(),
            ));
        }

        let report = state.report.finalize(state.halt, ctx.ledger.remaining());
        let summary = report.summary();
        tracing::info!(
            added = summary.added,
            duplicates = summary.duplicates,
            ambiguous = summary.ambiguous,
            failed = summary.failed,
            not_processed = summary.not_processed,
            tokens = summary.tokens_consumed,
            halted = summary.halted.map(|h| h.as_str()),
            "Batch finished"
        );
        report
    }

    /// With searches already in flight, only start another one if the
    /// budget still covers the rest of every in-flight item as well.
    fn can_prefetch(&self, ctx: &BatchContext, in_flight: usize) -> bool {
        if in_flight == 0 {
            return true;
        }
        let search = ctx.ledger.cost(OperationKind::Search);
        let tail = ctx.ledger.estimate(1, self.settings.mode).saturating_sub(search);
        let needed = tail
            .saturating_mul(in_flight as u64 + 1)
            .saturating_add(search);
        ctx.ledger.remaining() >= needed
    }

    /// Search for one query under the per-item deadline.
    ///
    /// Dropping the timed-out search cancels it.
    async fn resolve(&self, query: SongQuery) -> Resolved {
        let search = self.resolver.search(&query, self.settings.mode);
        let result = match tokio::time::timeout(self.settings.per_item_timeout, search).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(row = query.row(), "Search deadline exceeded");
                Err(CatalogError::Timeout)
            }
        };
        Resolved { query, result }
    }

    async fn settle(&self, ctx: &mut BatchContext, resolved: Resolved, state: &mut RunState) {
        let Resolved { query, result } = resolved;
        let mode = self.settings.mode;
        let mut cost = ItemCost {
            searches: 1,
            tokens: ctx.ledger.cost(OperationKind::Search),
        };

        let mut candidates = match result {
            Ok(candidates) if candidates.is_empty() => {
                tracing::debug!(row = query.row(), "No candidates");
                state.report.record(OutcomeRecord::failed(
                    query,
                    Reason::NotFound,
                    None,
                    None,
                    cost,
                ));
                return;
            }
            Ok(candidates) => candidates,
            Err(e) => {
                self.record_failure(query, &e, None, cost, state);
                return;
            }
        };
        rank_candidates(&mut candidates);

        if mode == ProcessingMode::Robust {
            if !ctx.ledger.reserve(OperationKind::Lookup) {
                state.report.record(OutcomeRecord::not_processed(
                    query,
                    Reason::QuotaExhausted,
                    candidates.into_iter().next(),
                    cost,
                ));
                state.halt(HaltReason::QuotaExhausted);
                return;
            }
            cost.tokens += ctx.ledger.cost(OperationKind::Lookup);

            let lookup = self.resolver.lookup(&candidates);
            match tokio::time::timeout(self.settings.per_item_timeout, lookup).await {
                Ok(Ok(detailed)) if !detailed.is_empty() => {
                    candidates = detailed;
                    rank_candidates(&mut candidates);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    let top = candidates.into_iter().next();
                    self.record_failure(query, &e, top, cost, state);
                    return;
                }
                Err(_) => {
                    let top = candidates.into_iter().next();
                    self.record_failure(query, &CatalogError::Timeout, top, cost, state);
                    return;
                }
            }
        }

        match self.detector.assess(&candidates, &ctx.known, mode) {
            Some(Assessment::Duplicate { candidate, signal }) => {
                tracing::debug!(
                    row = query.row(),
                    catalog_id = %candidate.catalog_id,
                    signal = %signal.describe(),
                    "Duplicate"
                );
                state.report.record(OutcomeRecord::duplicate(
                    query,
                    candidate.clone(),
                    &signal,
                    cost,
                ));
            }
            Some(Assessment::Ambiguous {
                candidate,
                runner_up,
            }) => {
                tracing::debug!(row = query.row(), catalog_id = %candidate.catalog_id, "Ambiguous");
                state.report.record(OutcomeRecord::ambiguous(
                    query,
                    candidate.clone(),
                    runner_up,
                    cost,
                ));
            }
            Some(Assessment::Accept(candidate)) => {
                let candidate = candidate.clone();
                self.accept(ctx, query, candidate, cost, state);
            }
            None => {
                state.report.record(OutcomeRecord::failed(
                    query,
                    Reason::NotFound,
                    None,
                    None,
                    cost,
                ));
            }
        }
    }

    fn accept(
        &self,
        ctx: &mut BatchContext,
        query: SongQuery,
        candidate: CandidateMatch,
        mut cost: ItemCost,
        state: &mut RunState,
    ) {
        if ctx.playlist_size + state.pending.len() >= self.settings.playlist_capacity {
            state.report.record(OutcomeRecord::not_processed(
                query,
                Reason::PlaylistFull,
                Some(candidate),
                cost,
            ));
            state.halt(HaltReason::PlaylistFull);
            return;
        }
        if !ctx.ledger.reserve(OperationKind::PlaylistInsert) {
            state.report.record(OutcomeRecord::not_processed(
                query,
                Reason::QuotaExhausted,
                Some(candidate),
                cost,
            ));
            state.halt(HaltReason::QuotaExhausted);
            return;
        }
        cost.tokens += ctx.ledger.cost(OperationKind::PlaylistInsert);
        ctx.known.hold(&candidate);

        tracing::debug!(
            row = query.row(),
            catalog_id = %candidate.catalog_id,
            "Queued for append"
        );
        state.pending.push(Accepted {
            query,
            candidate,
            cost,
        });
    }

    fn record_failure(
        &self,
        query: SongQuery,
        error: &CatalogError,
        candidate: Option<CandidateMatch>,
        cost: ItemCost,
        state: &mut RunState,
    ) {
        if error.is_fatal() {
            tracing::error!(row = query.row(), error = %error, "Catalog refused credentials");
            state.halt(HaltReason::Unauthorized);
        } else {
            tracing::debug!(row = query.row(), error = %error, "Item failed");
        }
        state.report.record(OutcomeRecord::failed(
            query,
            Reason::from(error),
            Some(error.to_string()),
            candidate,
            cost,
        ));
    }

    /// Append every queued item, in chunks the provider accepts.
    async fn flush(&self, ctx: &mut BatchContext, playlist: &PlaylistId, state: &mut RunState) {
        let mut batch = std::mem::take(&mut state.pending);
        while !batch.is_empty() {
            let rest = batch.split_off(batch.len().min(self.chunk_size()));
            self.append_chunk(ctx, playlist, batch, state).await;
            batch = rest;
        }
    }

    /// Append one chunk and reconcile per-identifier results.
    ///
    /// Retryable failures are retried as a smaller chunk after backoff, each
    /// retried identifier paying for its insert again.
    async fn append_chunk(
        &self,
        ctx: &mut BatchContext,
        playlist: &PlaylistId,
        chunk: Vec<Accepted>,
        state: &mut RunState,
    ) {
        let retry = self.settings.retry;
        let mut attempt = 1;
        let mut waiting = chunk;

        loop {
            if state.append_refused {
                for item in waiting {
                    ctx.known.release(&item.candidate.catalog_id);
                    state.report.record(OutcomeRecord::failed(
                        item.query,
                        Reason::Unauthorized,
                        Some("batch halted before append".to_string()),
                        Some(item.candidate),
                        item.cost,
                    ));
                }
                return;
            }

            let ids: Vec<String> = waiting
                .iter()
                .map(|item| item.candidate.catalog_id.clone())
                .collect();
            tracing::debug!(playlist = %playlist, count = ids.len(), attempt, "Appending chunk");

            let append = self.mutator.append_tracks(playlist, &ids);
            let outcome = match tokio::time::timeout(self.settings.per_item_timeout, append).await {
                Ok(outcome) => outcome,
                Err(_) => Err(CatalogError::Timeout),
            };

            let mut failed: Vec<(Accepted, CatalogError)> = Vec::new();
            match outcome {
                Ok(results) => {
                    let mut by_id: HashMap<String, Result<(), CatalogError>> = results
                        .into_iter()
                        .map(|r| (r.catalog_id, r.result))
                        .collect();
                    for item in waiting {
                        match by_id.remove(&item.candidate.catalog_id) {
                            Some(Ok(())) => {
                                ctx.known.confirm(&item.candidate.catalog_id);
                                ctx.playlist_size += 1;
                                tracing::debug!(
                                    row = item.query.row(),
                                    catalog_id = %item.candidate.catalog_id,
                                    "Added"
                                );
                                state.report.record(OutcomeRecord::added(
                                    item.query,
                                    item.candidate,
                                    item.cost,
                                ));
                            }
                            Some(Err(e)) => failed.push((item, e)),
                            None => failed.push((
                                item,
                                CatalogError::Parse("no result reported for identifier".into()),
                            )),
                        }
                    }
                }
                Err(e) => {
                    failed = waiting.into_iter().map(|item| (item, e.clone())).collect();
                }
            }

            if failed.is_empty() {
                return;
            }
            if let Some((_, e)) = failed.iter().find(|(_, e)| e.is_fatal()) {
                tracing::error!(error = %e, "Playlist provider refused credentials");
                state.append_refused = true;
                state.halt(HaltReason::Unauthorized);
            }

            let can_retry = retry.allows_another(attempt);
            let (retryable, terminal): (Vec<_>, Vec<_>) = failed
                .into_iter()
                .partition(|(_, e)| can_retry && e.is_retryable());

            for (item, e) in terminal {
                ctx.known.release(&item.candidate.catalog_id);
                tracing::warn!(row = item.query.row(), error = %e, "Append failed");
                state.report.record(OutcomeRecord::failed(
                    item.query,
                    Reason::from(&e),
                    Some(e.to_string()),
                    Some(item.candidate),
                    item.cost,
                ));
            }
            if retryable.is_empty() {
                return;
            }
            if state.append_refused {
                waiting = retryable.into_iter().map(|(item, _)| item).collect();
                continue;
            }

            let wait = retry.backoff(attempt);
            tracing::warn!(count = retryable.len(), attempt, "Retrying append in {:?}", wait);
            tokio::time::sleep(wait).await;
            attempt += 1;

            waiting = Vec::with_capacity(retryable.len());
            for (mut item, e) in retryable {
                if ctx.ledger.reserve(OperationKind::PlaylistInsert) {
                    item.cost.tokens += ctx.ledger.cost(OperationKind::PlaylistInsert);
                    waiting.push(item);
                } else {
                    ctx.known.release(&item.candidate.catalog_id);
                    state.report.record(OutcomeRecord::failed(
                        item.query,
                        Reason::QuotaExhausted,
                        Some(format!("retry not affordable after: {}", e)),
                        Some(item.candidate),
                        item.cost,
                    ));
                    state.halt(HaltReason::QuotaExhausted);
                }
            }
            if waiting.is_empty() {
                return;
            }
        }
    }
}
