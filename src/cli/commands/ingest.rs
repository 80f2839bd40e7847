//! Batch ingestion and cost estimation commands.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::ingest::{BatchContext, OfflineCatalog, Orchestrator, PlaylistId, PlaylistTarget, Privacy};
use crate::model::ProcessingMode;
use crate::quota::OperationKind;
use crate::report::{BatchReport, ExportFilter};

use super::load_songs;

/// Arguments for [`cmd_ingest`].
pub struct IngestOptions<'a> {
    pub input: &'a Path,
    pub catalog: &'a Path,
    pub playlist: Option<&'a str>,
    pub new_playlist: Option<&'a str>,
    pub privacy: Option<Privacy>,
    pub mode: Option<ProcessingMode>,
    pub budget: Option<u64>,
    pub workers: Option<usize>,
    pub report: Option<&'a Path>,
    pub filter: ExportFilter,
}

/// Resolve a song list against the offline catalog and fill a playlist
pub fn cmd_ingest(rt: &Runtime, config: &Config, opts: IngestOptions<'_>) -> anyhow::Result<()> {
    let songs = load_songs(opts.input)?;
    let ledger = config.ledger(opts.budget)?;

    let mut settings = config.ingest_settings();
    if let Some(mode) = opts.mode {
        settings.mode = mode;
    }
    if let Some(workers) = opts.workers {
        settings.resolve_workers = workers.max(1);
    }

    let target = match (opts.playlist, opts.new_playlist) {
        (Some(id), _) => PlaylistTarget::Existing(PlaylistId(id.to_string())),
        (None, Some(name)) => PlaylistTarget::New {
            name: name.to_string(),
            privacy: opts.privacy.unwrap_or(config.playlist.privacy),
        },
        (None, None) => anyhow::bail!("either --playlist or --new-playlist is required"),
    };

    let catalog = Arc::new(
        OfflineCatalog::load(opts.catalog)?
            .with_max_items_per_call(config.playlist.max_items_per_call),
    );

    let estimate = ledger.estimate_run(
        songs.len().min(settings.max_batch_size),
        settings.mode,
        matches!(target, PlaylistTarget::New { .. }),
    );
    println!(
        "Ingesting {} songs ({} mode), budget {} tokens, estimated cost up to {}",
        songs.len(),
        settings.mode,
        ledger.budget(),
        estimate
    );
    if estimate > ledger.remaining() {
        println!(
            "  Budget covers about {} songs; the batch will stop when it runs out.",
            ledger.affordable_items(settings.mode)
        );
    }
    println!();

    let orchestrator = Orchestrator::new(Arc::clone(&catalog), Arc::clone(&catalog), settings)
        .with_detector(config.detector());
    let mut ctx = BatchContext::new(ledger);

    let (playlist, report) = rt.block_on(async {
        let playlist = orchestrator.prepare(&mut ctx, &target).await?;
        info!(playlist = %playlist, "Playlist ready");

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing in-flight songs");
                    cancel.cancel();
                }
            })
        };

        let report = orchestrator.run(&mut ctx, &playlist, &songs, &cancel).await;
        interrupt.abort();
        anyhow::Ok((playlist, report))
    })?;

    catalog.save()?;

    print_report(&report, opts.filter);
    println!();
    println!("Playlist: {}", playlist);

    if let Some(path) = opts.report {
        let file = std::fs::File::create(path)?;
        report.write_csv(opts.filter, file)?;
        println!("Report written to {:?}", path);
    }

    Ok(())
}

/// Project the token cost of a song list
pub fn cmd_estimate(
    config: &Config,
    input: &Path,
    mode: Option<ProcessingMode>,
    new_playlist: bool,
    budget: Option<u64>,
) -> anyhow::Result<()> {
    let songs = load_songs(input)?;
    let mut ledger = config.ledger(budget)?;
    let mode = mode.unwrap_or(config.processing.mode);

    let viable = songs.iter().filter(|s| s.is_viable()).count();
    let processed = viable.min(config.processing.max_batch_size);
    let cost = ledger.estimate_run(processed, mode, new_playlist);

    println!("Songs:        {} ({} with a title)", songs.len(), viable);
    if processed < viable {
        println!("Batch limit:  {} songs", processed);
    }
    println!("Mode:         {}", mode);
    println!("Per song:     {} tokens", ledger.estimate(1, mode));
    println!("Total:        {} tokens", cost);
    println!("Budget:       {} tokens", ledger.budget());

    let setup = if new_playlist {
        OperationKind::PlaylistCreate
    } else {
        OperationKind::PlaylistRead
    };
    if !ledger.reserve(setup) {
        println!();
        println!("✗ Budget does not even cover the playlist {}.", setup.as_str());
        return Ok(());
    }

    let affordable = ledger.affordable_items(mode);
    println!();
    if affordable >= processed {
        println!("✓ Budget covers the whole list.");
    } else {
        println!(
            "✗ Budget covers {} of {} songs; the rest would be left unprocessed.",
            affordable, processed
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport, filter: ExportFilter) {
    for record in report.records() {
        if !filter.matches(record.outcome()) {
            continue;
        }
        let matched = record
            .candidate()
            .map(|c| match &c.artist {
                Some(artist) => format!(" → {} - {} [{}]", artist, c.title, c.catalog_id),
                None => format!(" → {} [{}]", c.title, c.catalog_id),
            })
            .unwrap_or_default();
        let reason = match (record.reason(), record.detail()) {
            (Some(reason), Some(detail)) => {
                format!("  ({}: {})", reason.as_str(), detail)
            }
            (Some(reason), None) => format!("  ({})", reason.as_str()),
            (None, _) => String::new(),
        };
        println!(
            "{} {:>4}  {}{}{}",
            record.outcome().emoji(),
            record.row(),
            record.query().display(),
            matched,
            reason
        );
    }

    let s = report.summary();
    println!();
    println!("═══════════════════════════════════════");
    println!("Added:          {}", s.added);
    println!("Duplicates:     {}", s.duplicates);
    println!("Ambiguous:      {}", s.ambiguous);
    println!("Failed:         {}", s.failed);
    println!("Not processed:  {}", s.not_processed);
    println!("Searches:       {}", s.searches);
    println!("Tokens used:    {} ({} left)", s.tokens_consumed, s.tokens_remaining);
    if let Some(halt) = s.halted {
        println!("Stopped early:  {}", halt.as_str());
    }
}
