//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `ingest`: run a batch and estimate its quota cost
//! - `normalize`: show comparison keys for titles

mod ingest;
mod normalize;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::error::{Error, Result, ResultExt};
use crate::ingest::Privacy;
use crate::model::{ProcessingMode, SongQuery};
use crate::report::ExportFilter;

pub use ingest::{IngestOptions, cmd_estimate, cmd_ingest};
pub use normalize::cmd_normalize;

/// Playlist Minder CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: the OS config directory)
    #[arg(long, global = true, env = "PLAYLIST_MINDER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a song list and append new tracks to a playlist
    Ingest {
        /// CSV file with one song per row
        #[arg(short, long)]
        input: PathBuf,
        /// Offline catalog JSON file
        #[arg(short, long)]
        catalog: PathBuf,
        /// Append to this existing playlist
        #[arg(long, conflicts_with = "new_playlist", required_unless_present = "new_playlist")]
        playlist: Option<String>,
        /// Create a new playlist with this name
        #[arg(long)]
        new_playlist: Option<String>,
        /// Privacy of a new playlist: private, unlisted, public
        #[arg(long)]
        privacy: Option<Privacy>,
        /// Processing mode: quick or robust
        #[arg(short, long)]
        mode: Option<ProcessingMode>,
        /// Daily token budget (overrides the config file)
        #[arg(short, long, env = "PLAYLIST_MINDER_BUDGET")]
        budget: Option<u64>,
        /// Concurrent searches
        #[arg(long)]
        workers: Option<usize>,
        /// Write the report as CSV
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Rows to print and export: all, success, failure, duplicates
        #[arg(long, default_value = "all")]
        filter: ExportFilter,
    },
    /// Project the token cost of a song list
    Estimate {
        /// CSV file with one song per row
        #[arg(short, long)]
        input: PathBuf,
        /// Processing mode: quick or robust
        #[arg(short, long)]
        mode: Option<ProcessingMode>,
        /// Include the cost of creating a playlist
        #[arg(long)]
        new_playlist: bool,
        /// Daily token budget (overrides the config file)
        #[arg(short, long, env = "PLAYLIST_MINDER_BUDGET")]
        budget: Option<u64>,
    },
    /// Print the comparison key for each title
    Normalize {
        /// Titles to normalize
        #[arg(required = true)]
        titles: Vec<String>,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Ingest {
            input,
            catalog,
            playlist,
            new_playlist,
            privacy,
            mode,
            budget,
            workers,
            report,
            filter,
        } => {
            let rt = Runtime::new()?;
            let config = load_config(cli.config.as_deref())?;
            cmd_ingest(
                &rt,
                &config,
                IngestOptions {
                    input,
                    catalog,
                    playlist: playlist.as_deref(),
                    new_playlist: new_playlist.as_deref(),
                    privacy: *privacy,
                    mode: *mode,
                    budget: *budget,
                    workers: *workers,
                    report: report.as_deref(),
                    filter: *filter,
                },
            )
        }
        Commands::Estimate {
            input,
            mode,
            new_playlist,
            budget,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_estimate(&config, input, *mode, *new_playlist, *budget)
        }
        Commands::Normalize { titles } => {
            cmd_normalize(titles);
            Ok(())
        }
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Explicit paths load strictly; the default location falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(config::load_from(path)?),
        None => Ok(config::load()),
    }
}

/// Header names recognised for each column.
const TITLE_HEADERS: &[&str] = &["title", "song", "track", "name", "song title"];
const ARTIST_HEADERS: &[&str] = &["artist", "artists", "singer", "band"];
const ALBUM_HEADERS: &[&str] = &["album", "record"];

/// Read a song list from a CSV file.
pub fn load_songs(path: &Path) -> Result<Vec<SongQuery>> {
    if !path.exists() {
        return Err(Error::not_found(path));
    }
    let file = std::fs::File::open(path).with_context(format!("opening {}", path.display()))?;
    read_songs(file).with_context(format!("reading {}", path.display()))
}

/// Parse CSV rows into queries.
///
/// A first row naming a title column is treated as a header, which also
/// locates optional artist and album columns. Without a header the columns
/// are title, artist, album. Rows are numbered from 1, header excluded.
pub fn read_songs<R: std::io::Read>(reader: R) -> Result<Vec<SongQuery>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = csv_reader.records();
    let Some(first) = records.next().transpose()? else {
        return Err(Error::invalid_input("song list is empty"));
    };

    let find = |names: &[&str]| {
        first
            .iter()
            .position(|cell| names.contains(&cell.to_lowercase().as_str()))
    };
    let (columns, header) = match find(TITLE_HEADERS) {
        Some(title) => ((title, find(ARTIST_HEADERS), find(ALBUM_HEADERS)), true),
        None => ((0, Some(1), Some(2)), false),
    };
    let (title_col, artist_col, album_col) = columns;

    let to_query = |row: usize, record: &csv::StringRecord| {
        let mut query = SongQuery::new(row, record.get(title_col).unwrap_or_default());
        if let Some(artist) = artist_col.and_then(|c| record.get(c)) {
            query = query.with_artist(artist);
        }
        if let Some(album) = album_col.and_then(|c| record.get(c)) {
            query = query.with_album(album);
        }
        query
    };

    let mut songs = Vec::new();
    if !header {
        songs.push(to_query(1, &first));
    }
    for record in records {
        let record = record?;
        songs.push(to_query(songs.len() + 1, &record));
    }

    if songs.is_empty() {
        return Err(Error::invalid_input("song list has a header but no rows"));
    }
    tracing::debug!(rows = songs.len(), header, "Read song list");
    Ok(songs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_locates_columns() {
        let csv = "Artist,Song Title,Album\nEd Sheeran,Shape of You,Divide\nAdele,Hello,\n";
        let songs = read_songs(csv.as_bytes()).unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].row(), 1);
        assert_eq!(songs[0].title(), "Shape of You");
        assert_eq!(songs[0].artist(), Some("Ed Sheeran"));
        assert_eq!(songs[0].album(), Some("Divide"));
        assert_eq!(songs[1].album(), None);
    }

    #[test]
    fn test_headerless_file_uses_positions() {
        let csv = "Yellow,Coldplay\nPerfect\n";
        let songs = read_songs(csv.as_bytes()).unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].title(), "Yellow");
        assert_eq!(songs[0].artist(), Some("Coldplay"));
        assert_eq!(songs[1].row(), 2);
        assert_eq!(songs[1].artist(), None);
    }

    #[test]
    fn test_blank_titles_are_kept_for_reporting() {
        let csv = "title\nOne\n\"  \"\nThree\n";
        let songs = read_songs(csv.as_bytes()).unwrap();
        assert_eq!(songs.len(), 3);
        assert!(!songs[1].is_viable());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(read_songs("".as_bytes()), Err(Error::InvalidInput(_))));
        assert!(matches!(
            read_songs("title\n".as_bytes()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_songs(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_cli_parses_ingest() {
        let cli = Cli::try_parse_from([
            "playlist-minder",
            "ingest",
            "--input",
            "songs.csv",
            "--catalog",
            "catalog.json",
            "--new-playlist",
            "Road Trip",
            "--mode",
            "robust",
            "--filter",
            "failure",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                new_playlist,
                mode,
                filter,
                ..
            } => {
                assert_eq!(new_playlist.as_deref(), Some("Road Trip"));
                assert_eq!(mode, Some(ProcessingMode::Robust));
                assert_eq!(filter, ExportFilter::FailureOnly);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_cli_requires_a_playlist_target() {
        let result = Cli::try_parse_from([
            "playlist-minder",
            "ingest",
            "--input",
            "songs.csv",
            "--catalog",
            "catalog.json",
        ]);
        assert!(result.is_err());
    }
}
