//! Playlist Minder - quota-aware ingestion of song lists into playlists.
//!
//! Each song in a list is resolved against a music catalog, checked against
//! what the target playlist already holds, and appended if new, without ever
//! spending more of the provider's daily quota than the budget allows.

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod model;
pub mod quota;
pub mod report;
#[cfg(test)]
pub mod test_utils;
