//! Quota-aware batch ingestion - resolves song queries and appends new
//! tracks to a playlist.
//!
//! # Architecture
//!
//! - **Domain models** (`domain.rs`) - playlist identifiers, targets and the
//!   collaborator error taxonomy
//! - **Traits** (`traits.rs`) - the catalog search and playlist mutation
//!   capabilities the orchestrator consumes
//! - **Retry** (`retry.rs`) - bounded backoff for playlist mutations
//! - **Orchestrator** (`orchestrator.rs`) - the per-item pipeline and batch
//!   halting rules
//! - **Offline** (`offline.rs`) - a JSON-backed catalog for dry runs
//!
//! # Usage
//!
//! ```ignore
//! use playlist_minder::ingest::{BatchContext, Orchestrator, PlaylistTarget};
//!
//! let orchestrator = Orchestrator::new(resolver, mutator, config.ingest_settings());
//! let mut ctx = BatchContext::new(config.ledger(None)?);
//! let playlist = orchestrator.prepare(&mut ctx, &target).await?;
//! let report = orchestrator.run(&mut ctx, &playlist, &queries, &cancel).await;
//! ```

pub mod domain;
pub mod offline;
pub mod orchestrator;
pub mod retry;
pub mod traits;

pub use domain::{AppendResult, CatalogError, IngestError, PlaylistEntry, PlaylistId, PlaylistTarget, Privacy};
pub use offline::{CatalogData, OfflineCatalog};
pub use orchestrator::{BatchContext, IngestSettings, Orchestrator};
pub use retry::RetryPolicy;
pub use traits::{PlaylistMutator, ResolutionClient};
