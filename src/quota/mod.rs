//! Daily quota accounting.
//!
//! The catalog provider enforces a hard daily limit on abstract "units".
//! Every external operation has a fixed cost, configured up front. The
//! [`QuotaLedger`] is the only place the remaining budget is decremented,
//! and it refuses any reservation that would push consumption past the
//! budget, so callers must reserve *before* making the external call.

use serde::{Deserialize, Serialize};

use crate::model::ProcessingMode;

/// Kinds of external operation that consume quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Catalog search for one query
    Search,
    /// Disambiguation detail lookup (robust mode)
    Lookup,
    /// Appending one track to a playlist
    PlaylistInsert,
    /// Creating a new playlist
    PlaylistCreate,
    /// Reading the current contents of a playlist
    PlaylistRead,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::Lookup => "lookup",
            OperationKind::PlaylistInsert => "playlist_insert",
            OperationKind::PlaylistCreate => "playlist_create",
            OperationKind::PlaylistRead => "playlist_read",
        }
    }
}

/// Token cost per operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationCosts {
    pub search: u64,
    pub lookup: u64,
    pub playlist_insert: u64,
    pub playlist_create: u64,
    pub playlist_read: u64,
}

impl Default for OperationCosts {
    fn default() -> Self {
        Self {
            search: 100,
            lookup: 1,
            playlist_insert: 50,
            playlist_create: 50,
            playlist_read: 1,
        }
    }
}

impl OperationCosts {
    pub fn cost(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::Search => self.search,
            OperationKind::Lookup => self.lookup,
            OperationKind::PlaylistInsert => self.playlist_insert,
            OperationKind::PlaylistCreate => self.playlist_create,
            OperationKind::PlaylistRead => self.playlist_read,
        }
    }
}

/// Finite token budget with per-operation costs.
///
/// Invariant: `consumed <= budget` after every call.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    budget: u64,
    consumed: u64,
    costs: OperationCosts,
}

impl QuotaLedger {
    pub fn new(budget: u64, costs: OperationCosts) -> Self {
        Self {
            budget,
            consumed: 0,
            costs,
        }
    }

    /// Create a ledger for a day that already spent part of its budget.
    ///
    /// Prior consumption above the budget is clamped to the budget.
    pub fn with_consumed(budget: u64, consumed: u64, costs: OperationCosts) -> Self {
        Self {
            budget,
            consumed: consumed.min(budget),
            costs,
        }
    }

    /// Reserve the cost of one operation.
    ///
    /// Returns `false` without deducting anything if the cost exceeds the
    /// remaining budget.
    pub fn reserve(&mut self, kind: OperationKind) -> bool {
        let cost = self.costs.cost(kind);
        if cost > self.remaining() {
            tracing::warn!(
                kind = kind.as_str(),
                cost,
                remaining = self.remaining(),
                "Quota reservation denied"
            );
            return false;
        }
        self.consumed += cost;
        tracing::debug!(kind = kind.as_str(), cost, remaining = self.remaining(), "Quota reserved");
        true
    }

    pub fn remaining(&self) -> u64 {
        self.budget - self.consumed
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn cost(&self, kind: OperationKind) -> u64 {
        self.costs.cost(kind)
    }

    pub fn costs(&self) -> &OperationCosts {
        &self.costs
    }

    /// Projected cost of processing `n` items under `mode`.
    pub fn estimate(&self, n: usize, mode: ProcessingMode) -> u64 {
        let per_item: u64 = mode.operations().iter().map(|k| self.cost(*k)).sum();
        per_item.saturating_mul(n as u64)
    }

    /// Projected cost of a whole run, including the playlist setup call.
    pub fn estimate_run(&self, n: usize, mode: ProcessingMode, creates_playlist: bool) -> u64 {
        let setup = if creates_playlist {
            self.cost(OperationKind::PlaylistCreate)
        } else {
            self.cost(OperationKind::PlaylistRead)
        };
        self.estimate(n, mode).saturating_add(setup)
    }

    /// How many whole items the remaining budget can carry under `mode`.
    pub fn affordable_items(&self, mode: ProcessingMode) -> usize {
        let per_item = self.estimate(1, mode);
        if per_item == 0 {
            return usize::MAX;
        }
        (self.remaining() / per_item) as usize
    }
}
