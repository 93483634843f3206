//! Process-wide unique ID issuance and checkpointing.
//!
//! Vertex, graph, and molecule IDs come from one shared allocator so that
//! graphs built by independent workers can later be combined without
//! collisions. A [`Checkpoint`] captures the counters; restoring one
//! guarantees no ID issued before the checkpoint is ever reissued.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// The single synchronization point of the engine.
///
/// All counters start at 1 and only ever move forward, including across
/// [`IdAllocator::restore`].
#[derive(Debug)]
pub struct IdAllocator {
    next_vertex_id: AtomicI64,
    next_graph_id: AtomicI64,
    next_molecule_id: AtomicI64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_vertex_id: AtomicI64::new(1),
            next_graph_id: AtomicI64::new(1),
            next_molecule_id: AtomicI64::new(1),
        }
    }

    pub fn next_vertex_id(&self) -> i64 {
        self.next_vertex_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_graph_id(&self) -> i64 {
        self.next_graph_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_molecule_id(&self) -> i64 {
        self.next_molecule_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot of the current counters.
    ///
    /// The `next_ids` cursor is left empty; exhaustive-enumeration drivers
    /// fill it with their own position before persisting.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            next_vertex_id: self.next_vertex_id.load(Ordering::Relaxed),
            next_graph_id: self.next_graph_id.load(Ordering::Relaxed),
            next_molecule_id: self.next_molecule_id.load(Ordering::Relaxed),
            next_ids: Vec::new(),
        }
    }

    /// Advances each counter to at least the checkpointed value.
    ///
    /// Counters never move backward, so restoring an old checkpoint onto a
    /// live allocator cannot cause ID reuse.
    pub fn restore(&self, checkpoint: &Checkpoint) {
        self.next_vertex_id
            .fetch_max(checkpoint.next_vertex_id, Ordering::Relaxed);
        self.next_graph_id
            .fetch_max(checkpoint.next_graph_id, Ordering::Relaxed);
        self.next_molecule_id
            .fetch_max(checkpoint.next_molecule_id, Ordering::Relaxed);
    }
}

/// Resume state for deterministic restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_vertex_id: i64,
    pub next_graph_id: i64,
    pub next_molecule_id: i64,
    /// Enumeration cursor of an exhaustive exploration run. Opaque to the
    /// allocator.
    #[serde(default)]
    pub next_ids: Vec<i64>,
}
