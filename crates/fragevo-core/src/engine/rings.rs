//! Ring closure over complementary ring-closing vertices.
//!
//! RCV pairs with matching types and a path length inside the configured
//! window become rings. Infeasible pairs are skipped with a debug log; the
//! graph stays valid without the ring.

use crate::core::models::graph::DGraph;
use crate::engine::selection::SelectionStrategy;
use tracing::debug;

/// Topological feasibility window for a ring, counted as the number of
/// vertices on the path from head RCV to tail RCV inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingClosureParams {
    pub min_path: usize,
    pub max_path: usize,
}

impl Default for RingClosureParams {
    /// Covers 3- to 7-membered rings once the RCV pair collapses into one
    /// chord bond.
    fn default() -> Self {
        Self {
            min_path: 4,
            max_path: 9,
        }
    }
}

/// Closes rings between complementary free RCV pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RingCloser {
    params: RingClosureParams,
}

impl RingCloser {
    pub fn new(params: RingClosureParams) -> Self {
        Self { params }
    }

    /// RCV pairs that could legally become rings right now: both attached,
    /// neither already in a ring, compatible types, path length in window.
    pub fn closable_pairs(&self, graph: &DGraph) -> Vec<(i64, i64)> {
        let free_rcvs: Vec<i64> = graph
            .vertices()
            .filter(|v| {
                v.is_rcv()
                    && v.used_ap_count() == 1
                    && !graph.rings().iter().any(|r| r.involves_vertex(v.id()))
            })
            .map(|v| v.id())
            .collect();

        let mut pairs = Vec::new();
        for (i, &head) in free_rcvs.iter().enumerate() {
            for &tail in &free_rcvs[i + 1..] {
                let head_type = graph.vertex(head).unwrap().rcv_type().unwrap();
                let tail_type = graph.vertex(tail).unwrap().rcv_type().unwrap();
                if !head_type.is_compatible(tail_type) {
                    continue;
                }
                let Some(path) = graph.path_between(head, tail) else {
                    continue;
                };
                if path.len() < self.params.min_path || path.len() > self.params.max_path {
                    debug!(
                        head,
                        tail,
                        path_len = path.len(),
                        "ring path outside feasibility window"
                    );
                    continue;
                }
                pairs.push((head, tail));
            }
        }
        pairs
    }

    /// Closes rings until no closable pair remains, choosing among the
    /// candidates via `strategy`. Returns the number of rings added.
    pub fn close_rings(
        &self,
        graph: &mut DGraph,
        strategy: &mut dyn SelectionStrategy,
    ) -> usize {
        let mut closed = 0;
        let mut rejected: Vec<(i64, i64)> = Vec::new();
        loop {
            let pairs: Vec<(i64, i64)> = self
                .closable_pairs(graph)
                .into_iter()
                .filter(|pair| !rejected.contains(pair))
                .collect();
            let Some(pick) = strategy.choose(pairs.len()) else {
                return closed;
            };
            let (head, tail) = pairs[pick];
            match graph.add_ring(head, tail) {
                Ok(()) => {
                    debug!(head, tail, "ring closed");
                    closed += 1;
                }
                Err(error) => {
                    // Candidate enumeration is a superset of what add_ring
                    // accepts (bond-order checks live there).
                    debug!(head, tail, %error, "ring closure rejected");
                    rejected.push((head, tail));
                }
            }
        }
    }
}
