use super::attachment::BondType;

/// A declared ring closure.
///
/// Records the two ring-closing vertices joined by the chord and the
/// vertex-ID path between them through existing edges. Rings are the only
/// permitted source of cycles; the rest of the graph is a spanning tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub head: i64,
    pub tail: i64,
    /// Path from `head` to `tail` inclusive, through spanning-tree edges.
    pub path: Vec<i64>,
    /// Bond type of the chord the ring-closing pair represents.
    pub bond_type: BondType,
}

impl Ring {
    pub fn new(head: i64, tail: i64, path: Vec<i64>, bond_type: BondType) -> Self {
        Self {
            head,
            tail,
            path,
            bond_type,
        }
    }

    /// Number of vertices on the closing path, both ends included.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn involves_vertex(&self, vertex_id: i64) -> bool {
        self.path.contains(&vertex_id)
    }
}
