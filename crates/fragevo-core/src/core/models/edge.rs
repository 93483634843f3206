use super::attachment::BondType;

/// Non-owning reference to one attachment point: the numeric ID of the
/// vertex that owns it plus the AP's index within that vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApRef {
    pub vertex: i64,
    pub ap: usize,
}

impl ApRef {
    pub fn new(vertex: i64, ap: usize) -> Self {
        Self { vertex, ap }
    }
}

/// A connection between two attachment points.
///
/// The edge records usage of the two APs but does not own them; both must be
/// marked unavailable while the edge exists. Direction follows the spanning
/// tree: `src` is on the parent side, `trg` on the child side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: ApRef,
    pub trg: ApRef,
    pub bond_type: BondType,
}

impl Edge {
    pub fn new(src: ApRef, trg: ApRef, bond_type: BondType) -> Self {
        Self {
            src,
            trg,
            bond_type,
        }
    }

    pub fn involves_vertex(&self, vertex_id: i64) -> bool {
        self.src.vertex == vertex_id || self.trg.vertex == vertex_id
    }

    /// The end opposite to `vertex_id`, if the edge touches that vertex.
    pub fn other_end(&self, vertex_id: i64) -> Option<ApRef> {
        if self.src.vertex == vertex_id {
            Some(self.trg)
        } else if self.trg.vertex == vertex_id {
            Some(self.src)
        } else {
            None
        }
    }
}
