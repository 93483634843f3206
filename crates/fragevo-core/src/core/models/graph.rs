use super::attachment::AttachmentPoint;
use super::edge::{ApRef, Edge};
use super::ids::VertexKey;
use super::ring::Ring;
use super::symmetry::SymmetricSet;
use super::vertex::{Vertex, VertexKind};
use crate::core::fragspace::FragmentSpace;
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate vertex ID {0}")]
    DuplicateVertexId(i64),
    #[error("Vertex {0} not found in graph")]
    VertexNotFound(i64),
    #[error("Attachment point index {ap} out of range on vertex {vertex}")]
    ApIndexOutOfRange { vertex: i64, ap: usize },
    #[error("Attachment point {ap} on vertex {vertex} is already used")]
    AttachmentPointUnavailable { vertex: i64, ap: usize },
    #[error("Attachment point classes '{src}' and '{trg}' are not compatible")]
    IncompatibleAttachmentPoints { src: String, trg: String },
    #[error("Vertex {0} already has a parent edge")]
    ParentConflict(i64),
    #[error("Edge from {src} to {trg} would close an undeclared cycle")]
    UndeclaredCycle { src: i64, trg: i64 },
    #[error("Invalid ring closure: {0}")]
    InvalidRingClosure(String),
    #[error("Vertex ID {0} present in both graphs")]
    IdCollision(i64),
    #[error("Graph inconsistency: {0}")]
    Inconsistency(String),
}

/// The molecular-design graph.
///
/// Owns its vertices, the edges joining their attachment points, declared
/// rings, and symmetric-vertex sets. Vertices are stored in a slot map and
/// addressed externally by their numeric ID through an index map; insertion
/// order is preserved and the first vertex is the source (scaffold root).
///
/// Every edit either succeeds and preserves the invariants (unique vertex
/// IDs, edge endpoints present, each used AP consumed by exactly one edge,
/// cycles only through declared rings) or fails with a [`GraphError`] and
/// leaves the graph unchanged.
#[derive(Debug, Clone, Default)]
pub struct DGraph {
    vertices: SlotMap<VertexKey, Vertex>,
    order: Vec<VertexKey>,
    id_index: HashMap<i64, VertexKey>,
    edges: Vec<Edge>,
    rings: Vec<Ring>,
    symmetric_sets: Vec<SymmetricSet>,
    graph_id: i64,
    level: i32,
}

impl DGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph_id(graph_id: i64) -> Self {
        Self {
            graph_id,
            ..Self::default()
        }
    }

    pub fn graph_id(&self) -> i64 {
        self.graph_id
    }

    pub fn set_graph_id(&mut self, graph_id: i64) {
        self.graph_id = graph_id;
    }

    /// Generation depth in a fragment-space-exploration run.
    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn set_level(&mut self, level: i32) {
        self.level = level;
    }

    pub fn vertex_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    pub fn contains_vertex(&self, vertex_id: i64) -> bool {
        self.id_index.contains_key(&vertex_id)
    }

    /// Iterates vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.order.iter().map(|k| &self.vertices[*k])
    }

    pub fn vertex_ids(&self) -> Vec<i64> {
        self.vertices().map(|v| v.id()).collect()
    }

    /// All vertex IDs, including those of graphs embedded in templates.
    pub fn vertex_ids_recursive(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, out: &mut Vec<i64>) {
        for v in self.vertices() {
            out.push(v.id());
            if let VertexKind::Template(t) = &v.kind {
                t.inner.collect_ids(out);
            }
        }
    }

    /// Returns the vertex or `None`; absence is an expected branch during
    /// deep lookups through template chains.
    pub fn vertex(&self, vertex_id: i64) -> Option<&Vertex> {
        let key = *self.id_index.get(&vertex_id)?;
        self.vertices.get(key)
    }

    pub fn vertex_mut(&mut self, vertex_id: i64) -> Option<&mut Vertex> {
        let key = *self.id_index.get(&vertex_id)?;
        self.vertices.get_mut(key)
    }

    /// The root of the spanning tree: the first vertex added.
    pub fn source(&self) -> Option<&Vertex> {
        self.order.first().map(|k| &self.vertices[*k])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn symmetric_sets(&self) -> &[SymmetricSet] {
        &self.symmetric_sets
    }

    pub fn ap(&self, ap_ref: ApRef) -> Option<&AttachmentPoint> {
        self.vertex(ap_ref.vertex)?.ap(ap_ref.ap)
    }

    fn ap_mut(&mut self, ap_ref: ApRef) -> Option<&mut AttachmentPoint> {
        self.vertex_mut(ap_ref.vertex)?.ap_mut(ap_ref.ap)
    }

    /// All free attachment points, in vertex insertion order.
    pub fn free_aps(&self) -> Vec<ApRef> {
        let mut out = Vec::new();
        for v in self.vertices() {
            for i in v.free_ap_indices() {
                out.push(ApRef::new(v.id(), i));
            }
        }
        out
    }

    pub fn used_ap_count(&self) -> usize {
        self.vertices().map(|v| v.used_ap_count()).sum()
    }

    /// Appends a vertex; fails if its ID is already present.
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), GraphError> {
        let id = vertex.id();
        if self.id_index.contains_key(&id) {
            return Err(GraphError::DuplicateVertexId(id));
        }
        let key = self.vertices.insert(vertex);
        self.order.push(key);
        self.id_index.insert(id, key);
        Ok(())
    }

    fn validate_endpoint(&self, ap_ref: ApRef) -> Result<&AttachmentPoint, GraphError> {
        let vertex = self
            .vertex(ap_ref.vertex)
            .ok_or(GraphError::VertexNotFound(ap_ref.vertex))?;
        let ap = vertex.ap(ap_ref.ap).ok_or(GraphError::ApIndexOutOfRange {
            vertex: ap_ref.vertex,
            ap: ap_ref.ap,
        })?;
        if ap.is_used() {
            return Err(GraphError::AttachmentPointUnavailable {
                vertex: ap_ref.vertex,
                ap: ap_ref.ap,
            });
        }
        Ok(ap)
    }

    fn validate_edge(&self, edge: &Edge, space: Option<&FragmentSpace>) -> Result<(), GraphError> {
        let src_ap = self.validate_endpoint(edge.src)?;
        let trg_ap = self.validate_endpoint(edge.trg)?;
        // Cycles exist only through declared rings: every vertex has at most
        // one incoming edge and no edge may point back into its own branch.
        if self.edge_to_parent(edge.trg.vertex).is_some() {
            return Err(GraphError::ParentConflict(edge.trg.vertex));
        }
        if self.branch_ids(edge.trg.vertex).contains(&edge.src.vertex) {
            return Err(GraphError::UndeclaredCycle {
                src: edge.src.vertex,
                trg: edge.trg.vertex,
            });
        }
        if let (Some(space), Some(src_class), Some(trg_class)) =
            (space, &src_ap.class, &trg_ap.class)
        {
            if !space.compatible(src_class, trg_class) {
                return Err(GraphError::IncompatibleAttachmentPoints {
                    src: src_class.to_string(),
                    trg: trg_class.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Joins two free attachment points.
    ///
    /// When a fragment space is given, the AP classes must be compatible
    /// under its rules; decoding a persisted graph passes `None` because the
    /// edges were already legal under the space that produced them.
    pub fn add_edge(&mut self, edge: Edge, space: Option<&FragmentSpace>) -> Result<(), GraphError> {
        self.validate_edge(&edge, space)?;
        self.ap_mut(edge.src).unwrap().mark_used();
        self.ap_mut(edge.trg).unwrap().mark_used();
        self.edges.push(edge);
        Ok(())
    }

    pub fn edge_index_between(&self, a: i64, b: i64) -> Option<usize> {
        self.edges
            .iter()
            .position(|e| e.involves_vertex(a) && e.involves_vertex(b))
    }

    /// Removes the edge at `index`, freeing both attachment points.
    pub fn remove_edge_at(&mut self, index: usize) -> Option<Edge> {
        if index >= self.edges.len() {
            return None;
        }
        let edge = self.edges.remove(index);
        if let Some(ap) = self.ap_mut(edge.src) {
            ap.release();
        }
        if let Some(ap) = self.ap_mut(edge.trg) {
            ap.release();
        }
        Some(edge)
    }

    pub fn remove_edge_between(&mut self, a: i64, b: i64) -> Result<Edge, GraphError> {
        let index = self
            .edge_index_between(a, b)
            .ok_or(GraphError::Inconsistency(format!(
                "No edge between vertices {a} and {b}"
            )))?;
        Ok(self.remove_edge_at(index).unwrap())
    }

    /// Parent in the spanning tree, i.e. the vertex on the `src` side of the
    /// edge whose `trg` is on this vertex.
    pub fn parent_of(&self, vertex_id: i64) -> Option<i64> {
        self.edge_to_parent(vertex_id).map(|e| e.src.vertex)
    }

    pub fn edge_to_parent(&self, vertex_id: i64) -> Option<&Edge> {
        self.edges.iter().find(|e| e.trg.vertex == vertex_id)
    }

    pub fn children_of(&self, vertex_id: i64) -> Vec<i64> {
        self.edges
            .iter()
            .filter(|e| e.src.vertex == vertex_id)
            .map(|e| e.trg.vertex)
            .collect()
    }

    /// The vertex and all its spanning-tree descendants, preorder.
    pub fn branch_ids(&self, root_id: i64) -> Vec<i64> {
        if !self.contains_vertex(root_id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut stack = vec![root_id];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.children_of(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Removes a vertex, detaching its edges (freeing the partner APs),
    /// dropping rings that pass through it, and scrubbing symmetric sets.
    pub fn remove_vertex(&mut self, vertex_id: i64) -> Result<Vertex, GraphError> {
        let key = *self
            .id_index
            .get(&vertex_id)
            .ok_or(GraphError::VertexNotFound(vertex_id))?;

        while let Some(index) = self.edges.iter().position(|e| e.involves_vertex(vertex_id)) {
            self.remove_edge_at(index);
        }
        self.rings.retain(|r| !r.involves_vertex(vertex_id));
        for set in &mut self.symmetric_sets {
            set.remove(vertex_id);
        }
        self.symmetric_sets.retain(|s| s.len() >= 2);

        self.order.retain(|k| *k != key);
        self.id_index.remove(&vertex_id);
        Ok(self.vertices.remove(key).unwrap())
    }

    /// Removes the vertex and everything downstream of it.
    pub fn remove_branch(&mut self, root_id: i64) -> Result<(), GraphError> {
        let branch = self.branch_ids(root_id);
        if branch.is_empty() {
            return Err(GraphError::VertexNotFound(root_id));
        }
        for id in branch.into_iter().rev() {
            self.remove_vertex(id)?;
        }
        Ok(())
    }

    /// Spanning-tree path between two vertices, both ends included.
    pub fn path_between(&self, a: i64, b: i64) -> Option<Vec<i64>> {
        if !self.contains_vertex(a) || !self.contains_vertex(b) {
            return None;
        }
        let mut a_chain = vec![a];
        let mut cur = a;
        while let Some(p) = self.parent_of(cur) {
            a_chain.push(p);
            cur = p;
        }
        let a_set: HashSet<i64> = a_chain.iter().copied().collect();

        let mut b_chain = vec![b];
        cur = b;
        while !a_set.contains(&cur) {
            match self.parent_of(cur) {
                Some(p) => {
                    b_chain.push(p);
                    cur = p;
                }
                None => return None, // disjoint components
            }
        }
        let junction = cur;
        let mut path: Vec<i64> = a_chain
            .iter()
            .copied()
            .take_while(|id| *id != junction)
            .collect();
        path.push(junction);
        for id in b_chain.iter().rev() {
            if *id != junction {
                path.push(*id);
            }
        }
        Some(path)
    }

    /// Declares a ring between two ring-closing vertices.
    ///
    /// Both must be RCVs with compatible types, not already part of a ring,
    /// and connected by a spanning-tree path.
    pub fn add_ring(&mut self, head_id: i64, tail_id: i64) -> Result<(), GraphError> {
        let head = self
            .vertex(head_id)
            .ok_or(GraphError::VertexNotFound(head_id))?;
        let tail = self
            .vertex(tail_id)
            .ok_or(GraphError::VertexNotFound(tail_id))?;
        let (ht, tt) = match (head.rcv_type(), tail.rcv_type()) {
            (Some(ht), Some(tt)) => (ht, tt),
            _ => {
                return Err(GraphError::InvalidRingClosure(format!(
                    "Vertices {head_id} and {tail_id} are not both ring-closing"
                )));
            }
        };
        if !ht.is_compatible(tt) {
            return Err(GraphError::InvalidRingClosure(format!(
                "Incompatible ring-closing types {} and {}",
                ht.label(),
                tt.label()
            )));
        }
        if self
            .rings
            .iter()
            .any(|r| r.involves_vertex(head_id) || r.involves_vertex(tail_id))
        {
            return Err(GraphError::InvalidRingClosure(format!(
                "Vertex {head_id} or {tail_id} already belongs to a ring"
            )));
        }
        let bond_type = head
            .ap(0)
            .map(|ap| ap.bond_type)
            .filter(|bt| bt.valence_order().is_some())
            .unwrap_or_default();
        let path = self
            .path_between(head_id, tail_id)
            .ok_or(GraphError::InvalidRingClosure(format!(
                "No path between vertices {head_id} and {tail_id}"
            )))?;
        self.rings.push(Ring::new(head_id, tail_id, path, bond_type));
        Ok(())
    }

    /// Registers a symmetric-vertex set, merging it with any existing set it
    /// overlaps. All IDs must name vertices of this graph.
    pub fn add_symmetric_set(&mut self, set: SymmetricSet) -> Result<(), GraphError> {
        for &id in set.ids() {
            if !self.contains_vertex(id) {
                return Err(GraphError::VertexNotFound(id));
            }
        }
        let mut merged = set;
        let mut kept = Vec::with_capacity(self.symmetric_sets.len());
        for existing in self.symmetric_sets.drain(..) {
            if existing.ids().iter().any(|id| merged.contains(*id)) {
                for &id in existing.ids() {
                    merged.add(id);
                }
            } else {
                kept.push(existing);
            }
        }
        kept.push(merged);
        self.symmetric_sets = kept;
        Ok(())
    }

    pub fn symmetric_set_for(&self, vertex_id: i64) -> Option<&SymmetricSet> {
        self.symmetric_sets.iter().find(|s| s.contains(vertex_id))
    }

    /// Reassigns every vertex (including vertices of embedded inner graphs)
    /// a fresh ID drawn from `next_id`, rewriting edges, rings, symmetric
    /// sets, and template projections in one pass.
    pub fn renumber_vertices<F: FnMut() -> i64>(&mut self, mut next_id: F) {
        self.renumber_map(&mut next_id);
    }

    fn renumber_map(&mut self, next_id: &mut dyn FnMut() -> i64) -> HashMap<i64, i64> {
        let mut map = HashMap::with_capacity(self.order.len());
        for key in self.order.clone() {
            let vertex = &mut self.vertices[key];
            let new_id = next_id();
            map.insert(vertex.id(), new_id);
            vertex.set_id(new_id);
            if let VertexKind::Template(t) = &mut vertex.kind {
                let inner_map = t.inner.renumber_map(next_id);
                for ap_ref in &mut t.projection {
                    if let Some(new_inner) = inner_map.get(&ap_ref.vertex) {
                        ap_ref.vertex = *new_inner;
                    }
                }
            }
        }
        self.id_index = self
            .order
            .iter()
            .map(|k| (self.vertices[*k].id(), *k))
            .collect();
        for edge in &mut self.edges {
            edge.src.vertex = map[&edge.src.vertex];
            edge.trg.vertex = map[&edge.trg.vertex];
        }
        for ring in &mut self.rings {
            ring.head = map[&ring.head];
            ring.tail = map[&ring.tail];
            for id in &mut ring.path {
                *id = map[id];
            }
        }
        for set in &mut self.symmetric_sets {
            *set = SymmetricSet::new(set.ids().iter().map(|id| map[id]).collect());
        }
        map
    }

    /// Clones the branch rooted at `root_id` as a stand-alone graph.
    ///
    /// The root's attachment point toward its former parent is freed in the
    /// clone; rings and symmetric sets are kept only where they fall wholly
    /// inside the branch.
    pub fn extract_subgraph(&self, root_id: i64) -> Result<DGraph, GraphError> {
        let branch = self.branch_ids(root_id);
        if branch.is_empty() {
            return Err(GraphError::VertexNotFound(root_id));
        }
        let branch_set: HashSet<i64> = branch.iter().copied().collect();

        let mut sub = DGraph::new();
        for id in &branch {
            let mut vertex = self.vertex(*id).unwrap().clone();
            for i in 0..vertex.aps().len() {
                vertex.ap_mut(i).unwrap().release();
            }
            sub.add_vertex(vertex)?;
        }
        for edge in &self.edges {
            if branch_set.contains(&edge.src.vertex) && branch_set.contains(&edge.trg.vertex) {
                sub.add_edge(*edge, None)?;
            }
        }
        for ring in &self.rings {
            if ring.path.iter().all(|id| branch_set.contains(id)) {
                sub.rings.push(ring.clone());
            }
        }
        for set in &self.symmetric_sets {
            let kept: Vec<i64> = set
                .ids()
                .iter()
                .copied()
                .filter(|id| branch_set.contains(id))
                .collect();
            if kept.len() >= 2 {
                sub.symmetric_sets.push(SymmetricSet::new(kept));
            }
        }
        Ok(sub)
    }

    /// Splices a whole graph below one of this graph's attachment points,
    /// joining `parent_ap` to the AP `child_ap` of the incoming graph's
    /// source vertex.
    ///
    /// Vertex IDs of the two graphs must be disjoint. Validation happens
    /// before any state is moved, so a failure leaves both graphs untouched.
    pub fn append_graph(
        &mut self,
        parent_ap: ApRef,
        incoming: DGraph,
        child_ap: usize,
        space: Option<&FragmentSpace>,
    ) -> Result<(), GraphError> {
        for id in incoming.vertex_ids() {
            if self.contains_vertex(id) {
                return Err(GraphError::IdCollision(id));
            }
        }
        let src_vertex = incoming
            .source()
            .ok_or(GraphError::Inconsistency("Incoming graph is empty".into()))?;
        let src_id = src_vertex.id();
        let incoming_ap = src_vertex.ap(child_ap).ok_or(GraphError::ApIndexOutOfRange {
            vertex: src_id,
            ap: child_ap,
        })?;
        if incoming_ap.is_used() {
            return Err(GraphError::AttachmentPointUnavailable {
                vertex: src_id,
                ap: child_ap,
            });
        }
        let bond_type = incoming_ap.bond_type;
        let parent = self.validate_endpoint(parent_ap)?;
        if let (Some(space), Some(src_class), Some(trg_class)) =
            (space, &parent.class, &incoming_ap.class)
        {
            if !space.compatible(src_class, trg_class) {
                return Err(GraphError::IncompatibleAttachmentPoints {
                    src: src_class.to_string(),
                    trg: trg_class.to_string(),
                });
            }
        }

        let DGraph {
            vertices,
            order,
            edges,
            rings,
            symmetric_sets,
            ..
        } = incoming;
        for key in order {
            let vertex = vertices[key].clone();
            let id = vertex.id();
            let new_key = self.vertices.insert(vertex);
            self.order.push(new_key);
            self.id_index.insert(id, new_key);
        }
        self.edges.extend(edges);
        self.rings.extend(rings);
        self.symmetric_sets.extend(symmetric_sets);

        self.ap_mut(parent_ap).unwrap().mark_used();
        self.ap_mut(ApRef::new(src_id, child_ap)).unwrap().mark_used();
        self.edges.push(Edge::new(
            parent_ap,
            ApRef::new(src_id, child_ap),
            bond_type,
        ));
        Ok(())
    }

    /// Resolves an embedding path (outer-to-inner sequence of vertex IDs,
    /// descending through template inner graphs) to a vertex.
    pub fn resolve_embedding_path(&self, path: &[i64]) -> Option<&Vertex> {
        let (last, hops) = path.split_last()?;
        let graph = self.graph_at_path(hops)?;
        let found = graph.vertex(*last);
        if found.is_none() {
            debug!(vertex_id = *last, "Embedding path missed its target vertex");
        }
        found
    }

    /// The graph reached by descending through the template vertices named
    /// in `path` (`&[]` is this graph).
    pub fn graph_at_path(&self, path: &[i64]) -> Option<&DGraph> {
        let mut graph = self;
        for id in path {
            let vertex = graph.vertex(*id)?;
            match &vertex.kind {
                VertexKind::Template(t) => graph = &t.inner,
                _ => {
                    debug!(vertex_id = *id, "Embedding path hop is not a template");
                    return None;
                }
            }
        }
        Some(graph)
    }

    pub fn graph_at_path_mut(&mut self, path: &[i64]) -> Option<&mut DGraph> {
        let mut graph = self;
        for id in path {
            match graph.vertex_mut(*id) {
                Some(vertex) => match &mut vertex.kind {
                    VertexKind::Template(t) => graph = t.inner.as_mut(),
                    _ => return None,
                },
                None => return None,
            }
        }
        Some(graph)
    }

    /// Verifies the structural invariants, recursing into embedded graphs.
    /// Used by tests and debug assertions after operator edits.
    pub fn check_consistency(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for vertex in self.vertices() {
            if !seen.insert(vertex.id()) {
                return Err(GraphError::DuplicateVertexId(vertex.id()));
            }
        }
        for edge in &self.edges {
            for end in [edge.src, edge.trg] {
                let ap = self
                    .ap(end)
                    .ok_or(GraphError::Inconsistency(format!(
                        "Edge references missing AP {}/{}",
                        end.vertex, end.ap
                    )))?;
                if ap.is_free() {
                    return Err(GraphError::Inconsistency(format!(
                        "Edge endpoint {}/{} is not marked used",
                        end.vertex, end.ap
                    )));
                }
            }
        }
        if self.used_ap_count() != 2 * self.edges.len() {
            return Err(GraphError::Inconsistency(format!(
                "{} used APs for {} edges",
                self.used_ap_count(),
                self.edges.len()
            )));
        }
        for edge in &self.edges {
            let parents = self
                .edges
                .iter()
                .filter(|e| e.trg.vertex == edge.trg.vertex)
                .count();
            if parents > 1 {
                return Err(GraphError::Inconsistency(format!(
                    "Vertex {} has {parents} parent edges",
                    edge.trg.vertex
                )));
            }
        }
        // every parent chain must terminate at a parentless vertex
        let depth_limit = self.vertex_count();
        for vertex in self.vertices() {
            let mut current = vertex.id();
            let mut hops = 0;
            while let Some(parent) = self.parent_of(current) {
                hops += 1;
                if hops > depth_limit {
                    return Err(GraphError::Inconsistency(format!(
                        "Undeclared cycle in the spanning tree through vertex {}",
                        vertex.id()
                    )));
                }
                current = parent;
            }
        }
        for ring in &self.rings {
            for id in &ring.path {
                if !self.contains_vertex(*id) {
                    return Err(GraphError::Inconsistency(format!(
                        "Ring path references missing vertex {id}"
                    )));
                }
            }
        }
        for set in &self.symmetric_sets {
            for &id in set.ids() {
                if !self.contains_vertex(id) {
                    return Err(GraphError::Inconsistency(format!(
                        "Symmetric set references missing vertex {id}"
                    )));
                }
            }
        }
        for vertex in self.vertices() {
            if let VertexKind::Template(t) = &vertex.kind {
                t.inner.check_consistency()?;
                for ap_ref in &t.projection {
                    if t.inner.ap(*ap_ref).is_none() {
                        return Err(GraphError::Inconsistency(format!(
                            "Template {} projects missing inner AP {}/{}",
                            vertex.id(),
                            ap_ref.vertex,
                            ap_ref.ap
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::attachment::{ApClass, AttachmentPoint, BondType};
    use crate::core::models::vertex::{RcvType, Template, Vertex, VertexKind};
    use nalgebra::Vector3;

    fn classed_ap(class: &str) -> AttachmentPoint {
        AttachmentPoint::new(
            Some(class.parse::<ApClass>().unwrap()),
            BondType::Single,
            Vector3::x(),
        )
    }

    fn vertex_with_aps(id: i64, classes: &[&str]) -> Vertex {
        Vertex::empty(id, classes.iter().map(|c| classed_ap(c)).collect())
    }

    /// Chain 1-2-3-4 on class `c:0` APs, source vertex 1 with 3 APs.
    fn chain_graph() -> DGraph {
        let mut g = DGraph::new();
        g.add_vertex(vertex_with_aps(1, &["c:0", "c:0", "c:0"])).unwrap();
        g.add_vertex(vertex_with_aps(2, &["c:0", "c:0"])).unwrap();
        g.add_vertex(vertex_with_aps(3, &["c:0", "c:0"])).unwrap();
        g.add_vertex(vertex_with_aps(4, &["c:0", "c:0"])).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
            None,
        )
        .unwrap();
        g.add_edge(
            Edge::new(ApRef::new(2, 1), ApRef::new(3, 0), BondType::Single),
            None,
        )
        .unwrap();
        g.add_edge(
            Edge::new(ApRef::new(3, 1), ApRef::new(4, 0), BondType::Single),
            None,
        )
        .unwrap();
        g
    }

    #[test]
    fn add_vertex_rejects_duplicate_ids() {
        let mut g = DGraph::new();
        g.add_vertex(vertex_with_aps(1, &["c:0"])).unwrap();
        let err = g.add_vertex(vertex_with_aps(1, &["c:0"])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateVertexId(1));
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn add_edge_requires_free_endpoints() {
        let mut g = chain_graph();
        let err = g
            .add_edge(
                Edge::new(ApRef::new(1, 0), ApRef::new(4, 1), BondType::Single),
                None,
            )
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::AttachmentPointUnavailable { vertex: 1, ap: 0 }
        );
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn add_edge_rejects_out_of_range_ap() {
        let mut g = chain_graph();
        let err = g
            .add_edge(
                Edge::new(ApRef::new(1, 9), ApRef::new(4, 1), BondType::Single),
                None,
            )
            .unwrap_err();
        assert_eq!(err, GraphError::ApIndexOutOfRange { vertex: 1, ap: 9 });
    }

    #[test]
    fn add_edge_rejects_a_second_parent() {
        let mut g = chain_graph();
        let err = g
            .add_edge(
                Edge::new(ApRef::new(1, 1), ApRef::new(4, 1), BondType::Single),
                None,
            )
            .unwrap_err();
        assert_eq!(err, GraphError::ParentConflict(4));
        assert_eq!(g.edge_count(), 3);
        assert!(g.vertex(1).unwrap().ap(1).unwrap().is_free());
        assert_eq!(g.branch_ids(1), vec![1, 2, 3, 4]);
    }

    #[test]
    fn add_edge_rejects_an_undeclared_cycle() {
        let mut g = chain_graph();
        let err = g
            .add_edge(
                Edge::new(ApRef::new(4, 1), ApRef::new(1, 1), BondType::Single),
                None,
            )
            .unwrap_err();
        assert_eq!(err, GraphError::UndeclaredCycle { src: 4, trg: 1 });
        assert_eq!(g.edge_count(), 3);
        g.check_consistency().unwrap();
    }

    #[test]
    fn check_consistency_flags_forged_parent_and_cycle_edges() {
        // second incoming edge pushed past validation
        let mut g = chain_graph();
        g.ap_mut(ApRef::new(1, 1)).unwrap().mark_used();
        g.ap_mut(ApRef::new(4, 1)).unwrap().mark_used();
        g.edges
            .push(Edge::new(ApRef::new(1, 1), ApRef::new(4, 1), BondType::Single));
        assert!(matches!(
            g.check_consistency(),
            Err(GraphError::Inconsistency(_))
        ));

        // parent chain that never terminates
        let mut g = chain_graph();
        g.ap_mut(ApRef::new(4, 1)).unwrap().mark_used();
        g.ap_mut(ApRef::new(1, 1)).unwrap().mark_used();
        g.edges
            .push(Edge::new(ApRef::new(4, 1), ApRef::new(1, 1), BondType::Single));
        assert!(matches!(
            g.check_consistency(),
            Err(GraphError::Inconsistency(_))
        ));
    }

    #[test]
    fn add_edge_enforces_class_compatibility() {
        use crate::core::fragspace::FragmentSpace;
        let mut space = FragmentSpace::new();
        space.add_compatibility("a:0".parse().unwrap(), "b:0".parse().unwrap());

        let mut g = DGraph::new();
        g.add_vertex(vertex_with_aps(1, &["a:0"])).unwrap();
        g.add_vertex(vertex_with_aps(2, &["a:0"])).unwrap();
        let err = g
            .add_edge(
                Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
                Some(&space),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::IncompatibleAttachmentPoints { .. }
        ));

        let mut h = DGraph::new();
        h.add_vertex(vertex_with_aps(1, &["a:0"])).unwrap();
        h.add_vertex(vertex_with_aps(2, &["b:0"])).unwrap();
        h.add_edge(
            Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
            Some(&space),
        )
        .unwrap();
        assert_eq!(h.edge_count(), 1);
    }

    #[test]
    fn remove_vertex_frees_partner_aps_and_scrubs_bookkeeping() {
        let mut g = chain_graph();
        g.add_symmetric_set(SymmetricSet::new(vec![2, 3])).unwrap();
        g.remove_vertex(3).unwrap();

        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 1);
        assert!(g.vertex(2).unwrap().ap(1).unwrap().is_free());
        assert!(g.vertex(4).unwrap().ap(0).unwrap().is_free());
        // a symmetric set of one is meaningless
        assert!(g.symmetric_sets().is_empty());
        g.check_consistency().unwrap();
    }

    #[test]
    fn remove_branch_removes_all_descendants() {
        let mut g = chain_graph();
        g.remove_branch(2).unwrap();
        assert_eq!(g.vertex_ids(), vec![1]);
        assert_eq!(g.edge_count(), 0);
        assert!(g.vertex(1).unwrap().ap(0).unwrap().is_free());
        g.check_consistency().unwrap();
    }

    #[test]
    fn spanning_tree_navigation() {
        let g = chain_graph();
        assert_eq!(g.parent_of(2), Some(1));
        assert_eq!(g.parent_of(1), None);
        assert_eq!(g.children_of(1), vec![2]);
        assert_eq!(g.branch_ids(2), vec![2, 3, 4]);
        assert_eq!(g.source().unwrap().id(), 1);
    }

    #[test]
    fn path_between_runs_through_the_junction() {
        let mut g = chain_graph();
        // add a second branch off vertex 1
        g.add_vertex(vertex_with_aps(5, &["c:0"])).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(1, 1), ApRef::new(5, 0), BondType::Single),
            None,
        )
        .unwrap();
        assert_eq!(g.path_between(4, 5), Some(vec![4, 3, 2, 1, 5]));
        assert_eq!(g.path_between(1, 4), Some(vec![1, 2, 3, 4]));
    }

    fn rcv_chain() -> DGraph {
        let mut g = chain_graph();
        let head = Vertex::ring_closing(10, RcvType::Plus, None, BondType::Single);
        let tail = Vertex::ring_closing(11, RcvType::Minus, None, BondType::Single);
        g.add_vertex(head).unwrap();
        g.add_vertex(tail).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(1, 1), ApRef::new(10, 0), BondType::Single),
            None,
        )
        .unwrap();
        g.add_edge(
            Edge::new(ApRef::new(4, 1), ApRef::new(11, 0), BondType::Single),
            None,
        )
        .unwrap();
        g
    }

    #[test]
    fn add_ring_links_compatible_rcvs() {
        let mut g = rcv_chain();
        g.add_ring(10, 11).unwrap();
        assert_eq!(g.ring_count(), 1);
        let ring = &g.rings()[0];
        assert_eq!(ring.path, vec![10, 1, 2, 3, 4, 11]);
        assert_eq!(ring.bond_type, BondType::Single);
        g.check_consistency().unwrap();
    }

    #[test]
    fn add_ring_rejects_incompatible_types_and_non_rcvs() {
        let mut g = rcv_chain();
        let extra = Vertex::ring_closing(12, RcvType::Plus, None, BondType::Single);
        g.add_vertex(extra).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(1, 2), ApRef::new(12, 0), BondType::Single),
            None,
        )
        .unwrap();

        assert!(matches!(
            g.add_ring(10, 12),
            Err(GraphError::InvalidRingClosure(_))
        ));
        assert!(matches!(
            g.add_ring(1, 11),
            Err(GraphError::InvalidRingClosure(_))
        ));
        assert_eq!(g.ring_count(), 0);
    }

    #[test]
    fn add_ring_rejects_already_closed_rcvs() {
        let mut g = rcv_chain();
        g.add_ring(10, 11).unwrap();
        assert!(matches!(
            g.add_ring(10, 11),
            Err(GraphError::InvalidRingClosure(_))
        ));
        assert_eq!(g.ring_count(), 1);
    }

    #[test]
    fn renumber_rewrites_all_references() {
        let mut g = rcv_chain();
        g.add_ring(10, 11).unwrap();
        g.add_symmetric_set(SymmetricSet::new(vec![2, 3])).unwrap();

        let mut next = 100;
        g.renumber_vertices(|| {
            next += 1;
            next
        });

        assert!(g.vertex_ids().iter().all(|id| *id > 100));
        g.check_consistency().unwrap();
        assert_eq!(g.ring_count(), 1);
        assert_eq!(g.symmetric_sets()[0].len(), 2);
        // edges still connect the same structure: fragment 2 and RCV 10
        assert_eq!(g.children_of(g.source().unwrap().id()).len(), 2);
    }

    fn template_graph() -> DGraph {
        let mut inner = DGraph::new();
        inner.add_vertex(vertex_with_aps(20, &["c:0", "c:0"])).unwrap();
        inner.add_vertex(vertex_with_aps(21, &["c:0", "c:0"])).unwrap();
        inner
            .add_edge(
                Edge::new(ApRef::new(20, 0), ApRef::new(21, 0), BondType::Single),
                None,
            )
            .unwrap();

        let template = Template {
            inner: Box::new(inner),
            projection: vec![ApRef::new(20, 1), ApRef::new(21, 1)],
        };
        let t_vertex = Vertex::new(
            2,
            crate::core::models::vertex::BuildingBlockType::Fragment,
            None,
            VertexKind::Template(template),
            vec![classed_ap("c:0"), classed_ap("c:0")],
        );

        let mut g = DGraph::new();
        g.add_vertex(vertex_with_aps(1, &["c:0"])).unwrap();
        g.add_vertex(t_vertex).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
            None,
        )
        .unwrap();
        g
    }

    #[test]
    fn embedding_path_resolves_into_templates() {
        let g = template_graph();
        assert_eq!(g.resolve_embedding_path(&[2, 21]).unwrap().id(), 21);
        assert_eq!(g.resolve_embedding_path(&[1]).unwrap().id(), 1);
        assert!(g.resolve_embedding_path(&[2, 99]).is_none());
        assert!(g.resolve_embedding_path(&[1, 20]).is_none()); // hop not a template
        assert!(g.resolve_embedding_path(&[]).is_none());
    }

    #[test]
    fn renumber_descends_into_templates() {
        let mut g = template_graph();
        let mut next = 1000;
        g.renumber_vertices(|| {
            next += 1;
            next
        });
        let ids = g.vertex_ids_recursive();
        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.iter().all(|id| *id > 1000));
        g.check_consistency().unwrap();
    }

    #[test]
    fn extract_subgraph_frees_the_cut_ap() {
        let g = chain_graph();
        let sub = g.extract_subgraph(2).unwrap();
        assert_eq!(sub.vertex_ids(), vec![2, 3, 4]);
        assert_eq!(sub.edge_count(), 2);
        assert!(sub.vertex(2).unwrap().ap(0).unwrap().is_free());
        sub.check_consistency().unwrap();
        // original untouched
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn append_graph_splices_below_an_ap() {
        let mut g = chain_graph();
        let mut incoming = DGraph::new();
        incoming.add_vertex(vertex_with_aps(8, &["c:0", "c:0"])).unwrap();
        incoming.add_vertex(vertex_with_aps(9, &["c:0"])).unwrap();
        incoming
            .add_edge(
                Edge::new(ApRef::new(8, 1), ApRef::new(9, 0), BondType::Single),
                None,
            )
            .unwrap();

        g.append_graph(ApRef::new(4, 1), incoming, 0, None).unwrap();
        assert_eq!(g.vertex_count(), 6);
        assert_eq!(g.edge_count(), 5);
        assert_eq!(g.parent_of(8), Some(4));
        g.check_consistency().unwrap();
    }

    #[test]
    fn append_graph_rejects_id_collisions() {
        let mut g = chain_graph();
        let mut incoming = DGraph::new();
        incoming.add_vertex(vertex_with_aps(2, &["c:0"])).unwrap();
        let err = g
            .append_graph(ApRef::new(4, 1), incoming, 0, None)
            .unwrap_err();
        assert_eq!(err, GraphError::IdCollision(2));
        assert_eq!(g.vertex_count(), 4);
        g.check_consistency().unwrap();
    }

    #[test]
    fn ap_conservation_holds_through_edits() {
        let mut g = chain_graph();
        assert_eq!(g.used_ap_count(), 2 * g.edge_count());
        g.remove_vertex(4).unwrap();
        assert_eq!(g.used_ap_count(), 2 * g.edge_count());
        g.add_vertex(vertex_with_aps(7, &["c:0"])).unwrap();
        g.add_edge(
            Edge::new(ApRef::new(3, 1), ApRef::new(7, 0), BondType::Single),
            None,
        )
        .unwrap();
        assert_eq!(g.used_ap_count(), 2 * g.edge_count());
        g.check_consistency().unwrap();
    }
}
