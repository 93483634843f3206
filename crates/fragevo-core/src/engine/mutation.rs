//! Structural mutation of a graph.
//!
//! Each mutation is all-or-nothing: the operator works on a copy of the
//! targeted (possibly template-embedded) graph and commits only on success,
//! so a failed precondition leaves the input untouched.

use crate::core::fragspace::FragmentSpace;
use crate::core::models::attachment::ApClass;
use crate::core::models::edge::{ApRef, Edge};
use crate::core::models::graph::DGraph;
use crate::core::models::vertex::{BuildingBlockType, RcvType, Vertex};
use crate::engine::error::OperationError;
use crate::engine::ids::IdAllocator;
use crate::engine::selection::{GrowthProbability, SelectionStrategy};
use tracing::debug;

/// The kinds of structural edit a [`Mutator`] can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationType {
    /// Grow a compatible library fragment at a free AP.
    Extend,
    /// Remove the branch rooted at the target (never the scaffold root).
    Delete,
    /// Replace the branch rooted at the target with a library fragment.
    ChangeBranch,
    /// Swap the target for a library fragment, preserving all connections.
    ChangeLink,
    /// Insert a vertex into the edge between the target and its parent.
    AddLink,
    /// Splice out a two-connected vertex, joining its neighbors directly.
    DeleteLink,
    /// Attach a complementary RCV pair and close a ring through the target.
    AddRing,
    /// Remove a ring anchored at the target RCV, dropping both RCVs.
    DeleteRing,
}

/// Operator-specific knobs for one explicit mutation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationParams {
    /// Restrict the incoming building block to this fragment-library index.
    pub library_index: Option<usize>,
    /// AP index on the target (Extend, AddRing) or on the inserted vertex
    /// toward the parent (AddLink).
    pub ap_index: Option<usize>,
    /// Allow replacing a branch with the same library fragment it had.
    pub force: bool,
}

/// Mutation types structurally applicable to one vertex.
///
/// Applicability here is positional (kind, parent, free APs); class
/// compatibility with the library is only checked when the mutation runs.
pub fn allowed_mutations(
    graph: &DGraph,
    vertex_id: i64,
) -> Vec<MutationType> {
    let Some(vertex) = graph.vertex(vertex_id) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let has_parent = graph.parent_of(vertex_id).is_some();
    if vertex.is_rcv() {
        let in_ring = graph
            .rings()
            .iter()
            .any(|r| r.head == vertex_id || r.tail == vertex_id);
        if in_ring {
            out.push(MutationType::DeleteRing);
        } else if has_parent {
            out.push(MutationType::Delete);
        }
        return out;
    }
    if !vertex.free_ap_indices().is_empty() {
        out.push(MutationType::Extend);
        let partner_exists = graph.vertices().any(|v| {
            v.id() != vertex_id && !v.is_rcv() && !v.free_ap_indices().is_empty()
        });
        if partner_exists {
            out.push(MutationType::AddRing);
        }
    }
    if has_parent {
        out.push(MutationType::Delete);
        out.push(MutationType::ChangeBranch);
        out.push(MutationType::ChangeLink);
        out.push(MutationType::AddLink);
        if graph.children_of(vertex_id).len() == 1 {
            out.push(MutationType::DeleteLink);
        }
    }
    out
}

/// Applies structural mutations drawn from a fragment space.
pub struct Mutator<'a, S: SelectionStrategy> {
    space: &'a FragmentSpace,
    ids: &'a IdAllocator,
    strategy: S,
    growth: GrowthProbability,
}

impl<'a, S: SelectionStrategy> Mutator<'a, S> {
    pub fn new(space: &'a FragmentSpace, ids: &'a IdAllocator, strategy: S) -> Self {
        Self {
            space,
            ids,
            strategy,
            growth: GrowthProbability::default(),
        }
    }

    pub fn with_growth(mut self, growth: GrowthProbability) -> Self {
        self.growth = growth;
        self
    }

    /// Applies one explicit mutation at the vertex addressed by `site`, an
    /// embedding path descending through template inner graphs.
    ///
    /// On error the graph is unchanged and the reason names the failed
    /// precondition.
    pub fn mutate(
        &mut self,
        graph: &mut DGraph,
        site: &[i64],
        mutation: MutationType,
        params: MutationParams,
    ) -> Result<(), OperationError> {
        let (target, hops) = site
            .split_last()
            .ok_or_else(|| OperationError::mutation("empty embedding path"))?;
        let target_graph = graph
            .graph_at_path_mut(hops)
            .ok_or_else(|| OperationError::mutation("embedding path does not resolve"))?;
        let mut work = target_graph.clone();
        self.apply(&mut work, *target, mutation, &params)?;
        debug_assert!(work.check_consistency().is_ok());
        debug!(?mutation, vertex = *target, "mutation applied");
        *target_graph = work;
        Ok(())
    }

    /// Random mode: picks a site and an applicable mutation type, weighting
    /// growth-type edits by the graph's level, and delegates to the
    /// explicit path. `Ok(false)` when no candidate succeeds.
    pub fn mutate_random(&mut self, graph: &mut DGraph) -> Result<bool, OperationError> {
        let mut candidates: Vec<(i64, MutationType)> = Vec::new();
        for id in graph.vertex_ids() {
            for mutation in allowed_mutations(graph, id) {
                candidates.push((id, mutation));
            }
        }
        let growth_weight = self.growth.weight(graph.level());
        while !candidates.is_empty() {
            let weights: Vec<f64> = candidates
                .iter()
                .map(|(_, m)| match m {
                    MutationType::Extend | MutationType::AddLink | MutationType::AddRing => {
                        growth_weight
                    }
                    _ => 1.0,
                })
                .collect();
            let Some(pick) = self.strategy.choose_weighted(&weights) else {
                return Ok(false);
            };
            let (id, mutation) = candidates.swap_remove(pick);
            match self.mutate(graph, &[id], mutation, MutationParams::default()) {
                Ok(()) => return Ok(true),
                Err(OperationError::MutationFailed { reason }) => {
                    debug!(vertex = id, ?mutation, %reason, "mutation attempt rejected");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(false)
    }

    fn apply(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        mutation: MutationType,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        if !graph.contains_vertex(vertex_id) {
            return Err(OperationError::mutation(format!(
                "vertex {vertex_id} not found"
            )));
        }
        match mutation {
            MutationType::Extend => self.extend(graph, vertex_id, params),
            MutationType::Delete => self.delete(graph, vertex_id),
            MutationType::ChangeBranch => self.change_branch(graph, vertex_id, params),
            MutationType::ChangeLink => self.change_link(graph, vertex_id, params),
            MutationType::AddLink => self.add_link(graph, vertex_id, params),
            MutationType::DeleteLink => self.delete_link(graph, vertex_id),
            MutationType::AddRing => self.add_ring(graph, vertex_id, params),
            MutationType::DeleteRing => self.delete_ring(graph, vertex_id),
        }
    }

    fn extend(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        let vertex = graph.vertex(vertex_id).unwrap();
        let free = vertex.free_ap_indices();
        let ap_index = match params.ap_index {
            Some(i) if free.contains(&i) => i,
            Some(i) => {
                return Err(OperationError::mutation(format!(
                    "AP {i} of vertex {vertex_id} is not free"
                )));
            }
            None => {
                let pick = self
                    .strategy
                    .choose(free.len())
                    .ok_or_else(|| OperationError::mutation("no free attachment point"))?;
                free[pick]
            }
        };
        let ap = vertex.ap(ap_index).unwrap();
        let class = ap
            .class
            .clone()
            .ok_or_else(|| OperationError::mutation("attachment point has no class"))?;
        let bond = ap.bond_type;

        let mut candidates = self.space.compatible_fragments(&class);
        if let Some(lib) = params.library_index {
            candidates.retain(|(f, _)| *f == lib);
        }
        // With no growth fragment available, fall back to the capping group
        // registered for the class so the AP can still be saturated.
        let (bb_type, frag_index, frag_ap) = match self.strategy.choose(candidates.len()) {
            Some(pick) => {
                let (index, ap) = candidates[pick];
                (BuildingBlockType::Fragment, index, ap)
            }
            None => {
                let index = self.space.capping_group_for(&class).ok_or_else(|| {
                    OperationError::mutation("no compatible library fragment")
                })?;
                (BuildingBlockType::Cap, index, 0)
            }
        };

        let new_id = self.ids.next_vertex_id();
        graph
            .add_vertex(self.space.instantiate(bb_type, frag_index, new_id)?)?;
        graph.add_edge(
            Edge::new(
                ApRef::new(vertex_id, ap_index),
                ApRef::new(new_id, frag_ap),
                bond,
            ),
            Some(self.space),
        )?;
        Ok(())
    }

    fn delete(&mut self, graph: &mut DGraph, vertex_id: i64) -> Result<(), OperationError> {
        let Some(parent_edge) = graph.edge_to_parent(vertex_id).copied() else {
            return Err(OperationError::mutation("cannot delete the scaffold root"));
        };
        if severs_ring(graph, &graph.branch_ids(vertex_id)) {
            return Err(OperationError::mutation("deletion would sever a ring path"));
        }
        // The parent AP comes free again; some classes must never stay open.
        if let Some(class) = &graph.ap(parent_edge.src).unwrap().class {
            if self.space.is_forbidden_end(class) {
                return Err(OperationError::mutation(format!(
                    "deletion would leave forbidden free end '{class}'"
                )));
            }
        }
        graph.remove_branch(vertex_id)?;
        Ok(())
    }

    fn change_branch(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        let parent_edge = *graph
            .edge_to_parent(vertex_id)
            .ok_or_else(|| OperationError::mutation("cannot replace the scaffold root"))?;
        if severs_ring(graph, &graph.branch_ids(vertex_id)) {
            return Err(OperationError::mutation(
                "replacement would sever a ring path",
            ));
        }
        let parent_ap = graph.ap(parent_edge.src).unwrap();
        let class = parent_ap
            .class
            .clone()
            .ok_or_else(|| OperationError::mutation("parent attachment point has no class"))?;
        let bond = parent_ap.bond_type;
        let old_library = graph.vertex(vertex_id).unwrap().library_index;

        let mut candidates = self.space.compatible_fragments(&class);
        if let Some(lib) = params.library_index {
            candidates.retain(|(f, _)| *f == lib);
        } else if !params.force {
            candidates.retain(|(f, _)| Some(*f) != old_library);
        }
        let pick = self
            .strategy
            .choose(candidates.len())
            .ok_or_else(|| OperationError::mutation("no compatible replacement fragment"))?;
        let (frag_index, frag_ap) = candidates[pick];

        graph.remove_branch(vertex_id)?;
        let new_id = self.ids.next_vertex_id();
        graph.add_vertex(
            self.space
                .instantiate(BuildingBlockType::Fragment, frag_index, new_id)?,
        )?;
        graph.add_edge(
            Edge::new(parent_edge.src, ApRef::new(new_id, frag_ap), bond),
            Some(self.space),
        )?;
        Ok(())
    }

    fn change_link(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        let parent_edge = *graph
            .edge_to_parent(vertex_id)
            .ok_or_else(|| OperationError::mutation("vertex has no parent"))?;
        if graph.rings().iter().any(|r| r.involves_vertex(vertex_id)) {
            return Err(OperationError::mutation("vertex lies on a ring path"));
        }
        // Connections to re-establish: the parent link plus one per child.
        struct Link {
            other: ApRef,
            other_class: Option<ApClass>,
            bond: crate::core::models::attachment::BondType,
            to_parent: bool,
        }
        let mut links = vec![Link {
            other: parent_edge.src,
            other_class: graph.ap(parent_edge.src).unwrap().class.clone(),
            bond: parent_edge.bond_type,
            to_parent: true,
        }];
        for child in graph.children_of(vertex_id) {
            let edge = *graph.edge_to_parent(child).unwrap();
            links.push(Link {
                other: edge.trg,
                other_class: graph.ap(edge.trg).unwrap().class.clone(),
                bond: edge.bond_type,
                to_parent: false,
            });
        }

        let old_library = graph.vertex(vertex_id).unwrap().library_index;
        let libraries: Vec<usize> = match params.library_index {
            Some(i) => vec![i],
            None => (0..self.space.library(BuildingBlockType::Fragment).len())
                .filter(|f| params.force || Some(*f) != old_library)
                .collect(),
        };
        // Greedy injective AP assignment per candidate block.
        let mut viable: Vec<(usize, Vec<usize>)> = Vec::new();
        for frag_index in libraries {
            let Some(block) = self
                .space
                .library(BuildingBlockType::Fragment)
                .get(frag_index)
            else {
                continue;
            };
            let mut taken = vec![false; block.aps.len()];
            let mut assignment = Vec::with_capacity(links.len());
            let full = links.iter().all(|link| {
                let slot = block.aps.iter().enumerate().position(|(i, d)| {
                    !taken[i]
                        && link
                            .other_class
                            .as_ref()
                            .is_none_or(|c| self.space.compatible(c, &d.class))
                });
                match slot {
                    Some(i) => {
                        taken[i] = true;
                        assignment.push(i);
                        true
                    }
                    None => false,
                }
            });
            if full {
                viable.push((frag_index, assignment));
            }
        }
        let pick = self
            .strategy
            .choose(viable.len())
            .ok_or_else(|| OperationError::mutation("no fragment satisfies all connections"))?;
        let (frag_index, assignment) = viable.swap_remove(pick);

        graph.remove_vertex(vertex_id)?;
        let new_id = self.ids.next_vertex_id();
        graph.add_vertex(
            self.space
                .instantiate(BuildingBlockType::Fragment, frag_index, new_id)?,
        )?;
        for (link, ap_index) in links.iter().zip(assignment) {
            let edge = if link.to_parent {
                Edge::new(link.other, ApRef::new(new_id, ap_index), link.bond)
            } else {
                Edge::new(ApRef::new(new_id, ap_index), link.other, link.bond)
            };
            graph.add_edge(edge, Some(self.space))?;
        }
        Ok(())
    }

    fn add_link(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        let edge = *graph
            .edge_to_parent(vertex_id)
            .ok_or_else(|| OperationError::mutation("vertex has no parent edge"))?;
        let parent_class = graph.ap(edge.src).unwrap().class.clone();
        let child_class = graph.ap(edge.trg).unwrap().class.clone();

        let libraries: Vec<usize> = match params.library_index {
            Some(i) => vec![i],
            None => (0..self.space.library(BuildingBlockType::Fragment).len()).collect(),
        };
        let mut viable: Vec<(usize, usize, usize)> = Vec::new();
        for frag_index in libraries {
            let Some(block) = self
                .space
                .library(BuildingBlockType::Fragment)
                .get(frag_index)
            else {
                continue;
            };
            for (p, pd) in block.aps.iter().enumerate() {
                if !parent_class
                    .as_ref()
                    .is_none_or(|c| self.space.compatible(c, &pd.class))
                {
                    continue;
                }
                for (c, cd) in block.aps.iter().enumerate() {
                    if c == p {
                        continue;
                    }
                    if child_class
                        .as_ref()
                        .is_none_or(|cl| self.space.compatible(cl, &cd.class))
                    {
                        viable.push((frag_index, p, c));
                    }
                }
            }
        }
        if let Some(required) = params.ap_index {
            viable.retain(|(_, p, _)| *p == required);
            if viable.is_empty() {
                return Err(OperationError::mutation(format!(
                    "target AP index {required} is out of range or incompatible"
                )));
            }
        }
        let pick = self
            .strategy
            .choose(viable.len())
            .ok_or_else(|| OperationError::mutation("no fragment can bridge the edge"))?;
        let (frag_index, to_parent, to_child) = viable[pick];

        graph.remove_edge_between(edge.src.vertex, vertex_id)?;
        let new_id = self.ids.next_vertex_id();
        graph.add_vertex(
            self.space
                .instantiate(BuildingBlockType::Fragment, frag_index, new_id)?,
        )?;
        graph.add_edge(
            Edge::new(edge.src, ApRef::new(new_id, to_parent), edge.bond_type),
            Some(self.space),
        )?;
        graph.add_edge(
            Edge::new(ApRef::new(new_id, to_child), edge.trg, edge.bond_type),
            Some(self.space),
        )?;
        Ok(())
    }

    fn delete_link(&mut self, graph: &mut DGraph, vertex_id: i64) -> Result<(), OperationError> {
        let parent_edge = *graph
            .edge_to_parent(vertex_id)
            .ok_or_else(|| OperationError::mutation("vertex has no parent"))?;
        let children = graph.children_of(vertex_id);
        let [child] = children[..] else {
            return Err(OperationError::mutation(
                "vertex does not bridge exactly two neighbors",
            ));
        };
        if graph.rings().iter().any(|r| r.involves_vertex(vertex_id)) {
            return Err(OperationError::mutation("vertex lies on a ring path"));
        }
        let child_edge = *graph.edge_to_parent(child).unwrap();
        let parent_class = &graph.ap(parent_edge.src).unwrap().class;
        let child_class = &graph.ap(child_edge.trg).unwrap().class;
        if let (Some(a), Some(b)) = (parent_class, child_class) {
            if !self.space.compatible(a, b) {
                return Err(OperationError::mutation(
                    "bridged attachment points are incompatible",
                ));
            }
        }
        graph.remove_vertex(vertex_id)?;
        graph.add_edge(
            Edge::new(parent_edge.src, child_edge.trg, parent_edge.bond_type),
            Some(self.space),
        )?;
        Ok(())
    }

    fn add_ring(
        &mut self,
        graph: &mut DGraph,
        vertex_id: i64,
        params: &MutationParams,
    ) -> Result<(), OperationError> {
        let vertex = graph.vertex(vertex_id).unwrap();
        if vertex.is_rcv() {
            return Err(OperationError::mutation(
                "site is already a ring-closing vertex",
            ));
        }
        let free = vertex.free_ap_indices();
        let site_ap = match params.ap_index {
            Some(i) if free.contains(&i) => i,
            Some(i) => {
                return Err(OperationError::mutation(format!(
                    "AP {i} of vertex {vertex_id} is not free"
                )));
            }
            None => {
                let pick = self
                    .strategy
                    .choose(free.len())
                    .ok_or_else(|| OperationError::mutation("no free attachment point"))?;
                free[pick]
            }
        };
        let bond = vertex.ap(site_ap).unwrap().bond_type;

        let mut partners: Vec<ApRef> = Vec::new();
        for other in graph.vertices() {
            if other.id() == vertex_id || other.is_rcv() {
                continue;
            }
            for ap in other.free_ap_indices() {
                partners.push(ApRef::new(other.id(), ap));
            }
        }
        let pick = self
            .strategy
            .choose(partners.len())
            .ok_or_else(|| OperationError::mutation("no partner attachment point for a ring"))?;
        let partner = partners[pick];

        let head_id = self.ids.next_vertex_id();
        graph.add_vertex(Vertex::ring_closing(head_id, RcvType::Plus, None, bond))?;
        graph.add_edge(
            Edge::new(ApRef::new(vertex_id, site_ap), ApRef::new(head_id, 0), bond),
            Some(self.space),
        )?;
        let tail_id = self.ids.next_vertex_id();
        graph.add_vertex(Vertex::ring_closing(tail_id, RcvType::Minus, None, bond))?;
        graph.add_edge(
            Edge::new(partner, ApRef::new(tail_id, 0), bond),
            Some(self.space),
        )?;
        graph.add_ring(head_id, tail_id)?;
        Ok(())
    }

    fn delete_ring(&mut self, graph: &mut DGraph, vertex_id: i64) -> Result<(), OperationError> {
        let ring = graph
            .rings()
            .iter()
            .find(|r| r.head == vertex_id || r.tail == vertex_id)
            .ok_or_else(|| OperationError::mutation("no ring anchored at vertex"))?;
        let (head, tail) = (ring.head, ring.tail);
        // Dropping the head removes the ring entry; the tail is then a
        // dangling RCV and goes too.
        graph.remove_vertex(head)?;
        graph.remove_vertex(tail)?;
        Ok(())
    }
}

/// True when some ring path crosses the boundary of `branch`.
fn severs_ring(graph: &DGraph, branch: &[i64]) -> bool {
    graph.rings().iter().any(|ring| {
        let inside = ring
            .path
            .iter()
            .filter(|id| branch.contains(id))
            .count();
        inside > 0 && inside < ring.path.len()
    })
}
