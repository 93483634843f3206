//! Branch-swap recombination of two parent graphs.
//!
//! The cut vertices define two subtrees that trade places. "No valid swap"
//! is a common outcome and is reported as `Ok(None)`, never as an error;
//! the inputs are read-only so a rejected cut leaves both parents exactly
//! as they were.

use crate::core::fragspace::FragmentSpace;
use crate::core::models::attachment::{ApClass, BondType};
use crate::core::models::edge::ApRef;
use crate::core::models::graph::{DGraph, GraphError};
use crate::engine::error::OperationError;
use crate::engine::ids::IdAllocator;
use tracing::debug;

/// Swaps the branches rooted at `m_id` (in `male`) and `f_id` (in `female`),
/// producing two offspring: index 0 continues the male line, 1 the female.
///
/// Returns `Ok(None)` when no structurally valid swap exists: a cut at a
/// source vertex, AP-class incompatibility at either stub, or a swap that
/// would sever a ring path. Vertex IDs of the two parents must be disjoint
/// (renumber with a shared allocator first).
///
/// With `symmetric`, a cut vertex belonging to a symmetric set is mirrored:
/// every symmetric sibling's branch is replaced by a renumbered copy of the
/// incoming branch.
pub fn crossover(
    male: &DGraph,
    m_id: i64,
    female: &DGraph,
    f_id: i64,
    space: &FragmentSpace,
    ids: &IdAllocator,
    symmetric: bool,
) -> Result<Option<(DGraph, DGraph)>, OperationError> {
    for id in male.vertex_ids_recursive() {
        if female.contains_vertex(id) {
            return Err(OperationError::IdCollision(id));
        }
    }
    if !male.contains_vertex(m_id) {
        return Err(GraphError::VertexNotFound(m_id).into());
    }
    if !female.contains_vertex(f_id) {
        return Err(GraphError::VertexNotFound(f_id).into());
    }

    let Some(m_edge) = male.edge_to_parent(m_id).copied() else {
        debug!(vertex = m_id, "cut at source vertex, no crossover");
        return Ok(None);
    };
    let Some(f_edge) = female.edge_to_parent(f_id).copied() else {
        debug!(vertex = f_id, "cut at source vertex, no crossover");
        return Ok(None);
    };

    // Each incoming branch root must be attachable to the other side's stub.
    let m_parent_class = stub_class(male, m_edge.src);
    let f_parent_class = stub_class(female, f_edge.src);
    let m_root_class = stub_class(male, m_edge.trg);
    let f_root_class = stub_class(female, f_edge.trg);
    if !classes_compatible(space, &m_parent_class, &f_root_class)
        || !classes_compatible(space, &f_parent_class, &m_root_class)
    {
        debug!("attachment point classes incompatible at the cut, no crossover");
        return Ok(None);
    }
    if !bonds_agree(stub_bond(male, m_edge.src), stub_bond(female, f_edge.trg))
        || !bonds_agree(stub_bond(female, f_edge.src), stub_bond(male, m_edge.trg))
    {
        debug!("attachment point bond types disagree at the cut, no crossover");
        return Ok(None);
    }

    if severs_ring(male, m_id) || severs_ring(female, f_id) {
        debug!("swap would sever a ring path, no crossover");
        return Ok(None);
    }

    let m_branch = male.extract_subgraph(m_id)?;
    let f_branch = female.extract_subgraph(f_id)?;

    let mut male_line = male.clone();
    transplant(
        &mut male_line,
        m_id,
        m_edge.src,
        &f_branch,
        f_edge.trg.ap,
        space,
        ids,
        symmetric,
    )?;
    male_line.set_graph_id(ids.next_graph_id());

    let mut female_line = female.clone();
    transplant(
        &mut female_line,
        f_id,
        f_edge.src,
        &m_branch,
        m_edge.trg.ap,
        space,
        ids,
        symmetric,
    )?;
    female_line.set_graph_id(ids.next_graph_id());

    debug_assert!(male_line.check_consistency().is_ok());
    debug_assert!(female_line.check_consistency().is_ok());
    Ok(Some((male_line, female_line)))
}

/// Replaces the branch at `cut_id` (and, when mirroring, each symmetric
/// sibling's branch) with copies of `incoming`.
#[allow(clippy::too_many_arguments)]
fn transplant(
    host: &mut DGraph,
    cut_id: i64,
    parent_ap: ApRef,
    incoming: &DGraph,
    incoming_ap: usize,
    space: &FragmentSpace,
    ids: &IdAllocator,
    symmetric: bool,
) -> Result<(), OperationError> {
    let siblings: Vec<i64> = if symmetric {
        host.symmetric_set_for(cut_id)
            .map(|s| s.ids().iter().copied().filter(|id| *id != cut_id).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    host.remove_branch(cut_id)?;
    host.append_graph(parent_ap, incoming.clone(), incoming_ap, Some(space))?;

    for sibling in siblings {
        // Siblings inside the removed branch are already gone.
        if !host.contains_vertex(sibling) {
            continue;
        }
        let Some(edge) = host.edge_to_parent(sibling).copied() else {
            continue;
        };
        if severs_ring(host, sibling) {
            debug!(vertex = sibling, "mirrored cut would sever a ring, skipped");
            continue;
        }
        let sib_parent_class = stub_class(host, edge.src);
        if !classes_compatible(space, &sib_parent_class, &incoming_root_class(incoming, incoming_ap))
            || !bonds_agree(
                stub_bond(host, edge.src),
                incoming_root_bond(incoming, incoming_ap),
            )
        {
            debug!(vertex = sibling, "mirrored cut incompatible, skipped");
            continue;
        }
        host.remove_branch(sibling)?;
        let mut copy = incoming.clone();
        copy.renumber_vertices(|| ids.next_vertex_id());
        host.append_graph(edge.src, copy, incoming_ap, Some(space))?;
    }
    Ok(())
}

fn stub_class(graph: &DGraph, ap_ref: ApRef) -> Option<ApClass> {
    graph.ap(ap_ref).and_then(|ap| ap.class.clone())
}

fn incoming_root_class(incoming: &DGraph, ap_index: usize) -> Option<ApClass> {
    incoming
        .source()
        .and_then(|v| v.ap(ap_index))
        .and_then(|ap| ap.class.clone())
}

fn stub_bond(graph: &DGraph, ap_ref: ApRef) -> Option<BondType> {
    graph.ap(ap_ref).map(|ap| ap.bond_type)
}

fn incoming_root_bond(incoming: &DGraph, ap_index: usize) -> Option<BondType> {
    incoming.source().and_then(|v| v.ap(ap_index)).map(|ap| ap.bond_type)
}

/// The splice edge takes a single bond type, so both stubs must declare the
/// same one. `Any` and `Undefined` stubs accept whatever the other side has.
fn bonds_agree(a: Option<BondType>, b: Option<BondType>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a == b
                || matches!(a, BondType::Any | BondType::Undefined)
                || matches!(b, BondType::Any | BondType::Undefined)
        }
        _ => true,
    }
}

fn classes_compatible(
    space: &FragmentSpace,
    a: &Option<ApClass>,
    b: &Option<ApClass>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => space.compatible(a, b),
        _ => true,
    }
}

/// True when a ring path crosses the boundary of the branch rooted at `root`.
fn severs_ring(graph: &DGraph, root: i64) -> bool {
    let branch = graph.branch_ids(root);
    graph.rings().iter().any(|ring| {
        let inside = ring.path.iter().filter(|id| branch.contains(id)).count();
        inside > 0 && inside < ring.path.len()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fragspace::{ApDescriptor, BuildingBlock};
    use crate::core::models::attachment::BondType;
    use crate::core::models::edge::Edge;
    use crate::core::models::symmetry::SymmetricSet;
    use crate::core::models::vertex::{BuildingBlockType, PayloadAtom, RcvType, Vertex};
    use crate::engine::isomorphism::is_isomorphic;
    use nalgebra::{Point3, Vector3};

    fn block(classes: &[&str]) -> BuildingBlock {
        BuildingBlock {
            atoms: vec![PayloadAtom {
                element: "C".into(),
                position: Point3::origin(),
            }],
            bonds: vec![],
            aps: classes
                .iter()
                .enumerate()
                .map(|(i, c)| ApDescriptor {
                    class: c.parse().unwrap(),
                    bond_type: BondType::Single,
                    direction: if i % 2 == 0 { Vector3::x() } else { Vector3::y() },
                    anchor: 0,
                })
                .collect(),
        }
    }

    fn create_space() -> FragmentSpace {
        let mut space = FragmentSpace::new();
        space.add_block(BuildingBlockType::Scaffold, block(&["c:0", "c:0", "c:0"]));
        space.add_block(BuildingBlockType::Fragment, block(&["c:0", "c:0"]));
        space.add_block(BuildingBlockType::Fragment, block(&["c:0"]));
        space.add_compatibility("c:0".parse().unwrap(), "c:0".parse().unwrap());
        space
    }

    /// Scaffold with a chain of `arm` fragments on AP 0. Returns the graph
    /// and the first chain vertex's ID.
    fn create_parent(space: &FragmentSpace, ids: &IdAllocator, arm: usize) -> (DGraph, i64) {
        let mut graph = DGraph::with_graph_id(ids.next_graph_id());
        let scaffold = ids.next_vertex_id();
        graph
            .add_vertex(
                space
                    .instantiate(BuildingBlockType::Scaffold, 0, scaffold)
                    .unwrap(),
            )
            .unwrap();
        let mut attach_to = ApRef::new(scaffold, 0);
        let mut first = None;
        for _ in 0..arm {
            let id = ids.next_vertex_id();
            first.get_or_insert(id);
            graph
                .add_vertex(
                    space
                        .instantiate(BuildingBlockType::Fragment, 0, id)
                        .unwrap(),
                )
                .unwrap();
            graph
                .add_edge(
                    Edge::new(attach_to, ApRef::new(id, 0), BondType::Single),
                    Some(space),
                )
                .unwrap();
            attach_to = ApRef::new(id, 1);
        }
        (graph, first.unwrap())
    }

    #[test]
    fn swaps_branches_between_parents() {
        let space = create_space();
        let ids = IdAllocator::new();
        let (male, m_cut) = create_parent(&space, &ids, 1);
        let (female, f_cut) = create_parent(&space, &ids, 3);

        let (male_line, female_line) =
            crossover(&male, m_cut, &female, f_cut, &space, &ids, false)
                .unwrap()
                .unwrap();

        // The arms traded places: 1-long arm became 3-long and vice versa.
        assert_eq!(male_line.vertex_count(), 4);
        assert_eq!(female_line.vertex_count(), 2);
        male_line.check_consistency().unwrap();
        female_line.check_consistency().unwrap();
        assert!(is_isomorphic(&male_line, &female));
        assert!(is_isomorphic(&female_line, &male));
    }

    #[test]
    fn cut_at_source_vertex_is_failure_as_value() {
        let space = create_space();
        let ids = IdAllocator::new();
        let (male, _) = create_parent(&space, &ids, 1);
        let (female, f_cut) = create_parent(&space, &ids, 2);
        let male_root = male.source().unwrap().id();
        let male_before = male.clone();
        let female_before = female.clone();

        let result = crossover(&male, male_root, &female, f_cut, &space, &ids, false).unwrap();
        assert!(result.is_none());
        assert!(is_isomorphic(&male, &male_before));
        assert!(is_isomorphic(&female, &female_before));
    }

    #[test]
    fn bond_type_mismatch_at_the_cut_is_failure_as_value() {
        use crate::core::models::attachment::AttachmentPoint;

        let space = create_space();
        let ids = IdAllocator::new();
        let ap = |bond: BondType| {
            AttachmentPoint::new(Some("c:0".parse().unwrap()), bond, Vector3::x())
        };

        // Male stub declares a double bond, the female branch root a single.
        let mut male = DGraph::with_graph_id(ids.next_graph_id());
        let m_root = ids.next_vertex_id();
        male.add_vertex(Vertex::empty(m_root, vec![ap(BondType::Double)]))
            .unwrap();
        let m_cut = ids.next_vertex_id();
        male.add_vertex(Vertex::empty(m_cut, vec![ap(BondType::Double)]))
            .unwrap();
        male.add_edge(
            Edge::new(ApRef::new(m_root, 0), ApRef::new(m_cut, 0), BondType::Double),
            Some(&space),
        )
        .unwrap();

        let mut female = DGraph::with_graph_id(ids.next_graph_id());
        let f_root = ids.next_vertex_id();
        female
            .add_vertex(Vertex::empty(f_root, vec![ap(BondType::Single)]))
            .unwrap();
        let f_cut = ids.next_vertex_id();
        female
            .add_vertex(Vertex::empty(f_cut, vec![ap(BondType::Single)]))
            .unwrap();
        female
            .add_edge(
                Edge::new(ApRef::new(f_root, 0), ApRef::new(f_cut, 0), BondType::Single),
                Some(&space),
            )
            .unwrap();

        // Classes are compatible, so only the bond types block the swap.
        let result = crossover(&male, m_cut, &female, f_cut, &space, &ids, false).unwrap();
        assert!(result.is_none());

        // An `Any` stub on both sides of one parent accepts the single bond.
        let mut open = DGraph::with_graph_id(ids.next_graph_id());
        let o_root = ids.next_vertex_id();
        open.add_vertex(Vertex::empty(o_root, vec![ap(BondType::Any)]))
            .unwrap();
        let o_cut = ids.next_vertex_id();
        open.add_vertex(Vertex::empty(o_cut, vec![ap(BondType::Any)]))
            .unwrap();
        open.add_edge(
            Edge::new(ApRef::new(o_root, 0), ApRef::new(o_cut, 0), BondType::Single),
            Some(&space),
        )
        .unwrap();
        let offspring = crossover(&open, o_cut, &female, f_cut, &space, &ids, false).unwrap();
        assert!(offspring.is_some());
    }

    #[test]
    fn overlapping_vertex_ids_are_rejected() {
        let space = create_space();
        let ids = IdAllocator::new();
        let (male, m_cut) = create_parent(&space, &ids, 1);
        let female = male.clone();

        let result = crossover(&male, m_cut, &female, m_cut, &space, &ids, false);
        assert!(matches!(result, Err(OperationError::IdCollision(_))));
    }

    #[test]
    fn severed_ring_path_blocks_the_swap() {
        let space = create_space();
        let ids = IdAllocator::new();
        let (mut male, m_cut) = create_parent(&space, &ids, 2);
        // Ring through the cut: RCVs on the scaffold and on the arm tip.
        let scaffold = male.source().unwrap().id();
        let tip = male.branch_ids(m_cut)[1];
        let head = ids.next_vertex_id();
        male.add_vertex(Vertex::ring_closing(head, RcvType::Plus, None, BondType::Single))
            .unwrap();
        male.add_edge(
            Edge::new(ApRef::new(scaffold, 1), ApRef::new(head, 0), BondType::Single),
            None,
        )
        .unwrap();
        let tail = ids.next_vertex_id();
        male.add_vertex(Vertex::ring_closing(tail, RcvType::Minus, None, BondType::Single))
            .unwrap();
        male.add_edge(
            Edge::new(ApRef::new(tip, 1), ApRef::new(tail, 0), BondType::Single),
            None,
        )
        .unwrap();
        male.add_ring(head, tail).unwrap();

        let (female, f_cut) = create_parent(&space, &ids, 1);
        let result = crossover(&male, m_cut, &female, f_cut, &space, &ids, false).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn symmetric_flag_mirrors_the_cut_across_siblings() {
        let space = create_space();
        let ids = IdAllocator::new();

        // Scaffold with two one-fragment arms marked symmetric.
        let mut male = DGraph::with_graph_id(ids.next_graph_id());
        let scaffold = ids.next_vertex_id();
        male.add_vertex(
            space
                .instantiate(BuildingBlockType::Scaffold, 0, scaffold)
                .unwrap(),
        )
        .unwrap();
        let mut arms = Vec::new();
        for ap in 0..2 {
            let id = ids.next_vertex_id();
            arms.push(id);
            male.add_vertex(
                space
                    .instantiate(BuildingBlockType::Fragment, 0, id)
                    .unwrap(),
            )
            .unwrap();
            male.add_edge(
                Edge::new(ApRef::new(scaffold, ap), ApRef::new(id, 0), BondType::Single),
                Some(&space),
            )
            .unwrap();
        }
        male.add_symmetric_set(SymmetricSet::new(arms.clone())).unwrap();

        let (female, f_cut) = create_parent(&space, &ids, 2);
        let (male_line, _) =
            crossover(&male, arms[0], &female, f_cut, &space, &ids, true)
                .unwrap()
                .unwrap();

        // Both arms now carry the female's 2-fragment branch.
        assert_eq!(male_line.vertex_count(), 5);
        let children = male_line.children_of(scaffold);
        assert_eq!(children.len(), 2);
        for child in children {
            assert_eq!(male_line.branch_ids(child).len(), 2);
        }
        male_line.check_consistency().unwrap();
    }
}
