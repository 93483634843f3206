//! Renders a finished graph into atoms, bonds, and 3D coordinates.
//!
//! Each vertex's atom payload is placed by aligning the AP direction of its
//! edge to the parent against the parent AP's direction, then translating
//! the anchor atom to the contact point predicted by covalent radii. Ring
//! closure replaces the two RCV pseudo-atoms of a ring with one bond
//! between their anchor atoms.
//!
//! Geometry here is a topology-faithful starting conformation for an
//! external optimizer, not a force-field result.

use crate::core::models::attachment::BondType;
use crate::core::models::graph::DGraph;
use crate::core::models::ring::Ring;
use crate::core::models::vertex::{Vertex, VertexKind};
use crate::engine::error::OperationError;
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use phf::phf_map;
use std::collections::HashMap;
use tracing::debug;

/// Single-bond covalent radii in angstroms (Cordero 2008).
static COVALENT_RADII: phf::Map<&'static str, f64> = phf_map! {
    "H" => 0.31,
    "B" => 0.84,
    "C" => 0.76,
    "N" => 0.71,
    "O" => 0.66,
    "F" => 0.57,
    "Si" => 1.11,
    "P" => 1.07,
    "S" => 1.05,
    "Cl" => 1.02,
    "Br" => 1.20,
    "I" => 1.39,
};

const FALLBACK_RADIUS: f64 = 0.77;

fn covalent_radius(element: &str) -> f64 {
    COVALENT_RADII.get(element).copied().unwrap_or(FALLBACK_RADIUS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom3d {
    pub element: String,
    pub position: Point3<f64>,
}

/// Assembled chemical structure.
#[derive(Debug, Clone, Default)]
pub struct Molecule3d {
    pub atoms: Vec<Atom3d>,
    pub bonds: Vec<(usize, usize, BondType)>,
    /// Auxiliary tags (graph id, fitness, error annotations) that must
    /// survive downstream read-modify-write cycles.
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    /// Builds the 3D structure of `graph`.
    ///
    /// With `close_rings`, every declared ring's RCV pseudo-atom pair is
    /// removed and replaced by one chord bond; otherwise the pseudo-atoms
    /// stay in the output.
    pub fn assemble(
        &self,
        graph: &DGraph,
        close_rings: bool,
    ) -> Result<Molecule3d, OperationError> {
        let local = assemble_local(graph, close_rings)?;
        let mut properties = HashMap::new();
        properties.insert("graph_id".to_string(), graph.graph_id().to_string());
        debug!(
            atoms = local.atoms.len(),
            bonds = local.bonds.len(),
            close_rings,
            "graph assembled"
        );
        Ok(Molecule3d {
            atoms: local.atoms,
            bonds: local.bonds,
            properties,
        })
    }
}

/// World-frame attachment data of one placed AP.
#[derive(Debug, Clone)]
struct ApWorld {
    direction: Vector3<f64>,
    anchor_pos: Point3<f64>,
    anchor_atom: Option<usize>,
    radius: f64,
}

#[derive(Debug, Default)]
struct LocalMol {
    atoms: Vec<Atom3d>,
    bonds: Vec<(usize, usize, BondType)>,
    aps: HashMap<(i64, usize), ApWorld>,
    /// Pseudo-atom index per placed RCV.
    rcv_atoms: HashMap<i64, usize>,
}

/// Local-frame geometry of one vertex before placement.
struct VertexGeometry {
    atoms: Vec<Atom3d>,
    bonds: Vec<(usize, usize, BondType)>,
    /// Per AP: local anchor atom index, direction, anchor position.
    ap_anchor: Vec<Option<usize>>,
    ap_dir: Vec<Vector3<f64>>,
    ap_anchor_pos: Vec<Point3<f64>>,
    rcv_pseudo: Option<usize>,
}

fn geometry_of(vertex: &Vertex, close_rings: bool) -> Result<VertexGeometry, OperationError> {
    let ap_count = vertex.aps().len();
    let mut geometry = VertexGeometry {
        atoms: Vec::new(),
        bonds: Vec::new(),
        ap_anchor: vec![None; ap_count],
        ap_dir: vertex.aps().iter().map(|ap| ap.direction).collect(),
        ap_anchor_pos: vec![Point3::origin(); ap_count],
        rcv_pseudo: None,
    };
    match &vertex.kind {
        VertexKind::Fragment(payload) => {
            geometry.atoms = payload
                .atoms
                .iter()
                .map(|a| Atom3d {
                    element: a.element.clone(),
                    position: a.position,
                })
                .collect();
            geometry.bonds = payload.bonds.clone();
            for index in 0..ap_count {
                let anchor = payload.ap_anchors.get(index).copied().ok_or_else(|| {
                    OperationError::assembly(format!(
                        "vertex {} AP {index} has no anchor atom",
                        vertex.id()
                    ))
                })?;
                if anchor >= geometry.atoms.len() {
                    return Err(OperationError::assembly(format!(
                        "vertex {} AP {index} anchor out of range",
                        vertex.id()
                    )));
                }
                geometry.ap_anchor[index] = Some(anchor);
                geometry.ap_anchor_pos[index] = geometry.atoms[anchor].position;
            }
        }
        VertexKind::Empty => {}
        VertexKind::RingClosing(rcv_type) => {
            geometry.atoms.push(Atom3d {
                element: rcv_type.label().to_string(),
                position: Point3::origin(),
            });
            geometry.rcv_pseudo = Some(0);
            for index in 0..ap_count {
                geometry.ap_anchor[index] = Some(0);
            }
        }
        VertexKind::Template(template) => {
            let inner = assemble_local(&template.inner, close_rings)?;
            for index in 0..ap_count {
                let inner_ref = template.projection.get(index).ok_or_else(|| {
                    OperationError::assembly(format!(
                        "vertex {} AP {index} has no projection target",
                        vertex.id()
                    ))
                })?;
                let world = inner
                    .aps
                    .get(&(inner_ref.vertex, inner_ref.ap))
                    .ok_or_else(|| {
                        OperationError::assembly(format!(
                            "projection of vertex {} AP {index} does not resolve",
                            vertex.id()
                        ))
                    })?;
                geometry.ap_anchor[index] = world.anchor_atom;
                geometry.ap_dir[index] = world.direction;
                geometry.ap_anchor_pos[index] = world.anchor_pos;
            }
            geometry.atoms = inner.atoms;
            geometry.bonds = inner.bonds;
        }
    }
    Ok(geometry)
}

fn assemble_local(graph: &DGraph, close_rings: bool) -> Result<LocalMol, OperationError> {
    let source = graph
        .source()
        .ok_or_else(|| OperationError::assembly("graph has no source vertex"))?;
    let mut local = LocalMol::default();
    let mut placed = 0usize;

    // DFS from the source so every parent is placed before its children.
    let mut stack = vec![source.id()];
    while let Some(vertex_id) = stack.pop() {
        let vertex = graph.vertex(vertex_id).unwrap();
        let geometry = geometry_of(vertex, close_rings)?;

        let (rotation, translation, parent_anchor) = match graph.edge_to_parent(vertex_id) {
            None => (Rotation3::identity(), Vector3::zeros(), None),
            Some(edge) => {
                let parent = local.aps.get(&(edge.src.vertex, edge.src.ap)).ok_or_else(
                    || {
                        OperationError::assembly(format!(
                            "parent AP of vertex {vertex_id} was never placed"
                        ))
                    },
                )?;
                let ap_index = edge.trg.ap;
                let child_dir = geometry.ap_dir[ap_index];
                let rotation = align(&child_dir, &-parent.direction);
                let child_radius = geometry.ap_anchor[ap_index]
                    .map(|a| covalent_radius(&geometry.atoms[a].element))
                    .unwrap_or(0.0);
                let reach = if geometry.ap_anchor[ap_index].is_some() {
                    parent.radius + child_radius
                } else {
                    0.0
                };
                let contact = parent.anchor_pos + normalized_or_x(&parent.direction) * reach;
                let translation =
                    contact - rotation * geometry.ap_anchor_pos[ap_index].coords;
                (rotation, translation.coords, parent.anchor_atom)
            }
        };

        let offset = local.atoms.len();
        for atom in &geometry.atoms {
            local.atoms.push(Atom3d {
                element: atom.element.clone(),
                position: (rotation * atom.position.coords + translation).into(),
            });
        }
        for (a, b, bond) in &geometry.bonds {
            local.bonds.push((offset + a, offset + b, *bond));
        }
        if let Some(edge) = graph.edge_to_parent(vertex_id) {
            let child_anchor = geometry.ap_anchor[edge.trg.ap].map(|a| offset + a);
            if let (Some(p), Some(c)) = (parent_anchor, child_anchor) {
                local.bonds.push((p, c, edge.bond_type));
            }
        }
        if let Some(pseudo) = geometry.rcv_pseudo {
            local.rcv_atoms.insert(vertex_id, offset + pseudo);
        }
        for (index, dir) in geometry.ap_dir.iter().enumerate() {
            let anchor_atom = geometry.ap_anchor[index].map(|a| offset + a);
            local.aps.insert(
                (vertex_id, index),
                ApWorld {
                    direction: rotation * dir,
                    anchor_pos: (rotation * geometry.ap_anchor_pos[index].coords
                        + translation)
                        .into(),
                    radius: anchor_atom
                        .map(|a| covalent_radius(&local.atoms[a].element))
                        .unwrap_or(FALLBACK_RADIUS),
                    anchor_atom,
                },
            );
        }

        placed += 1;
        stack.extend(graph.children_of(vertex_id));
    }
    if placed != graph.vertex_count() {
        return Err(OperationError::assembly(
            "graph is not connected from its source vertex",
        ));
    }

    if close_rings {
        close_ring_chords(&mut local, graph.rings())?;
    }
    Ok(local)
}

/// Replaces each ring's RCV pseudo-atom pair with one chord bond between
/// the atoms they were anchored to.
fn close_ring_chords(local: &mut LocalMol, rings: &[Ring]) -> Result<(), OperationError> {
    let mut removed: Vec<usize> = Vec::new();
    for ring in rings {
        let head = *local.rcv_atoms.get(&ring.head).ok_or_else(|| {
            OperationError::assembly(format!("ring head {} was not placed", ring.head))
        })?;
        let tail = *local.rcv_atoms.get(&ring.tail).ok_or_else(|| {
            OperationError::assembly(format!("ring tail {} was not placed", ring.tail))
        })?;
        let head_anchor = bonded_partner(&local.bonds, head).ok_or_else(|| {
            OperationError::assembly("ring-closing pseudo-atom has no anchor bond")
        })?;
        let tail_anchor = bonded_partner(&local.bonds, tail).ok_or_else(|| {
            OperationError::assembly("ring-closing pseudo-atom has no anchor bond")
        })?;
        local.bonds.push((head_anchor, tail_anchor, ring.bond_type));
        removed.push(head);
        removed.push(tail);
    }
    if removed.is_empty() {
        return Ok(());
    }
    removed.sort_unstable();
    removed.dedup();

    let mut remap: Vec<Option<usize>> = Vec::with_capacity(local.atoms.len());
    let mut next = 0usize;
    for index in 0..local.atoms.len() {
        if removed.binary_search(&index).is_ok() {
            remap.push(None);
        } else {
            remap.push(Some(next));
            next += 1;
        }
    }
    local.atoms = local
        .atoms
        .iter()
        .enumerate()
        .filter(|(i, _)| remap[*i].is_some())
        .map(|(_, a)| a.clone())
        .collect();
    local.bonds = local
        .bonds
        .iter()
        .filter_map(|(a, b, bond)| Some((remap[*a]?, remap[*b]?, *bond)))
        .collect();
    for world in local.aps.values_mut() {
        world.anchor_atom = world.anchor_atom.and_then(|a| remap[a]);
    }
    local.rcv_atoms.clear();
    Ok(())
}

fn bonded_partner(bonds: &[(usize, usize, BondType)], atom: usize) -> Option<usize> {
    bonds.iter().find_map(|(a, b, _)| {
        if *a == atom {
            Some(*b)
        } else if *b == atom {
            Some(*a)
        } else {
            None
        }
    })
}

fn align(from: &Vector3<f64>, to: &Vector3<f64>) -> Rotation3<f64> {
    if from.norm() < 1e-9 || to.norm() < 1e-9 {
        return Rotation3::identity();
    }
    Rotation3::rotation_between(from, to).unwrap_or_else(|| {
        // Anti-parallel vectors: half turn around any orthogonal axis.
        let axis = if from.x.abs() < 0.9 {
            from.cross(&Vector3::x())
        } else {
            from.cross(&Vector3::y())
        };
        Rotation3::from_axis_angle(&Unit::new_normalize(axis), std::f64::consts::PI)
    })
}

fn normalized_or_x(v: &Vector3<f64>) -> Vector3<f64> {
    if v.norm() < 1e-9 {
        Vector3::x()
    } else {
        v.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::attachment::AttachmentPoint;
    use crate::core::models::edge::{ApRef, Edge};
    use crate::core::models::vertex::{
        BuildingBlockType, FragmentPayload, PayloadAtom, RcvType,
    };

    fn carbon_fragment(id: i64, ap_dirs: &[Vector3<f64>]) -> Vertex {
        let payload = FragmentPayload {
            atoms: vec![PayloadAtom {
                element: "C".into(),
                position: Point3::origin(),
            }],
            bonds: vec![],
            ap_anchors: vec![0; ap_dirs.len()],
        };
        let aps = ap_dirs
            .iter()
            .map(|d| AttachmentPoint::new(None, BondType::Single, *d))
            .collect();
        Vertex::new(
            id,
            BuildingBlockType::Fragment,
            None,
            VertexKind::Fragment(payload),
            aps,
        )
    }

    fn approx(a: &Point3<f64>, b: &Point3<f64>) -> bool {
        (a - b).norm() < 1e-9
    }

    #[test]
    fn places_a_child_at_covalent_contact_distance() {
        let mut graph = DGraph::new();
        graph
            .add_vertex(carbon_fragment(1, &[Vector3::x()]))
            .unwrap();
        graph
            .add_vertex(carbon_fragment(2, &[Vector3::x()]))
            .unwrap();
        graph
            .add_edge(
                Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
                None,
            )
            .unwrap();

        let molecule = Assembler::new().assemble(&graph, false).unwrap();
        assert_eq!(molecule.atoms.len(), 2);
        assert_eq!(molecule.bonds, vec![(0, 1, BondType::Single)]);
        assert!(approx(&molecule.atoms[0].position, &Point3::origin()));
        assert!(approx(&molecule.atoms[1].position, &Point3::new(1.52, 0.0, 0.0)));
        assert_eq!(molecule.properties.get("graph_id").unwrap(), "0");
    }

    #[test]
    fn pre_opposed_ap_directions_need_no_rotation() {
        let mut graph = DGraph::new();
        graph
            .add_vertex(carbon_fragment(1, &[Vector3::x()]))
            .unwrap();
        // Child AP already points back at the parent, so alignment is the
        // identity and only the translation moves the fragment.
        graph
            .add_vertex(carbon_fragment(2, &[-Vector3::x()]))
            .unwrap();
        graph
            .add_edge(
                Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
                None,
            )
            .unwrap();

        let molecule = Assembler::new().assemble(&graph, false).unwrap();
        assert!(approx(&molecule.atoms[1].position, &Point3::new(1.52, 0.0, 0.0)));
    }

    #[test]
    fn ring_closure_removes_pseudo_atoms_and_adds_one_bond() {
        // 4-carbon chain with complementary RCVs on both ends.
        let mut graph = DGraph::new();
        for id in 1..=4 {
            graph
                .add_vertex(carbon_fragment(
                    id,
                    &[Vector3::x(), Vector3::y(), Vector3::z()],
                ))
                .unwrap();
            if id > 1 {
                graph
                    .add_edge(
                        Edge::new(
                            ApRef::new(id - 1, 1),
                            ApRef::new(id, 0),
                            BondType::Single,
                        ),
                        None,
                    )
                    .unwrap();
            }
        }
        graph
            .add_vertex(Vertex::ring_closing(5, RcvType::Plus, None, BondType::Single))
            .unwrap();
        graph
            .add_edge(
                Edge::new(ApRef::new(1, 2), ApRef::new(5, 0), BondType::Single),
                None,
            )
            .unwrap();
        graph
            .add_vertex(Vertex::ring_closing(6, RcvType::Minus, None, BondType::Single))
            .unwrap();
        graph
            .add_edge(
                Edge::new(ApRef::new(4, 2), ApRef::new(6, 0), BondType::Single),
                None,
            )
            .unwrap();
        graph.add_ring(5, 6).unwrap();

        let open = Assembler::new().assemble(&graph, false).unwrap();
        assert_eq!(open.atoms.len(), 6);
        assert_eq!(open.bonds.len(), 5);
        assert!(open.atoms.iter().any(|a| a.element == "ATP"));
        assert!(open.atoms.iter().any(|a| a.element == "ATM"));

        let closed = Assembler::new().assemble(&graph, true).unwrap();
        assert_eq!(closed.atoms.len(), open.atoms.len() - 2);
        assert_eq!(closed.bonds.len(), open.bonds.len() - 1);
        assert!(closed.atoms.iter().all(|a| a.element == "C"));
        // The chord joins the two former anchor carbons.
        assert!(closed
            .bonds
            .iter()
            .any(|(a, b, _)| (*a == 0 && *b == 3) || (*a == 3 && *b == 0)));
    }

    #[test]
    fn template_vertices_contribute_their_inner_payload() {
        let mut inner = DGraph::new();
        inner
            .add_vertex(carbon_fragment(10, &[Vector3::x(), Vector3::y()]))
            .unwrap();
        inner
            .add_vertex(carbon_fragment(11, &[Vector3::x()]))
            .unwrap();
        inner
            .add_edge(
                Edge::new(ApRef::new(10, 1), ApRef::new(11, 0), BondType::Single),
                None,
            )
            .unwrap();
        let template = crate::core::models::vertex::Template {
            inner: Box::new(inner),
            projection: vec![ApRef::new(10, 0)],
        };
        let mut graph = DGraph::new();
        graph
            .add_vertex(carbon_fragment(1, &[Vector3::x()]))
            .unwrap();
        graph
            .add_vertex(Vertex::new(
                2,
                BuildingBlockType::Fragment,
                None,
                VertexKind::Template(template),
                vec![AttachmentPoint::new(None, BondType::Single, Vector3::x())],
            ))
            .unwrap();
        graph
            .add_edge(
                Edge::new(ApRef::new(1, 0), ApRef::new(2, 0), BondType::Single),
                None,
            )
            .unwrap();

        let molecule = Assembler::new().assemble(&graph, false).unwrap();
        assert_eq!(molecule.atoms.len(), 3);
        assert_eq!(molecule.bonds.len(), 2);
    }

    #[test]
    fn empty_graph_is_an_assembly_error() {
        let result = Assembler::new().assemble(&DGraph::new(), false);
        assert!(matches!(
            result,
            Err(OperationError::AssemblyFailed { .. })
        ));
    }
}
