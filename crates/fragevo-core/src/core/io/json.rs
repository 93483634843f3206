//! The persisted JSON graph encoding.
//!
//! Graphs are mirrored into plain serde records before serialization: slot
//! keys are an in-memory detail and AP usage flags are derivable from the
//! edge list, so neither is persisted. Templates serialize recursively.

use super::EncodingError;
use crate::core::models::attachment::{ApClass, AttachmentPoint, BondType};
use crate::core::models::edge::{ApRef, Edge};
use crate::core::models::graph::DGraph;
use crate::core::models::symmetry::SymmetricSet;
use crate::core::models::vertex::{
    BuildingBlockType, FragmentPayload, PayloadAtom, Template, Vertex, VertexKind,
};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRecord {
    pub graph_id: i64,
    pub level: i32,
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
    pub rings: Vec<RingRecord>,
    pub symmetric_sets: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: i64,
    pub bb_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_index: Option<usize>,
    pub kind: KindRecord,
    pub aps: Vec<ApRecord>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindRecord {
    Fragment {
        atoms: Vec<AtomRecord>,
        bonds: Vec<BondRecord>,
        ap_anchors: Vec<usize>,
    },
    Empty,
    RingClosing {
        rcv_type: String,
    },
    Template {
        inner: Box<GraphRecord>,
        projection: Vec<ApRefRecord>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomRecord {
    pub element: String,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondRecord {
    pub src: usize,
    pub trg: usize,
    pub bond: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub bond: String,
    pub direction: [f64; 3],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApRefRecord {
    pub vertex: i64,
    pub ap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: ApRefRecord,
    pub trg: ApRefRecord,
    pub bond: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingRecord {
    pub head: i64,
    pub tail: i64,
    pub path: Vec<i64>,
    pub bond: String,
}

/// Serializes a graph to pretty-printed JSON.
pub fn to_json(graph: &DGraph) -> Result<String, EncodingError> {
    Ok(serde_json::to_string_pretty(&to_record(graph))?)
}

/// Reconstructs a graph from its JSON encoding.
pub fn from_json(text: &str) -> Result<DGraph, EncodingError> {
    let record: GraphRecord = serde_json::from_str(text)?;
    from_record(&record)
}

pub fn to_record(graph: &DGraph) -> GraphRecord {
    GraphRecord {
        graph_id: graph.graph_id(),
        level: graph.level(),
        vertices: graph.vertices().map(vertex_record).collect(),
        edges: graph
            .edges()
            .iter()
            .map(|e| EdgeRecord {
                src: ap_ref_record(e.src),
                trg: ap_ref_record(e.trg),
                bond: e.bond_type.code().to_string(),
            })
            .collect(),
        rings: graph
            .rings()
            .iter()
            .map(|r| RingRecord {
                head: r.head,
                tail: r.tail,
                path: r.path.clone(),
                bond: r.bond_type.code().to_string(),
            })
            .collect(),
        symmetric_sets: graph
            .symmetric_sets()
            .iter()
            .map(|s| s.ids().to_vec())
            .collect(),
    }
}

fn ap_ref_record(ap_ref: ApRef) -> ApRefRecord {
    ApRefRecord {
        vertex: ap_ref.vertex,
        ap: ap_ref.ap,
    }
}

fn vertex_record(vertex: &Vertex) -> VertexRecord {
    let kind = match &vertex.kind {
        VertexKind::Fragment(p) => KindRecord::Fragment {
            atoms: p
                .atoms
                .iter()
                .map(|a| AtomRecord {
                    element: a.element.clone(),
                    position: [a.position.x, a.position.y, a.position.z],
                })
                .collect(),
            bonds: p
                .bonds
                .iter()
                .map(|(s, t, b)| BondRecord {
                    src: *s,
                    trg: *t,
                    bond: b.code().to_string(),
                })
                .collect(),
            ap_anchors: p.ap_anchors.clone(),
        },
        VertexKind::Empty => KindRecord::Empty,
        VertexKind::RingClosing(t) => KindRecord::RingClosing {
            rcv_type: t.label().to_string(),
        },
        VertexKind::Template(t) => KindRecord::Template {
            inner: Box::new(to_record(&t.inner)),
            projection: t.projection.iter().map(|r| ap_ref_record(*r)).collect(),
        },
    };
    VertexRecord {
        id: vertex.id(),
        bb_type: vertex.bb_type.code().to_string(),
        library_index: vertex.library_index,
        kind,
        aps: vertex
            .aps()
            .iter()
            .map(|ap| ApRecord {
                class: ap.class.as_ref().map(|c| c.to_string()),
                bond: ap.bond_type.code().to_string(),
                direction: [ap.direction.x, ap.direction.y, ap.direction.z],
            })
            .collect(),
        properties: vertex.properties.clone(),
    }
}

pub fn from_record(record: &GraphRecord) -> Result<DGraph, EncodingError> {
    let mut graph = DGraph::with_graph_id(record.graph_id);
    graph.set_level(record.level);
    for v in &record.vertices {
        graph.add_vertex(vertex_from_record(v)?)?;
    }
    for e in &record.edges {
        graph.add_edge(
            Edge::new(
                ApRef::new(e.src.vertex, e.src.ap),
                ApRef::new(e.trg.vertex, e.trg.ap),
                parse_bond(&e.bond)?,
            ),
            None,
        )?;
    }
    for r in &record.rings {
        graph.add_ring(r.head, r.tail)?;
    }
    for ids in &record.symmetric_sets {
        graph.add_symmetric_set(SymmetricSet::new(ids.clone()))?;
    }
    Ok(graph)
}

fn vertex_from_record(record: &VertexRecord) -> Result<Vertex, EncodingError> {
    let kind = match &record.kind {
        KindRecord::Fragment {
            atoms,
            bonds,
            ap_anchors,
        } => {
            let payload = FragmentPayload {
                atoms: atoms
                    .iter()
                    .map(|a| PayloadAtom {
                        element: a.element.clone(),
                        position: Point3::new(a.position[0], a.position[1], a.position[2]),
                    })
                    .collect(),
                bonds: bonds
                    .iter()
                    .map(|b| Ok((b.src, b.trg, parse_bond(&b.bond)?)))
                    .collect::<Result<_, EncodingError>>()?,
                ap_anchors: ap_anchors.clone(),
            };
            VertexKind::Fragment(payload)
        }
        KindRecord::Empty => VertexKind::Empty,
        KindRecord::RingClosing { rcv_type } => VertexKind::RingClosing(
            rcv_type
                .parse()
                .map_err(|_| EncodingError::malformed(rcv_type, "bad RCV type"))?,
        ),
        KindRecord::Template { inner, projection } => VertexKind::Template(Template {
            inner: Box::new(from_record(inner)?),
            projection: projection
                .iter()
                .map(|r| ApRef::new(r.vertex, r.ap))
                .collect(),
        }),
    };
    let bb_type: BuildingBlockType = record
        .bb_type
        .parse()
        .map_err(|_| EncodingError::malformed(&record.bb_type, "bad building block code"))?;
    let aps = record
        .aps
        .iter()
        .map(|ap| {
            let class = match &ap.class {
                Some(s) => Some(
                    s.parse::<ApClass>()
                        .map_err(|e| EncodingError::malformed(s, e.to_string()))?,
                ),
                None => None,
            };
            Ok(AttachmentPoint::new(
                class,
                parse_bond(&ap.bond)?,
                Vector3::new(ap.direction[0], ap.direction[1], ap.direction[2]),
            ))
        })
        .collect::<Result<Vec<_>, EncodingError>>()?;
    let mut vertex = Vertex::new(record.id, bb_type, record.library_index, kind, aps);
    vertex.properties = record.properties.clone();
    Ok(vertex)
}

fn parse_bond(field: &str) -> Result<BondType, EncodingError> {
    field
        .parse::<BondType>()
        .map_err(|_| EncodingError::malformed(field, "bad bond type"))
}
