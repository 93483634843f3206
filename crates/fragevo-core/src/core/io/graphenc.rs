//! The one-line string graph encoding.
//!
//! Layout, whitespace-separated:
//!
//! ```text
//! <graphId> <vertices> <edges> [R[...]]* [S[...]]*
//! ```
//!
//! Vertices and edges are comma-separated token lists (`-` when empty).
//! A library-backed vertex is `id_B_lib` with `B` the building-block code
//! (S/F/C); a ring-closing vertex is `id_R_LBL_bond[_class]`. An edge is
//! `srcV_srcAp_trgV_trgAp_bond`. Rings are `R[head-tail-bond-p.p.p]` and
//! symmetric sets `S[id.id.id]`.
//!
//! Empty and template vertices have no token form; graphs containing them
//! are persisted through the JSON encoding instead.

use super::EncodingError;
use crate::core::fragspace::FragmentSpace;
use crate::core::models::attachment::{ApClass, BondType};
use crate::core::models::edge::{ApRef, Edge};
use crate::core::models::graph::DGraph;
use crate::core::models::symmetry::SymmetricSet;
use crate::core::models::vertex::{BuildingBlockType, Vertex, VertexKind};

const EMPTY_LIST: &str = "-";

/// Encodes a graph as a single line.
pub fn encode(graph: &DGraph) -> Result<String, EncodingError> {
    let mut out = graph.graph_id().to_string();
    out.push(' ');

    if graph.vertex_count() == 0 {
        out.push_str(EMPTY_LIST);
    } else {
        for vertex in graph.vertices() {
            out.push_str(&vertex_token(vertex)?);
            out.push(',');
        }
    }
    out.push(' ');

    if graph.edges().is_empty() {
        out.push_str(EMPTY_LIST);
    } else {
        for edge in graph.edges() {
            out.push_str(&format!(
                "{}_{}_{}_{}_{}",
                edge.src.vertex,
                edge.src.ap,
                edge.trg.vertex,
                edge.trg.ap,
                edge.bond_type.code()
            ));
            out.push(',');
        }
    }

    for ring in graph.rings() {
        let path: Vec<String> = ring.path.iter().map(|id| id.to_string()).collect();
        out.push_str(&format!(
            " R[{}-{}-{}-{}]",
            ring.head,
            ring.tail,
            ring.bond_type.code(),
            path.join(".")
        ));
    }
    for set in graph.symmetric_sets() {
        let ids: Vec<String> = set.ids().iter().map(|id| id.to_string()).collect();
        out.push_str(&format!(" S[{}]", ids.join(".")));
    }
    Ok(out)
}

fn vertex_token(vertex: &Vertex) -> Result<String, EncodingError> {
    match &vertex.kind {
        VertexKind::Fragment(_) => {
            let lib = vertex.library_index.ok_or_else(|| {
                EncodingError::malformed(
                    &vertex.id().to_string(),
                    "fragment vertex without a library index",
                )
            })?;
            Ok(format!("{}_{}_{}", vertex.id(), vertex.bb_type.code(), lib))
        }
        VertexKind::RingClosing(t) => {
            let ap = vertex.ap(0).expect("RCV has one AP");
            let mut token = format!(
                "{}_R_{}_{}",
                vertex.id(),
                t.label(),
                ap.bond_type.code()
            );
            if let Some(class) = &ap.class {
                token.push('_');
                token.push_str(&class.to_string());
            }
            Ok(token)
        }
        VertexKind::Empty => Err(EncodingError::Unsupported("empty")),
        VertexKind::Template(_) => Err(EncodingError::Unsupported("template")),
    }
}

/// Reconstructs a graph from its line encoding, instantiating library-backed
/// vertices from the given fragment space.
pub fn decode(text: &str, space: &FragmentSpace) -> Result<DGraph, EncodingError> {
    let mut tokens = text.split_whitespace();
    let id_token = tokens
        .next()
        .ok_or_else(|| EncodingError::malformed(text, "empty encoding"))?;
    let graph_id = parse_i64(id_token)?;
    let mut graph = DGraph::with_graph_id(graph_id);

    let vertex_list = tokens.next().unwrap_or(EMPTY_LIST);
    if vertex_list != EMPTY_LIST {
        for token in vertex_list.split(',').filter(|t| !t.is_empty()) {
            graph.add_vertex(decode_vertex(token, space)?)?;
        }
    }

    let edge_list = tokens.next().unwrap_or(EMPTY_LIST);
    if edge_list != EMPTY_LIST {
        for token in edge_list.split(',').filter(|t| !t.is_empty()) {
            graph.add_edge(decode_edge(token)?, None)?;
        }
    }

    for token in tokens {
        if let Some(body) = token.strip_prefix("R[").and_then(|t| t.strip_suffix(']')) {
            let fields: Vec<&str> = body.split('-').collect();
            if fields.len() != 4 {
                return Err(EncodingError::malformed(token, "ring needs 4 fields"));
            }
            let head = parse_i64(fields[0])?;
            let tail = parse_i64(fields[1])?;
            graph.add_ring(head, tail)?;
        } else if let Some(body) = token.strip_prefix("S[").and_then(|t| t.strip_suffix(']')) {
            let ids = body
                .split('.')
                .filter(|t| !t.is_empty())
                .map(parse_i64)
                .collect::<Result<Vec<_>, _>>()?;
            graph.add_symmetric_set(SymmetricSet::new(ids))?;
        } else {
            return Err(EncodingError::malformed(token, "unrecognized trailer"));
        }
    }
    Ok(graph)
}

fn decode_vertex(token: &str, space: &FragmentSpace) -> Result<Vertex, EncodingError> {
    let fields: Vec<&str> = token.split('_').collect();
    if fields.len() < 3 {
        return Err(EncodingError::malformed(token, "vertex needs 3+ fields"));
    }
    let id = parse_i64(fields[0])?;
    match fields[1] {
        "R" => {
            if fields.len() < 4 {
                return Err(EncodingError::malformed(token, "RCV needs 4+ fields"));
            }
            let rcv_type = fields[2]
                .parse()
                .map_err(|_| EncodingError::malformed(token, "bad RCV type"))?;
            let bond = parse_bond(token, fields[3])?;
            let class = match fields.get(4) {
                Some(s) => Some(
                    s.parse::<ApClass>()
                        .map_err(|e| EncodingError::malformed(token, e.to_string()))?,
                ),
                None => None,
            };
            Ok(Vertex::ring_closing(id, rcv_type, class, bond))
        }
        code => {
            let bb_type: BuildingBlockType = code
                .parse()
                .map_err(|_| EncodingError::malformed(token, "bad building block code"))?;
            let lib = fields[2]
                .parse::<usize>()
                .map_err(|_| EncodingError::malformed(token, "bad library index"))?;
            Ok(space.instantiate(bb_type, lib, id)?)
        }
    }
}

fn decode_edge(token: &str) -> Result<Edge, EncodingError> {
    let fields: Vec<&str> = token.split('_').collect();
    if fields.len() != 5 {
        return Err(EncodingError::malformed(token, "edge needs 5 fields"));
    }
    let src = ApRef::new(parse_i64(fields[0])?, parse_usize(token, fields[1])?);
    let trg = ApRef::new(parse_i64(fields[2])?, parse_usize(token, fields[3])?);
    Ok(Edge::new(src, trg, parse_bond(token, fields[4])?))
}

fn parse_i64(token: &str) -> Result<i64, EncodingError> {
    token
        .parse::<i64>()
        .map_err(|_| EncodingError::malformed(token, "expected an integer"))
}

fn parse_usize(token: &str, field: &str) -> Result<usize, EncodingError> {
    field
        .parse::<usize>()
        .map_err(|_| EncodingError::malformed(token, "expected an index"))
}

fn parse_bond(token: &str, field: &str) -> Result<BondType, EncodingError> {
    field
        .parse::<BondType>()
        .map_err(|_| EncodingError::malformed(token, "bad bond type"))
}
