use super::attachment::{ApClass, AttachmentPoint, BondType};
use super::edge::ApRef;
use super::graph::DGraph;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role a building block plays in graph assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BuildingBlockType {
    /// Root of a candidate molecule; every graph grows from one scaffold.
    Scaffold,
    /// Ordinary growth fragment.
    Fragment,
    /// Capping group used to saturate free attachment points.
    Cap,
    /// Synthetic vertices (empty, ring-closing) that come from no library.
    #[default]
    None,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid building block type string '{0}'")]
pub struct ParseBuildingBlockTypeError(pub String);

impl BuildingBlockType {
    /// Single-letter token used by the string graph encoding.
    pub fn code(self) -> &'static str {
        match self {
            Self::Scaffold => "S",
            Self::Fragment => "F",
            Self::Cap => "C",
            Self::None => "N",
        }
    }
}

impl FromStr for BuildingBlockType {
    type Err = ParseBuildingBlockTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "scaffold" => Ok(Self::Scaffold),
            "f" | "fragment" => Ok(Self::Fragment),
            "c" | "cap" => Ok(Self::Cap),
            "n" | "none" => Ok(Self::None),
            _ => Err(ParseBuildingBlockTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for BuildingBlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Scaffold => "Scaffold",
                Self::Fragment => "Fragment",
                Self::Cap => "Cap",
                Self::None => "None",
            }
        )
    }
}

/// Type tag of a ring-closing vertex.
///
/// Plus pairs with Minus; Neutral pairs with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RcvType {
    Plus,
    Minus,
    Neutral,
}

impl RcvType {
    pub fn is_compatible(self, other: RcvType) -> bool {
        matches!(
            (self, other),
            (RcvType::Plus, RcvType::Minus)
                | (RcvType::Minus, RcvType::Plus)
                | (RcvType::Neutral, RcvType::Neutral)
        )
    }

    /// Conventional attractor label, also used by the string encoding.
    pub fn label(self) -> &'static str {
        match self {
            RcvType::Plus => "ATP",
            RcvType::Minus => "ATM",
            RcvType::Neutral => "ATN",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid ring-closing vertex type '{0}'")]
pub struct ParseRcvTypeError(pub String);

impl FromStr for RcvType {
    type Err = ParseRcvTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ATP" => Ok(Self::Plus),
            "ATM" => Ok(Self::Minus),
            "ATN" => Ok(Self::Neutral),
            _ => Err(ParseRcvTypeError(s.to_string())),
        }
    }
}

/// One atom of a fragment's payload, in the fragment's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadAtom {
    pub element: String,
    pub position: Point3<f64>,
}

/// Atoms and intra-fragment bonds carried by a fragment vertex.
///
/// `ap_anchors[i]` is the index of the payload atom from which the vertex's
/// i-th attachment point sprouts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FragmentPayload {
    pub atoms: Vec<PayloadAtom>,
    pub bonds: Vec<(usize, usize, BondType)>,
    pub ap_anchors: Vec<usize>,
}

/// A vertex that embeds its own inner graph, exposing a subset of the inner
/// graph's free attachment points as its own.
#[derive(Debug, Clone)]
pub struct Template {
    pub inner: Box<DGraph>,
    /// `projection[i]` is the inner AP exposed as the template's i-th outer AP.
    pub projection: Vec<ApRef>,
}

/// The polymorphic part of a vertex.
#[derive(Debug, Clone)]
pub enum VertexKind {
    /// A molecular fragment with an atom payload.
    Fragment(FragmentPayload),
    /// Connective scaffolding with no atoms.
    Empty,
    /// Placeholder marking where a ring-closing bond should later form.
    RingClosing(RcvType),
    /// A vertex embedding an inner graph.
    Template(Template),
}

impl VertexKind {
    pub fn tag(&self) -> &'static str {
        match self {
            VertexKind::Fragment(_) => "fragment",
            VertexKind::Empty => "empty",
            VertexKind::RingClosing(_) => "ring-closing",
            VertexKind::Template(_) => "template",
        }
    }
}

/// A node of the molecular-design graph.
///
/// The numeric ID is scoped to the owning graph and reassigned on
/// renumbering; never use it as a durable identity across graphs.
#[derive(Debug, Clone)]
pub struct Vertex {
    id: i64,
    pub bb_type: BuildingBlockType,
    /// Index into the fragment-space library this vertex was instantiated
    /// from, when it has one.
    pub library_index: Option<usize>,
    pub kind: VertexKind,
    aps: Vec<AttachmentPoint>,
    /// Auxiliary data (symmetry hints, fitness tags, error annotations)
    /// that must survive read-modify-write cycles unchanged.
    pub properties: HashMap<String, String>,
}

impl Vertex {
    pub fn new(
        id: i64,
        bb_type: BuildingBlockType,
        library_index: Option<usize>,
        kind: VertexKind,
        aps: Vec<AttachmentPoint>,
    ) -> Self {
        Self {
            id,
            bb_type,
            library_index,
            kind,
            aps,
            properties: HashMap::new(),
        }
    }

    /// Creates a connective vertex with no atoms.
    pub fn empty(id: i64, aps: Vec<AttachmentPoint>) -> Self {
        Self::new(id, BuildingBlockType::None, None, VertexKind::Empty, aps)
    }

    /// Creates a ring-closing vertex with its single attachment point.
    pub fn ring_closing(
        id: i64,
        rcv_type: RcvType,
        class: Option<ApClass>,
        bond_type: BondType,
    ) -> Self {
        let ap = AttachmentPoint::new(class, bond_type, Vector3::x());
        Self::new(
            id,
            BuildingBlockType::None,
            None,
            VertexKind::RingClosing(rcv_type),
            vec![ap],
        )
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    pub fn aps(&self) -> &[AttachmentPoint] {
        &self.aps
    }

    pub fn ap(&self, index: usize) -> Option<&AttachmentPoint> {
        self.aps.get(index)
    }

    pub(crate) fn ap_mut(&mut self, index: usize) -> Option<&mut AttachmentPoint> {
        self.aps.get_mut(index)
    }

    /// Indices of attachment points not yet consumed by an edge.
    pub fn free_ap_indices(&self) -> Vec<usize> {
        self.aps
            .iter()
            .enumerate()
            .filter(|(_, ap)| ap.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn used_ap_count(&self) -> usize {
        self.aps.iter().filter(|ap| ap.is_used()).count()
    }

    pub fn is_rcv(&self) -> bool {
        matches!(self.kind, VertexKind::RingClosing(_))
    }

    pub fn rcv_type(&self) -> Option<RcvType> {
        match self.kind {
            VertexKind::RingClosing(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&Template> {
        match &self.kind {
            VertexKind::Template(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_template_mut(&mut self) -> Option<&mut Template> {
        match &mut self.kind {
            VertexKind::Template(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_ap_vertex(id: i64) -> Vertex {
        let aps = vec![
            AttachmentPoint::new(None, BondType::Single, Vector3::x()),
            AttachmentPoint::new(None, BondType::Single, Vector3::y()),
        ];
        Vertex::empty(id, aps)
    }

    #[test]
    fn rcv_compatibility_pairs_plus_with_minus() {
        assert!(RcvType::Plus.is_compatible(RcvType::Minus));
        assert!(RcvType::Minus.is_compatible(RcvType::Plus));
        assert!(RcvType::Neutral.is_compatible(RcvType::Neutral));
        assert!(!RcvType::Plus.is_compatible(RcvType::Plus));
        assert!(!RcvType::Plus.is_compatible(RcvType::Neutral));
        assert!(!RcvType::Minus.is_compatible(RcvType::Minus));
    }

    #[test]
    fn rcv_labels_round_trip() {
        for t in [RcvType::Plus, RcvType::Minus, RcvType::Neutral] {
            assert_eq!(t.label().parse::<RcvType>().unwrap(), t);
        }
        assert!("ATX".parse::<RcvType>().is_err());
    }

    #[test]
    fn building_block_type_codes_round_trip() {
        for t in [
            BuildingBlockType::Scaffold,
            BuildingBlockType::Fragment,
            BuildingBlockType::Cap,
            BuildingBlockType::None,
        ] {
            assert_eq!(t.code().parse::<BuildingBlockType>().unwrap(), t);
        }
    }

    #[test]
    fn ring_closing_vertex_has_exactly_one_ap() {
        let v = Vertex::ring_closing(4, RcvType::Plus, None, BondType::Single);
        assert_eq!(v.aps().len(), 1);
        assert!(v.is_rcv());
        assert_eq!(v.rcv_type(), Some(RcvType::Plus));
        assert_eq!(v.bb_type, BuildingBlockType::None);
    }

    #[test]
    fn free_ap_indices_track_usage() {
        let mut v = two_ap_vertex(1);
        assert_eq!(v.free_ap_indices(), vec![0, 1]);
        v.ap_mut(0).unwrap().mark_used();
        assert_eq!(v.free_ap_indices(), vec![1]);
        assert_eq!(v.used_ap_count(), 1);
    }
}
