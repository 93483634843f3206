use super::library::{ApDescriptor, BuildingBlock};
use crate::core::models::attachment::{ApClass, AttachmentPoint, BondType};
use crate::core::models::vertex::{BuildingBlockType, FragmentPayload, PayloadAtom, Vertex, VertexKind};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FragmentSpaceError {
    #[error("No {bb_type} building block with library index {index}")]
    UnknownBuildingBlock {
        bb_type: BuildingBlockType,
        index: usize,
    },
    #[error("Malformed fragment space rule: {0}")]
    MalformedRule(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The library of building blocks and the AP-class compatibility rules that
/// govern which attachment points may bond.
///
/// Compatibility is looked up symmetrically: two classes are compatible if
/// either lists the other. Ring-closing vertices are not governed by this
/// matrix; their pairing rule lives on
/// [`RcvType`](crate::core::models::vertex::RcvType).
#[derive(Debug, Clone, Default)]
pub struct FragmentSpace {
    scaffolds: Vec<BuildingBlock>,
    fragments: Vec<BuildingBlock>,
    capping_groups: Vec<BuildingBlock>,
    compatibility: HashMap<ApClass, Vec<ApClass>>,
    capping_rules: HashMap<ApClass, usize>,
    forbidden_ends: HashSet<ApClass>,
}

impl FragmentSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block to the library matching its role; returns its index.
    pub fn add_block(&mut self, bb_type: BuildingBlockType, block: BuildingBlock) -> usize {
        let library = match bb_type {
            BuildingBlockType::Scaffold => &mut self.scaffolds,
            BuildingBlockType::Cap => &mut self.capping_groups,
            _ => &mut self.fragments,
        };
        library.push(block);
        library.len() - 1
    }

    pub fn library(&self, bb_type: BuildingBlockType) -> &[BuildingBlock] {
        match bb_type {
            BuildingBlockType::Scaffold => &self.scaffolds,
            BuildingBlockType::Cap => &self.capping_groups,
            _ => &self.fragments,
        }
    }

    /// Declares `a` compatible with `b` (one direction is enough).
    pub fn add_compatibility(&mut self, a: ApClass, b: ApClass) {
        self.compatibility.entry(a).or_default().push(b);
    }

    pub fn compatible(&self, a: &ApClass, b: &ApClass) -> bool {
        self.compatibility
            .get(a)
            .is_some_and(|list| list.contains(b))
            || self
                .compatibility
                .get(b)
                .is_some_and(|list| list.contains(a))
    }

    pub fn set_capping_rule(&mut self, class: ApClass, capping_index: usize) {
        self.capping_rules.insert(class, capping_index);
    }

    pub fn capping_group_for(&self, class: &ApClass) -> Option<usize> {
        self.capping_rules.get(class).copied()
    }

    pub fn add_forbidden_end(&mut self, class: ApClass) {
        self.forbidden_ends.insert(class);
    }

    pub fn is_forbidden_end(&self, class: &ApClass) -> bool {
        self.forbidden_ends.contains(class)
    }

    /// Instantiates a vertex from a building block.
    pub fn instantiate(
        &self,
        bb_type: BuildingBlockType,
        index: usize,
        vertex_id: i64,
    ) -> Result<Vertex, FragmentSpaceError> {
        let block = self
            .library(bb_type)
            .get(index)
            .ok_or(FragmentSpaceError::UnknownBuildingBlock { bb_type, index })?;
        let aps = block
            .aps
            .iter()
            .map(|d| AttachmentPoint::new(Some(d.class.clone()), d.bond_type, d.direction))
            .collect();
        let payload = FragmentPayload {
            atoms: block.atoms.clone(),
            bonds: block.bonds.clone(),
            ap_anchors: block.aps.iter().map(|d| d.anchor).collect(),
        };
        Ok(Vertex::new(
            vertex_id,
            bb_type,
            Some(index),
            VertexKind::Fragment(payload),
            aps,
        ))
    }

    /// Candidate `(fragment index, AP index)` pairs whose AP class is
    /// compatible with `class`.
    pub fn compatible_fragments(&self, class: &ApClass) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (f_idx, block) in self.fragments.iter().enumerate() {
            for ap_idx in block.ap_indices_where(|c| self.compatible(class, c)) {
                out.push((f_idx, ap_idx));
            }
        }
        out
    }

    /// Loads a fragment space from its TOML definition file.
    pub fn load(path: &Path) -> Result<Self, FragmentSpaceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, FragmentSpaceError> {
        let raw: SpaceFile = toml::from_str(text)?;
        raw.build()
    }
}

// ---------------------------------------------------------------------------
// Raw file model: deserialized as-is, then validated into a FragmentSpace.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpaceFile {
    #[serde(default)]
    scaffolds: Vec<BlockFile>,
    #[serde(default)]
    fragments: Vec<BlockFile>,
    #[serde(default)]
    capping_groups: Vec<BlockFile>,
    #[serde(default)]
    compatibility: HashMap<String, Vec<String>>,
    #[serde(default)]
    capping: HashMap<String, usize>,
    #[serde(default)]
    forbidden_ends: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BlockFile {
    #[serde(default)]
    atoms: Vec<AtomFile>,
    #[serde(default)]
    bonds: Vec<BondFile>,
    aps: Vec<ApFile>,
}

#[derive(Debug, Deserialize)]
struct AtomFile {
    element: String,
    position: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct BondFile {
    src: usize,
    trg: usize,
    #[serde(default = "default_order")]
    order: String,
}

fn default_order() -> String {
    "single".to_string()
}

#[derive(Debug, Deserialize)]
struct ApFile {
    class: String,
    #[serde(default = "default_order")]
    bond: String,
    direction: [f64; 3],
    #[serde(default)]
    anchor: usize,
}

fn parse_class(s: &str) -> Result<ApClass, FragmentSpaceError> {
    s.parse::<ApClass>()
        .map_err(|e| FragmentSpaceError::MalformedRule(e.to_string()))
}

fn parse_bond(s: &str) -> Result<BondType, FragmentSpaceError> {
    s.parse::<BondType>()
        .map_err(|e| FragmentSpaceError::MalformedRule(e.to_string()))
}

impl BlockFile {
    fn build(self, label: &str) -> Result<BuildingBlock, FragmentSpaceError> {
        let atoms: Vec<PayloadAtom> = self
            .atoms
            .iter()
            .map(|a| PayloadAtom {
                element: a.element.clone(),
                position: Point3::new(a.position[0], a.position[1], a.position[2]),
            })
            .collect();
        let mut bonds = Vec::with_capacity(self.bonds.len());
        for b in &self.bonds {
            if b.src >= atoms.len() || b.trg >= atoms.len() {
                return Err(FragmentSpaceError::MalformedRule(format!(
                    "{label}: bond {}-{} references a missing atom",
                    b.src, b.trg
                )));
            }
            bonds.push((b.src, b.trg, parse_bond(&b.order)?));
        }
        let mut aps = Vec::with_capacity(self.aps.len());
        for (i, ap) in self.aps.iter().enumerate() {
            if !atoms.is_empty() && ap.anchor >= atoms.len() {
                return Err(FragmentSpaceError::MalformedRule(format!(
                    "{label}: AP {i} anchored to missing atom {}",
                    ap.anchor
                )));
            }
            aps.push(ApDescriptor {
                class: parse_class(&ap.class)?,
                bond_type: parse_bond(&ap.bond)?,
                direction: Vector3::new(ap.direction[0], ap.direction[1], ap.direction[2]),
                anchor: ap.anchor,
            });
        }
        if aps.is_empty() {
            return Err(FragmentSpaceError::MalformedRule(format!(
                "{label}: building block declares no attachment points"
            )));
        }
        Ok(BuildingBlock { atoms, bonds, aps })
    }
}

impl SpaceFile {
    fn build(self) -> Result<FragmentSpace, FragmentSpaceError> {
        let mut space = FragmentSpace::new();
        for (i, block) in self.scaffolds.into_iter().enumerate() {
            let built = block.build(&format!("scaffold {i}"))?;
            space.add_block(BuildingBlockType::Scaffold, built);
        }
        for (i, block) in self.fragments.into_iter().enumerate() {
            let built = block.build(&format!("fragment {i}"))?;
            space.add_block(BuildingBlockType::Fragment, built);
        }
        for (i, block) in self.capping_groups.into_iter().enumerate() {
            let built = block.build(&format!("capping group {i}"))?;
            space.add_block(BuildingBlockType::Cap, built);
        }
        for (key, values) in self.compatibility {
            let a = parse_class(&key)?;
            for value in values {
                let b = parse_class(&value)?;
                space.add_compatibility(a.clone(), b);
            }
        }
        let n_caps = space.capping_groups.len();
        for (key, index) in self.capping {
            if index >= n_caps {
                return Err(FragmentSpaceError::MalformedRule(format!(
                    "Capping rule for '{key}' references missing capping group {index}"
                )));
            }
            space.set_capping_rule(parse_class(&key)?, index);
        }
        for class in self.forbidden_ends {
            space.add_forbidden_end(parse_class(&class)?);
        }
        Ok(space)
    }
}
