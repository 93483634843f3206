//! # Core Models Module
//!
//! Fundamental data structures for the molecular-design graph. A [`graph::DGraph`]
//! owns an ordered set of vertices, the edges joining their attachment points,
//! the rings declared on top of the spanning tree, and the symmetric-vertex
//! sets used to mirror structural edits.
//!
//! ## Key Components
//!
//! - [`attachment`] - attachment-point classes, bond types, and the
//!   attachment point itself
//! - [`vertex`] - the polymorphic vertex (fragment, empty, ring-closing,
//!   template) and its building-block metadata
//! - [`edge`] - non-owning connections between two attachment points
//! - [`ring`] - declared ring closures over the spanning tree
//! - [`symmetry`] - sets of interchangeable vertex IDs
//! - [`graph`] - the graph container and its editing operations
//! - [`ids`] - slotmap key types for internal vertex storage

pub mod attachment;
pub mod edge;
pub mod graph;
pub mod ids;
pub mod ring;
pub mod symmetry;
pub mod vertex;
