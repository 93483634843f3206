//! # Fragment Space Module
//!
//! The external library of building blocks and attachment-point-class
//! compatibility rules consumed (not defined) by the graph operators.
//!
//! - [`library`] - building-block definitions (atom payloads + AP descriptors)
//! - [`space`] - the [`space::FragmentSpace`] container, its compatibility
//!   matrix, capping rules, and TOML deserialization
//!
//! Malformed space definitions are fatal configuration errors: a run cannot
//! produce valid chemistry without a coherent compatibility matrix.

pub mod library;
pub mod space;

pub use library::{ApDescriptor, BuildingBlock};
pub use space::{FragmentSpace, FragmentSpaceError};
