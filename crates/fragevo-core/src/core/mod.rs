//! Foundation layer: stateless data models and I/O.
//!
//! - [`models`] - the molecular-design graph (`DGraph`) and its parts
//! - [`fragspace`] - building-block libraries and AP-class compatibility rules
//! - [`io`] - the line-oriented and JSON graph encodings

pub mod fragspace;
pub mod io;
pub mod models;
