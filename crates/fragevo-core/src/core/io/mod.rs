//! # Graph I/O Module
//!
//! Two encodings of [`DGraph`](crate::core::models::graph::DGraph):
//!
//! - [`graphenc`] - a compact one-line token format used for debugging and
//!   inter-tool exchange; covers library-backed and ring-closing vertices
//! - [`json`] - the persisted format; covers every vertex kind, including
//!   templates, plus rings and symmetric sets
//!
//! Both satisfy the round-trip property: decoding an encoded graph yields a
//! graph that is label-preserving-isomorphic to the original.

pub mod graphenc;
pub mod json;

use crate::core::fragspace::FragmentSpaceError;
use crate::core::models::graph::GraphError;
use thiserror::Error;

/// File extension used for persisted JSON graphs.
pub const GRAPH_JSON_EXT: &str = "json";

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Malformed graph encoding at '{token}': {reason}")]
    Malformed { token: String, reason: String },
    #[error("Vertex kind '{0}' is not representable in the string encoding; use the JSON encoding")]
    Unsupported(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    FragmentSpace(#[from] FragmentSpaceError),
}

impl EncodingError {
    pub(crate) fn malformed(token: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}
