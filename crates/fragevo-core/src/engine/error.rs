use crate::core::fragspace::FragmentSpaceError;
use crate::core::models::graph::GraphError;
use thiserror::Error;

/// Errors from the engine operators.
///
/// "Nothing applicable found" outcomes that a caller is expected to retry
/// (no valid crossover cut, no mutable site) are returned as `Ok(None)` or
/// `Ok(false)` values, not through this enum.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Mutation failed: {reason}")]
    MutationFailed { reason: String },
    #[error("Assembly failed: {reason}")]
    AssemblyFailed { reason: String },
    #[error("Vertex ID {0} occurs in both parent graphs; renumber before crossover")]
    IdCollision(i64),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    FragmentSpace(#[from] FragmentSpaceError),
}

impl OperationError {
    pub(crate) fn mutation(reason: impl Into<String>) -> Self {
        Self::MutationFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn assembly(reason: impl Into<String>) -> Self {
        Self::AssemblyFailed {
            reason: reason.into(),
        }
    }
}
