//! # Engine Module
//!
//! Stateful operators acting on the stateless core models: genetic operators
//! (mutation, crossover), ring closure, structural comparison, process-wide
//! ID allocation with checkpointing, pluggable selection strategies, and the
//! 3D assembler that renders a finished graph into atoms and bonds.
//!
//! Operators never share graphs across threads; each caller owns an
//! exclusive copy. The one synchronization point is [`ids::IdAllocator`].

pub mod assembler;
pub mod crossover;
pub mod error;
pub mod ids;
pub mod isomorphism;
pub mod mutation;
pub mod rings;
pub mod selection;

pub use error::OperationError;
