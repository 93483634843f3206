//! # FRAGEVO Core Library
//!
//! A fragment-graph engine for de-novo molecular design. Candidate molecules
//! are represented as typed, attachment-point-driven graphs of reusable
//! building blocks, and populations of such graphs are evolved with genetic
//! operators guided by label-preserving isomorphism checks and graph-to-3D
//! conversion.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers with a strict dependency direction:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`DGraph`, vertices,
//!   attachment points, the fragment space) and the textual/JSON graph
//!   encodings. Every structural edit either succeeds and preserves the graph
//!   invariants, or fails with a specific error and leaves the graph
//!   untouched.
//!
//! - **[`engine`]: The Operators.** Stateful machinery acting on graphs:
//!   mutation, crossover, ring closure, the isomorphism engine, unique-ID
//!   allocation with checkpointing, pluggable selection strategies, and the
//!   3D assembler that turns a finished graph into atoms and bonds.
//!
//! Orchestration (population management, fitness evaluation, persistence of
//! whole runs) lives outside this crate; workers are expected to own an
//! exclusive copy of each graph they mutate.

pub mod core;
pub mod engine;
