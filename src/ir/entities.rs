//! IR entity references.
//!
//! The caller/callee machinery refers to values produced by the embedder's
//! builder. Those values are not represented as Rust references into the
//! embedder's IR; instead they are compact `u32` index newtypes minted by
//! the builder, so the lowering code can store and shuffle them freely
//! without caring what an IR value is on the other side.

use cranelift_entity::entity_impl;

/// An opaque reference to a single IR (SSA) value owned by the injected
/// builder.
///
/// Values display in the textual form `vNN`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");
