//! The lowered IR surface.
//!
//! This crate does not emit instructions itself; it directs an injected
//! [`Builder`] owned by the embedder. The types in this module are the
//! vocabulary shared with that collaborator: machine-level [`Type`]s,
//! opaque [`Value`] handles, lowered [`Signature`]s, backend
//! [`CallConv`] ids, and the [attribute sets](attrs) attached to lowered
//! functions.

mod builder;
mod entities;
mod types;

pub mod attrs;

pub use builder::{Builder, TypedValue};
pub use entities::Value;
pub use types::{CallConv, Signature, Type};
