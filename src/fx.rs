//! Fast hash maps and sets with a deterministic-enough hasher for interning
//! and memoization tables.

pub use rustc_hash::{FxHashMap, FxHashSet};
