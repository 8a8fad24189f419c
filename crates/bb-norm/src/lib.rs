//! Normalization and identity for the bb pool.
//!
//! Turns a source unit into its canonical form (naming erased, docstring
//! removed, imports sorted, pool call sites rewritten), computes the two
//! content hashes, and inverts the whole transformation at retrieval time.

pub mod builtins;
pub mod denormalize;
pub mod hash;
pub mod imports;
pub mod names;
pub mod normalize;
pub mod rows;

pub use denormalize::denormalize;
pub use hash::{canonical_overlay_json, function_hash, overlay_hash};
pub use normalize::{normalize_source, Normalized};
