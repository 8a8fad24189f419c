//! Public API facade for the bb function pool.
//!
//! A pool stores single-function source units keyed by the structural
//! hash of their normalized logic; each contributor's naming, docstring,
//! and import-alias choices live in per-language overlays that are
//! content-addressed on their own. [`Pool`] composes the parser,
//! normalizer, and store into the operation surface clients use.

pub mod pool;

pub use bb_error::{ErrorKind, PoolError, Result};
pub use bb_store::{PoolReport, ValidationReport};
pub use bb_types::locator::Locator;
pub use bb_types::{FunctionHash, LangTag, LanguageOverlay, Metadata, OverlayHash, PoolFunction};
pub use pool::{Pool, PoolConfig, StoredFunction};

/// Parse the `HASH[@LANG[@OVERLAY]]` surface syntax.
pub fn parse_locator(input: &str) -> Result<Locator> {
    Locator::parse(input)
}
