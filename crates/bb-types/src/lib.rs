//! Core types for the bb function pool.
//!
//! A pool unit is one function definition plus its imports. The unit's
//! identity is the SHA-256 of its canonical (naming-erased) source text;
//! each contributor's naming choices live in a per-language overlay keyed
//! by its own content hash. This crate holds the validated newtypes for
//! those identities, the namespace constants that shape the canonical
//! form, and the serde records for the two on-disk JSON files.

pub mod locator;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use bb_error::PoolError;

/// Namespace constant. Canonical slots, the pool module path, and the
/// attribute used at rewritten call sites all derive from it.
pub const NAMESPACE: &str = "bb";

/// Prefix of every canonical slot identifier (`_bb_v_<N>`).
pub const SLOT_PREFIX: &str = "_bb_v_";

/// The slot the outer function always occupies.
pub const OUTER_SLOT: &str = "_bb_v_0";

/// Dotted module path that marks an import as a pool import.
pub const POOL_MODULE: &str = "bb.pool";

/// Prefix of pool import names. SHA-256 hashes can start with a digit,
/// which cannot lead an identifier, so imports are `object_<hash>`.
pub const IMPORT_PREFIX: &str = "object_";

/// Schema version written to and required of `object.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// Canonical slot name for a slot index.
pub fn slot_name(index: usize) -> String {
    format!("{SLOT_PREFIX}{index}")
}

/// Parse a canonical slot name back to its index.
///
/// Returns `None` for anything that is not exactly `_bb_v_<decimal>`.
pub fn slot_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(SLOT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Reject leading zeros except for slot 0 itself.
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// The bound name a pool import introduces: `object_<hash>`.
pub fn pool_import_name(hash: &FunctionHash) -> String {
    format!("{IMPORT_PREFIX}{hash}")
}

/// Extract the referenced hash from a pool import name.
///
/// Returns `None` unless the name is `object_` followed by 64 lowercase
/// hex characters.
pub fn parse_pool_import_name(name: &str) -> Option<&str> {
    let hex = name.strip_prefix(IMPORT_PREFIX)?;
    is_hex_lower_64(hex).then_some(hex)
}

fn is_hex_lower_64(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A function identity: 64 lowercase hex characters of SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionHash(String);

impl FunctionHash {
    /// Validate and wrap a hash string.
    pub fn parse(value: &str) -> Result<Self, PoolError> {
        if is_hex_lower_64(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(PoolError::InvalidHash {
                value: value.to_owned(),
            })
        }
    }

    /// Wrap a string already known to be a valid digest (e.g. freshly
    /// hex-formatted SHA-256 output).
    ///
    /// Returns `None` if the invariant does not hold.
    pub fn new(value: String) -> Option<Self> {
        is_hex_lower_64(&value).then_some(Self(value))
    }

    /// The full 64-character hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex characters: the fan-out directory name.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Remaining 62 hex characters: the inner directory name.
    pub fn rest(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for FunctionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An overlay identity: 64 lowercase hex characters of SHA-256 over the
/// overlay's canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayHash(String);

impl OverlayHash {
    /// Validate and wrap a hash string.
    pub fn parse(value: &str) -> Result<Self, PoolError> {
        if is_hex_lower_64(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(PoolError::InvalidHash {
                value: value.to_owned(),
            })
        }
    }

    /// Wrap a string already known to be a valid digest.
    pub fn new(value: String) -> Option<Self> {
        is_hex_lower_64(&value).then_some(Self(value))
    }

    /// The full 64-character hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex characters: the fan-out directory name.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Remaining 62 hex characters: the inner directory name.
    pub fn rest(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for OverlayHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A natural-language tag: 3-256 ASCII letters, digits, or hyphens.
///
/// Tags name overlay partitions (`eng`, `fra`, `technical-french`); the
/// constraint keeps them safe as literal directory names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LangTag(String);

impl LangTag {
    /// Validate and wrap a language tag.
    pub fn parse(value: &str) -> Result<Self, PoolError> {
        if Self::is_valid(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(PoolError::InvalidLanguageTag {
                tag: value.to_owned(),
            })
        }
    }

    /// Whether `value` satisfies the tag constraints.
    pub fn is_valid(value: &str) -> bool {
        (3..=256).contains(&value.len())
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }

    /// The tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LangTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation metadata stored alongside a function. Not part of its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// ISO-8601 UTC creation timestamp.
    pub created: String,
    /// Free-form author string from the pool configuration.
    pub author: String,
}

/// One algorithmic identity, as stored in `object.json`.
///
/// `normalized_code` is the exact byte sequence whose SHA-256 is `hash`;
/// the JSON envelope and metadata never participate in hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFunction {
    pub schema_version: u32,
    pub hash: String,
    pub normalized_code: String,
    pub metadata: Metadata,
}

/// One contributor's presentation of a function in one natural language,
/// as stored in `mapping.json`.
///
/// All four fields participate in the overlay hash; nothing else does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageOverlay {
    /// Docstring text, possibly empty.
    pub docstring: String,
    /// Canonical slot name -> the identifier the contributor used.
    pub name_mapping: BTreeMap<String, String>,
    /// Referenced pool-function hash -> the local alias the contributor used.
    pub alias_mapping: BTreeMap<String, String>,
    /// Free-form note distinguishing this variant, possibly empty.
    pub comment: String,
}
