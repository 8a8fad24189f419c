//! Error types for the bb function pool.
//!
//! One variant per failure condition, collapsed onto the coarse
//! [`ErrorKind`] taxonomy that the pool surfaces to callers. Errors carry
//! machine-inspectable payloads (the ambiguous-overlay candidate list, the
//! offending on-disk path) and are never recovered by guessing.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Source text failed to lex or parse.
    #[error("syntax error at line {line}: {detail}")]
    SourceSyntax { line: usize, detail: String },

    /// Top level of the unit is not "imports + exactly one function".
    #[error("unsupported unit: {detail}")]
    UnsupportedUnit { detail: String },

    /// Language tag outside 3-256 chars or the allowed character class.
    #[error("invalid language tag: '{tag}'")]
    InvalidLanguageTag { tag: String },

    /// Hash is not 64 lowercase hex characters.
    #[error("invalid hash: '{value}' (expected 64 lowercase hex characters)")]
    InvalidHash { value: String },

    /// Locator surface syntax is malformed.
    #[error("invalid locator '{input}': {detail}")]
    InvalidLocator { input: String, detail: String },

    /// No function stored under the given hash.
    #[error("function not found: {hash}")]
    FunctionNotFound { hash: String },

    /// The function exists but has no overlay in the given language.
    #[error("no '{lang}' overlay found for function {hash}")]
    LanguageNotFound { hash: String, lang: String },

    /// The requested overlay hash is not present for this function/language.
    #[error("overlay not found: {hash}@{lang}@{overlay}")]
    OverlayNotFound {
        hash: String,
        lang: String,
        overlay: String,
    },

    /// Multiple overlays exist and none was requested.
    ///
    /// `candidates` holds `(overlay_hash, comment)` pairs so the caller can
    /// enumerate the choices.
    #[error("multiple '{lang}' overlays exist; specify one of {} candidates", candidates.len())]
    AmbiguousOverlay {
        lang: String,
        candidates: Vec<(String, String)>,
    },

    /// Stored JSON is unparseable, missing fields, or has an unsupported
    /// schema version.
    #[error("schema mismatch in {path}: {detail}")]
    SchemaMismatch { path: PathBuf, detail: String },

    /// Re-hashing stored content does not reproduce the hash its path encodes.
    #[error("integrity failure at {path}: {detail}")]
    IntegrityFailure { path: PathBuf, detail: String },

    /// Underlying filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error taxonomy surfaced by the pool interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSource,
    UnsupportedUnit,
    InvalidLanguageTag,
    InvalidHash,
    InvalidLocator,
    NotFound,
    AmbiguousOverlay,
    SchemaMismatch,
    IntegrityFailure,
    Io,
}

impl PoolError {
    /// Map this error to its coarse kind.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceSyntax { .. } => ErrorKind::InvalidSource,
            Self::UnsupportedUnit { .. } => ErrorKind::UnsupportedUnit,
            Self::InvalidLanguageTag { .. } => ErrorKind::InvalidLanguageTag,
            Self::InvalidHash { .. } => ErrorKind::InvalidHash,
            Self::InvalidLocator { .. } => ErrorKind::InvalidLocator,
            Self::FunctionNotFound { .. }
            | Self::LanguageNotFound { .. }
            | Self::OverlayNotFound { .. } => ErrorKind::NotFound,
            Self::AmbiguousOverlay { .. } => ErrorKind::AmbiguousOverlay,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::IntegrityFailure { .. } => ErrorKind::IntegrityFailure,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the caller can likely fix this by changing the request.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceSyntax { .. }
                | Self::UnsupportedUnit { .. }
                | Self::InvalidLanguageTag { .. }
                | Self::InvalidHash { .. }
                | Self::InvalidLocator { .. }
                | Self::AmbiguousOverlay { .. }
        )
    }

    /// Create a syntax error.
    pub fn syntax(line: usize, detail: impl Into<String>) -> Self {
        Self::SourceSyntax {
            line,
            detail: detail.into(),
        }
    }

    /// Create an unsupported-unit error.
    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::UnsupportedUnit {
            detail: detail.into(),
        }
    }

    /// Create a locator error.
    pub fn locator(input: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidLocator {
            input: input.into(),
            detail: detail.into(),
        }
    }

    /// Create a schema-mismatch error for a stored file.
    pub fn schema(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create an integrity-failure error for a stored file.
    pub fn integrity(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::IntegrityFailure {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias using `PoolError`.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_syntax() {
        let err = PoolError::syntax(3, "unexpected indent");
        assert_eq!(err.to_string(), "syntax error at line 3: unexpected indent");
    }

    #[test]
    fn error_display_ambiguous() {
        let err = PoolError::AmbiguousOverlay {
            lang: "eng".to_owned(),
            candidates: vec![
                ("a".repeat(64), "formal".to_owned()),
                ("b".repeat(64), "casual".to_owned()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "multiple 'eng' overlays exist; specify one of 2 candidates"
        );
    }

    #[test]
    fn error_display_not_found() {
        let err = PoolError::FunctionNotFound {
            hash: "deadbeef".to_owned(),
        };
        assert_eq!(err.to_string(), "function not found: deadbeef");
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            PoolError::syntax(1, "x").kind(),
            ErrorKind::InvalidSource
        );
        assert_eq!(
            PoolError::unsupported("two functions").kind(),
            ErrorKind::UnsupportedUnit
        );
        assert_eq!(
            PoolError::FunctionNotFound {
                hash: String::new()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            PoolError::LanguageNotFound {
                hash: String::new(),
                lang: String::new()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            PoolError::integrity("/p", "bad").kind(),
            ErrorKind::IntegrityFailure
        );
        assert_eq!(
            PoolError::Io(std::io::Error::other("boom")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn user_recoverable() {
        assert!(PoolError::syntax(1, "x").is_user_recoverable());
        assert!(!PoolError::integrity("/p", "bad").is_user_recoverable());
        assert!(!PoolError::Io(std::io::Error::other("boom")).is_user_recoverable());
    }
}
