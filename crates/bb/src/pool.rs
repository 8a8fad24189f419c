//! The pool operation surface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use bb_error::{PoolError, Result};
use bb_norm::{denormalize, normalize_source};
use bb_parser::parse_module;
use bb_store::{PoolReport, PoolStore, ValidationReport};
use bb_types::{FunctionHash, LangTag, LanguageOverlay, OverlayHash, PoolFunction};

/// Opening parameters. Discovery of the root directory (environment,
/// flag, config file) is the caller's concern.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Directory under which `pool/` lives.
    pub root: PathBuf,
    /// Recorded as `metadata.author` on newly stored functions.
    pub author: String,
}

impl PoolConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            author: String::new(),
        }
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

/// Result of a store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFunction {
    pub function_hash: FunctionHash,
    pub overlay_hash: OverlayHash,
}

/// Handle to a pool directory.
#[derive(Debug, Clone)]
pub struct Pool {
    store: PoolStore,
    author: String,
}

impl Pool {
    /// Open a pool. Nothing touches the filesystem until the first
    /// operation.
    pub fn open(config: PoolConfig) -> Self {
        Self {
            store: PoolStore::new(config.root),
            author: config.author,
        }
    }

    /// Ingest one source unit: normalize, hash, and persist the function
    /// object and its presentation overlay.
    pub fn store(
        &self,
        source: &str,
        lang: &LangTag,
        comment: &str,
    ) -> Result<StoredFunction> {
        let normalized = normalize_source(source)?;
        let function_hash = normalized.function_hash();
        self.store
            .save_function(&function_hash, &normalized.canonical_code, &self.author)?;
        let overlay = normalized.overlay(comment);
        let overlay_hash = self.store.save_overlay(&function_hash, lang, &overlay)?;
        info!(%function_hash, %overlay_hash, lang = %lang, "stored source unit");
        Ok(StoredFunction {
            function_hash,
            overlay_hash,
        })
    }

    /// Whether a function object exists for this hash.
    pub fn has_function(&self, hash: &FunctionHash) -> bool {
        self.store.has_function(hash)
    }

    /// Load a function object.
    pub fn load_object(&self, hash: &FunctionHash) -> Result<PoolFunction> {
        self.store.load_function(hash)
    }

    /// Languages with at least one overlay for this function, sorted.
    pub fn list_languages(&self, hash: &FunctionHash) -> Result<Vec<LangTag>> {
        self.store.list_languages(hash)
    }

    /// `(overlay_hash, comment)` pairs for one language; empty when the
    /// language is absent.
    pub fn list_overlays(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
    ) -> Result<Vec<(OverlayHash, String)>> {
        self.store.list_overlays(hash, lang)
    }

    /// Load one overlay. With no hash given, a single existing overlay is
    /// returned; several make the request ambiguous and the candidate
    /// list rides on the error.
    pub fn load_overlay(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        overlay: Option<&OverlayHash>,
    ) -> Result<LanguageOverlay> {
        if let Some(overlay) = overlay {
            return self.store.load_overlay(hash, lang, overlay);
        }
        let mut candidates = self.list_overlays(hash, lang)?;
        match candidates.len() {
            0 => Err(PoolError::LanguageNotFound {
                hash: hash.as_str().to_owned(),
                lang: lang.as_str().to_owned(),
            }),
            1 => {
                let (overlay_id, _) = candidates.remove(0);
                self.store.load_overlay(hash, lang, &overlay_id)
            }
            _ => Err(PoolError::AmbiguousOverlay {
                lang: lang.as_str().to_owned(),
                candidates: candidates
                    .into_iter()
                    .map(|(overlay_id, comment)| (overlay_id.as_str().to_owned(), comment))
                    .collect(),
            }),
        }
    }

    /// Attach a presentation overlay to an existing function.
    pub fn add_overlay(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        docstring: String,
        name_mapping: BTreeMap<String, String>,
        alias_mapping: BTreeMap<String, String>,
        comment: String,
    ) -> Result<OverlayHash> {
        let overlay = LanguageOverlay {
            docstring,
            name_mapping,
            alias_mapping,
            comment,
        };
        self.store.save_overlay(hash, lang, &overlay)
    }

    /// Reconstruct readable source for a function in one language.
    pub fn denormalize(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        overlay: Option<&OverlayHash>,
    ) -> Result<String> {
        let object = self.load_object(hash)?;
        let overlay = self.load_overlay(hash, lang, overlay)?;
        denormalize(&object.normalized_code, &overlay)
    }

    /// Pool-function hashes this function's canonical code references.
    ///
    /// Whether they exist in this pool is not checked.
    pub fn dependencies(&self, hash: &FunctionHash) -> Result<Vec<FunctionHash>> {
        let object = self.load_object(hash)?;
        let module = parse_module(&object.normalized_code)?;
        bb_norm::imports::pool_references(&module)
            .into_iter()
            .map(|hex| FunctionHash::parse(&hex))
            .collect()
    }

    /// Validate one function and all its overlays.
    pub fn validate(&self, hash: &FunctionHash) -> Result<ValidationReport> {
        self.store.validate_function(hash)
    }

    /// Validate every function in the pool.
    pub fn validate_all(&self) -> Result<PoolReport> {
        self.store.validate_all()
    }
}
