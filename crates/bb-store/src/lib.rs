//! Content-addressed directory storage for the bb pool.
//!
//! Layout, with `h` the function hash and `m` the overlay hash:
//!
//! ```text
//! <root>/pool/<h[0:2]>/<h[2:]>/
//!     object.json
//!     <lang>/<m[0:2]>/<m[2:]>/mapping.json
//! ```
//!
//! Objects and overlays are immutable once written. All writes go through
//! the atomic temp-write-then-rename path in [`atomic`]; concurrent stores
//! of the same content are no-op overwrites of byte-identical files.

pub mod atomic;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use bb_error::{PoolError, Result};
use bb_norm::overlay_hash;
use bb_types::{
    FunctionHash, LangTag, LanguageOverlay, Metadata, OverlayHash, PoolFunction, SCHEMA_VERSION,
};

use atomic::write_json_atomic;

/// Handle to one pool directory.
#[derive(Debug, Clone)]
pub struct PoolStore {
    root: PathBuf,
}

/// Per-function validation outcome: empty means valid.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<PoolError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Pool-wide validation sweep outcome.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub functions_total: usize,
    pub functions_valid: usize,
    pub languages: BTreeSet<String>,
    pub reports: Vec<(FunctionHash, ValidationReport)>,
}

impl PoolReport {
    pub fn is_valid(&self) -> bool {
        self.functions_valid == self.functions_total
    }
}

impl PoolStore {
    /// Open a store rooted at `root`. Nothing is created until the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pool_dir(&self) -> PathBuf {
        self.root.join("pool")
    }

    fn function_dir(&self, hash: &FunctionHash) -> PathBuf {
        self.pool_dir().join(hash.prefix()).join(hash.rest())
    }

    fn object_path(&self, hash: &FunctionHash) -> PathBuf {
        self.function_dir(hash).join("object.json")
    }

    fn overlay_path(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        overlay: &OverlayHash,
    ) -> PathBuf {
        self.function_dir(hash)
            .join(lang.as_str())
            .join(overlay.prefix())
            .join(overlay.rest())
            .join("mapping.json")
    }

    /// Whether `object.json` exists for this hash.
    pub fn has_function(&self, hash: &FunctionHash) -> bool {
        self.object_path(hash).is_file()
    }

    /// Persist a function object. A pre-existing object wins: the content
    /// is addressed by its hash, so the bytes are already right and the
    /// original metadata is kept.
    pub fn save_function(
        &self,
        hash: &FunctionHash,
        canonical_code: &str,
        author: &str,
    ) -> Result<()> {
        let record = PoolFunction {
            schema_version: SCHEMA_VERSION,
            hash: hash.as_str().to_owned(),
            normalized_code: canonical_code.to_owned(),
            metadata: Metadata {
                created: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                author: author.to_owned(),
            },
        };
        write_json_atomic(&self.object_path(hash), &record)?;
        info!(%hash, "function stored");
        Ok(())
    }

    /// Persist a presentation overlay and return its content hash.
    pub fn save_overlay(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        overlay: &LanguageOverlay,
    ) -> Result<OverlayHash> {
        if !self.has_function(hash) {
            return Err(PoolError::FunctionNotFound {
                hash: hash.as_str().to_owned(),
            });
        }
        let overlay_id = overlay_hash(overlay);
        write_json_atomic(&self.overlay_path(hash, lang, &overlay_id), overlay)?;
        debug!(%hash, lang = %lang, overlay = %overlay_id, "overlay stored");
        Ok(overlay_id)
    }

    /// Load a function object.
    pub fn load_function(&self, hash: &FunctionHash) -> Result<PoolFunction> {
        let path = self.object_path(hash);
        if !path.is_file() {
            return Err(PoolError::FunctionNotFound {
                hash: hash.as_str().to_owned(),
            });
        }
        let text = fs::read_to_string(&path)?;
        let record: PoolFunction = serde_json::from_str(&text)
            .map_err(|err| PoolError::schema(&path, err.to_string()))?;
        if record.schema_version != SCHEMA_VERSION {
            return Err(PoolError::schema(
                &path,
                format!("unsupported schema version {}", record.schema_version),
            ));
        }
        if record.hash != hash.as_str() {
            return Err(PoolError::integrity(
                &path,
                format!("object records hash {}", record.hash),
            ));
        }
        Ok(record)
    }

    /// Load one overlay, verifying that its content still matches the
    /// hash encoded in its path.
    pub fn load_overlay(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
        overlay_id: &OverlayHash,
    ) -> Result<LanguageOverlay> {
        let path = self.overlay_path(hash, lang, overlay_id);
        if !path.is_file() {
            return Err(PoolError::OverlayNotFound {
                hash: hash.as_str().to_owned(),
                lang: lang.as_str().to_owned(),
                overlay: overlay_id.as_str().to_owned(),
            });
        }
        let text = fs::read_to_string(&path)?;
        let overlay: LanguageOverlay = serde_json::from_str(&text)
            .map_err(|err| PoolError::schema(&path, err.to_string()))?;
        let actual = overlay_hash(&overlay);
        if actual != *overlay_id {
            return Err(PoolError::integrity(
                &path,
                format!("overlay content re-hashes to {actual}"),
            ));
        }
        Ok(overlay)
    }

    /// Language tags with at least one overlay directory, sorted.
    pub fn list_languages(&self, hash: &FunctionHash) -> Result<Vec<LangTag>> {
        if !self.has_function(hash) {
            return Err(PoolError::FunctionNotFound {
                hash: hash.as_str().to_owned(),
            });
        }
        let mut languages = Vec::new();
        for entry in fs::read_dir(self.function_dir(hash))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(tag) = LangTag::parse(&name) {
                languages.push(tag);
            }
        }
        languages.sort();
        Ok(languages)
    }

    /// All `(overlay_hash, comment)` pairs for one language, sorted by
    /// hash. The hash comes from the directory path, not from re-hashing
    /// content; malformed entries are skipped (validation reports them).
    pub fn list_overlays(
        &self,
        hash: &FunctionHash,
        lang: &LangTag,
    ) -> Result<Vec<(OverlayHash, String)>> {
        let lang_dir = self.function_dir(hash).join(lang.as_str());
        if !lang_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut overlays = Vec::new();
        for prefix_entry in fs::read_dir(&lang_dir)? {
            let prefix_entry = prefix_entry?;
            if !prefix_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = prefix_entry.file_name().to_string_lossy().into_owned();
            for rest_entry in fs::read_dir(prefix_entry.path())? {
                let rest_entry = rest_entry?;
                if !rest_entry.file_type()?.is_dir() {
                    continue;
                }
                let rest = rest_entry.file_name().to_string_lossy().into_owned();
                let Some(overlay_id) = OverlayHash::new(format!("{prefix}{rest}")) else {
                    continue;
                };
                let mapping_path = rest_entry.path().join("mapping.json");
                if !mapping_path.is_file() {
                    continue;
                }
                let Ok(text) = fs::read_to_string(&mapping_path) else {
                    continue;
                };
                let Ok(overlay) = serde_json::from_str::<LanguageOverlay>(&text) else {
                    continue;
                };
                overlays.push((overlay_id, overlay.comment));
            }
        }
        overlays.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(overlays)
    }

    /// Hashes of every function in the pool, sorted. Entries that do not
    /// look like two-level hash fan-out are skipped silently.
    pub fn list_functions(&self) -> Result<Vec<FunctionHash>> {
        let pool_dir = self.pool_dir();
        if !pool_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for prefix_entry in fs::read_dir(&pool_dir)? {
            let prefix_entry = prefix_entry?;
            if !prefix_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = prefix_entry.file_name().to_string_lossy().into_owned();
            if prefix.len() != 2 {
                continue;
            }
            for rest_entry in fs::read_dir(prefix_entry.path())? {
                let rest_entry = rest_entry?;
                if !rest_entry.file_type()?.is_dir() {
                    continue;
                }
                let rest = rest_entry.file_name().to_string_lossy().into_owned();
                if let Some(hash) = FunctionHash::new(format!("{prefix}{rest}")) {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Validate one function: object schema, path/content hash agreement,
    /// and every overlay under every language directory.
    pub fn validate_function(&self, hash: &FunctionHash) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        let object_path = self.object_path(hash);
        if !object_path.is_file() {
            report.errors.push(PoolError::FunctionNotFound {
                hash: hash.as_str().to_owned(),
            });
            return Ok(report);
        }

        match fs::read_to_string(&object_path) {
            Err(err) => {
                report.errors.push(PoolError::Io(err));
                return Ok(report);
            }
            Ok(text) => match serde_json::from_str::<PoolFunction>(&text) {
                Err(err) => {
                    report
                        .errors
                        .push(PoolError::schema(&object_path, err.to_string()));
                }
                Ok(record) => {
                    if record.schema_version != SCHEMA_VERSION {
                        report.errors.push(PoolError::schema(
                            &object_path,
                            format!("unsupported schema version {}", record.schema_version),
                        ));
                    }
                    if record.hash != hash.as_str() {
                        report.errors.push(PoolError::integrity(
                            &object_path,
                            format!("object records hash {}", record.hash),
                        ));
                    }
                    let actual = bb_norm::function_hash(&record.normalized_code);
                    if actual != *hash {
                        report.errors.push(PoolError::integrity(
                            &object_path,
                            format!("normalized code re-hashes to {actual}"),
                        ));
                    }
                }
            },
        }

        for lang in self.list_languages(hash)? {
            for (overlay_id, _) in self.list_overlays(hash, &lang)? {
                let path = self.overlay_path(hash, &lang, &overlay_id);
                match fs::read_to_string(&path) {
                    Err(err) => report.errors.push(PoolError::Io(err)),
                    Ok(text) => match serde_json::from_str::<LanguageOverlay>(&text) {
                        Err(err) => {
                            report.errors.push(PoolError::schema(&path, err.to_string()));
                        }
                        Ok(overlay) => {
                            let actual = overlay_hash(&overlay);
                            if actual != overlay_id {
                                report.errors.push(PoolError::integrity(
                                    &path,
                                    format!("overlay content re-hashes to {actual}"),
                                ));
                            }
                        }
                    },
                }
            }
        }

        Ok(report)
    }

    /// Validate the whole pool.
    pub fn validate_all(&self) -> Result<PoolReport> {
        let mut pool_report = PoolReport::default();
        for hash in self.list_functions()? {
            let report = self.validate_function(&hash)?;
            pool_report.functions_total += 1;
            if report.is_valid() {
                pool_report.functions_valid += 1;
                for lang in self.list_languages(&hash)? {
                    pool_report.languages.insert(lang.as_str().to_owned());
                }
            }
            pool_report.reports.push((hash, report));
        }
        Ok(pool_report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> (tempfile::TempDir, PoolStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PoolStore::new(dir.path());
        (dir, store)
    }

    fn sample_code() -> &'static str {
        "def _bb_v_0(_bb_v_1, _bb_v_2):\n    return _bb_v_1 + _bb_v_2\n"
    }

    fn sample_hash() -> FunctionHash {
        bb_norm::function_hash(sample_code())
    }

    fn sample_overlay(comment: &str) -> LanguageOverlay {
        LanguageOverlay {
            docstring: "Add two numbers".to_owned(),
            name_mapping: BTreeMap::from([
                ("_bb_v_0".to_owned(), "add".to_owned()),
                ("_bb_v_1".to_owned(), "a".to_owned()),
                ("_bb_v_2".to_owned(), "b".to_owned()),
            ]),
            alias_mapping: BTreeMap::new(),
            comment: comment.to_owned(),
        }
    }

    fn eng() -> LangTag {
        LangTag::parse("eng").expect("tag")
    }

    #[test]
    fn save_and_load_function() {
        let (_dir, store) = store();
        let hash = sample_hash();
        assert!(!store.has_function(&hash));
        store
            .save_function(&hash, sample_code(), "someone@example.org")
            .expect("save");
        assert!(store.has_function(&hash));

        let record = store.load_function(&hash).expect("load");
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.hash, hash.as_str());
        assert_eq!(record.normalized_code, sample_code());
        assert_eq!(record.metadata.author, "someone@example.org");
        assert!(record.metadata.created.ends_with('Z'));
    }

    #[test]
    fn layout_is_two_level_fan_out() {
        let (dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        let expected = dir
            .path()
            .join("pool")
            .join(hash.prefix())
            .join(hash.rest())
            .join("object.json");
        assert!(expected.is_file());
    }

    #[test]
    fn overlay_requires_function() {
        let (_dir, store) = store();
        let err = store
            .save_overlay(&sample_hash(), &eng(), &sample_overlay(""))
            .unwrap_err();
        assert_eq!(err.kind(), bb_error::ErrorKind::NotFound);
    }

    #[test]
    fn overlay_round_trip_and_path() {
        let (dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        let overlay = sample_overlay("formal");
        let overlay_id = store
            .save_overlay(&hash, &eng(), &overlay)
            .expect("save overlay");
        assert_eq!(overlay_id, overlay_hash(&overlay));

        let expected = dir
            .path()
            .join("pool")
            .join(hash.prefix())
            .join(hash.rest())
            .join("eng")
            .join(overlay_id.prefix())
            .join(overlay_id.rest())
            .join("mapping.json");
        assert!(expected.is_file());

        let loaded = store
            .load_overlay(&hash, &eng(), &overlay_id)
            .expect("load overlay");
        assert_eq!(loaded, overlay);
    }

    #[test]
    fn idempotent_store_creates_no_new_files() {
        let (dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        store
            .save_overlay(&hash, &eng(), &sample_overlay(""))
            .expect("overlay");

        let count = || walk_count(dir.path());
        let before = count();
        store.save_function(&hash, sample_code(), "").expect("save again");
        store
            .save_overlay(&hash, &eng(), &sample_overlay(""))
            .expect("overlay again");
        assert_eq!(count(), before);
    }

    fn walk_count(dir: &Path) -> usize {
        let mut count = 0;
        for entry in fs::read_dir(dir).expect("read dir") {
            let entry = entry.expect("entry");
            if entry.file_type().expect("type").is_dir() {
                count += walk_count(&entry.path());
            } else {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn distinct_comments_are_distinct_overlays() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        let first = store
            .save_overlay(&hash, &eng(), &sample_overlay("formal"))
            .expect("first");
        let second = store
            .save_overlay(&hash, &eng(), &sample_overlay("casual"))
            .expect("second");
        assert_ne!(first, second);

        let listed = store.list_overlays(&hash, &eng()).expect("list");
        assert_eq!(listed.len(), 2);
        let comments: BTreeSet<String> =
            listed.into_iter().map(|(_, comment)| comment).collect();
        assert_eq!(
            comments,
            BTreeSet::from(["formal".to_owned(), "casual".to_owned()])
        );
    }

    #[test]
    fn list_overlays_empty_when_language_absent() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        assert!(store.list_overlays(&hash, &eng()).expect("list").is_empty());
    }

    #[test]
    fn list_languages_sorted() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        for tag in ["fra", "eng", "technical-french"] {
            let tag = LangTag::parse(tag).expect("tag");
            store
                .save_overlay(&hash, &tag, &sample_overlay(""))
                .expect("overlay");
        }
        let languages: Vec<String> = store
            .list_languages(&hash)
            .expect("list")
            .into_iter()
            .map(|tag| tag.as_str().to_owned())
            .collect();
        assert_eq!(languages, vec!["eng", "fra", "technical-french"]);
    }

    #[test]
    fn missing_function_is_not_found() {
        let (_dir, store) = store();
        let err = store.load_function(&sample_hash()).unwrap_err();
        assert_eq!(err.kind(), bb_error::ErrorKind::NotFound);
        let err = store.list_languages(&sample_hash()).unwrap_err();
        assert_eq!(err.kind(), bb_error::ErrorKind::NotFound);
    }

    #[test]
    fn validation_passes_for_clean_pool() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        store
            .save_overlay(&hash, &eng(), &sample_overlay(""))
            .expect("overlay");
        let report = store.validate_function(&hash).expect("validate");
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);

        let pool_report = store.validate_all().expect("validate all");
        assert!(pool_report.is_valid());
        assert_eq!(pool_report.functions_total, 1);
        assert!(pool_report.languages.contains("eng"));
    }

    #[test]
    fn mutated_overlay_fails_integrity() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        let overlay_id = store
            .save_overlay(&hash, &eng(), &sample_overlay("original"))
            .expect("overlay");

        // Flip the comment in place, leaving the path hash stale.
        let path = store.overlay_path(&hash, &eng(), &overlay_id);
        let mut overlay = sample_overlay("original");
        overlay.comment = "tampered".to_owned();
        fs::write(&path, serde_json::to_string_pretty(&overlay).expect("json"))
            .expect("write");

        let report = store.validate_function(&hash).expect("validate");
        assert!(!report.is_valid());
        assert!(report
            .errors
            .iter()
            .any(|err| err.kind() == bb_error::ErrorKind::IntegrityFailure));

        let err = store.load_overlay(&hash, &eng(), &overlay_id).unwrap_err();
        assert_eq!(err.kind(), bb_error::ErrorKind::IntegrityFailure);
    }

    #[test]
    fn mutated_object_fails_integrity() {
        let (_dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");

        let path = store.object_path(&hash);
        let text = fs::read_to_string(&path).expect("read");
        fs::write(&path, text.replace("_bb_v_1 + _bb_v_2", "_bb_v_2 + _bb_v_1"))
            .expect("write");

        let report = store.validate_function(&hash).expect("validate");
        assert!(report
            .errors
            .iter()
            .any(|err| err.kind() == bb_error::ErrorKind::IntegrityFailure));
    }

    #[test]
    fn junk_directories_are_skipped_in_listing() {
        let (dir, store) = store();
        let hash = sample_hash();
        store.save_function(&hash, sample_code(), "").expect("save");
        fs::create_dir_all(dir.path().join("pool/notahash/thing")).expect("mkdir");
        fs::create_dir_all(dir.path().join("pool/zz/short")).expect("mkdir");
        let functions = store.list_functions().expect("list");
        assert_eq!(functions, vec![hash]);
    }
}
