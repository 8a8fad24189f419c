//! End-to-end pool scenarios: cross-language identity, pool references,
//! overlay variants, async preservation, locators, and integrity checks.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use bb::{ErrorKind, LangTag, Pool, PoolConfig, PoolError};

fn open_pool(dir: &tempfile::TempDir) -> Pool {
    Pool::open(PoolConfig::new(dir.path()).with_author("tester@example.org"))
}

fn eng() -> LangTag {
    LangTag::parse("eng").expect("tag")
}

fn fra() -> LangTag {
    LangTag::parse("fra").expect("tag")
}

const ADD_ENG: &str = "def add(a, b):\n    \"\"\"Add two numbers\"\"\"\n    return a + b\n";
const ADD_FRA: &str =
    "def additionner(x, y):\n    \"\"\"Additionne deux nombres\"\"\"\n    return x + y\n";

#[test]
fn cross_language_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let english = pool.store(ADD_ENG, &eng(), "").expect("store eng");
    let french = pool.store(ADD_FRA, &fra(), "").expect("store fra");

    assert_eq!(english.function_hash, french.function_hash);
    assert_ne!(english.overlay_hash, french.overlay_hash);

    let object = pool.load_object(&english.function_hash).expect("object");
    assert_eq!(
        object.normalized_code,
        "def _bb_v_0(_bb_v_1, _bb_v_2):\n    return _bb_v_1 + _bb_v_2\n"
    );

    let languages: Vec<String> = pool
        .list_languages(&english.function_hash)
        .expect("languages")
        .into_iter()
        .map(|tag| tag.as_str().to_owned())
        .collect();
    assert_eq!(languages, vec!["eng", "fra"]);

    let restored_eng = pool
        .denormalize(&english.function_hash, &eng(), None)
        .expect("denormalize eng");
    assert_eq!(
        restored_eng,
        "def add(a, b):\n    'Add two numbers'\n    return a + b\n"
    );

    let restored_fra = pool
        .denormalize(&french.function_hash, &fra(), None)
        .expect("denormalize fra");
    assert_eq!(
        restored_fra,
        "def additionner(x, y):\n    'Additionne deux nombres'\n    return x + y\n"
    );
}

#[test]
fn pool_reference_rewrite_and_restore() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let helper = pool
        .store("def helper(z):\n    return z * 2\n", &eng(), "")
        .expect("store helper");
    let h1 = helper.function_hash.as_str().to_owned();

    let source = format!(
        "from bb.pool import object_{h1} as twice\n\ndef double_all(xs):\n    \"\"\"Double each element\"\"\"\n    return [twice(x) for x in xs]\n"
    );
    let stored = pool.store(&source, &eng(), "").expect("store double_all");

    let object = pool.load_object(&stored.function_hash).expect("object");
    assert!(object
        .normalized_code
        .contains(&format!("from bb.pool import object_{h1}\n")));
    assert!(!object.normalized_code.contains("as twice"));
    assert!(object
        .normalized_code
        .contains(&format!("object_{h1}._bb_v_0(_bb_v_2)")));

    let overlay = pool
        .load_overlay(&stored.function_hash, &eng(), None)
        .expect("overlay");
    assert_eq!(
        overlay.alias_mapping,
        BTreeMap::from([(h1.clone(), "twice".to_owned())])
    );

    let restored = pool
        .denormalize(&stored.function_hash, &eng(), None)
        .expect("denormalize");
    assert!(restored.contains(&format!("from bb.pool import object_{h1} as twice")));
    assert!(restored.contains("return [twice(x) for x in xs]"));

    // The reconstruction carries the same identity.
    let again = pool.store(&restored, &eng(), "").expect("re-store");
    assert_eq!(again.function_hash, stored.function_hash);
    assert_eq!(again.overlay_hash, stored.overlay_hash);

    let deps = pool.dependencies(&stored.function_hash).expect("deps");
    assert_eq!(deps, vec![helper.function_hash]);
}

#[test]
fn multiple_overlays_same_language() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let formal = pool.store(ADD_ENG, &eng(), "formal").expect("store formal");
    let casual = pool.store(ADD_ENG, &eng(), "casual").expect("store casual");
    assert_eq!(formal.function_hash, casual.function_hash);
    assert_ne!(formal.overlay_hash, casual.overlay_hash);

    let listed = pool
        .list_overlays(&formal.function_hash, &eng())
        .expect("list");
    assert_eq!(listed.len(), 2);

    let err = pool
        .load_overlay(&formal.function_hash, &eng(), None)
        .unwrap_err();
    let PoolError::AmbiguousOverlay { candidates, .. } = &err else {
        panic!("expected AmbiguousOverlay, got {err:?}");
    };
    assert_eq!(candidates.len(), 2);
    assert!(candidates
        .iter()
        .any(|(hash, comment)| hash == formal.overlay_hash.as_str() && comment == "formal"));
    assert!(candidates
        .iter()
        .any(|(hash, comment)| hash == casual.overlay_hash.as_str() && comment == "casual"));

    let chosen = pool
        .load_overlay(&formal.function_hash, &eng(), Some(&formal.overlay_hash))
        .expect("load chosen");
    assert_eq!(chosen.comment, "formal");

    // Identical content stores to the identical overlay.
    let repeat = pool.store(ADD_ENG, &eng(), "formal").expect("repeat");
    assert_eq!(repeat.overlay_hash, formal.overlay_hash);
    assert_eq!(
        pool.list_overlays(&formal.function_hash, &eng())
            .expect("list again")
            .len(),
        2
    );
}

#[test]
fn async_functions_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let stored = pool
        .store(
            "async def fetch(url):\n    \"\"\"Fetch\"\"\"\n    r = await get(url)\n    return r\n",
            &eng(),
            "",
        )
        .expect("store");

    let object = pool.load_object(&stored.function_hash).expect("object");
    assert!(object.normalized_code.starts_with("async def _bb_v_0"));
    assert!(object.normalized_code.contains("await "));
    // `get` is free and unimported: it is slot-assigned by policy.
    assert!(!object.normalized_code.contains("get"));

    let restored = pool
        .denormalize(&stored.function_hash, &eng(), None)
        .expect("denormalize");
    assert_eq!(
        restored,
        "async def fetch(url):\n    'Fetch'\n    r = await get(url)\n    return r\n"
    );
}

#[test]
fn locator_surface_syntax() {
    let hash = "a1".repeat(32);
    let overlay = "b2".repeat(32);

    let locator = bb::parse_locator(&hash).expect("hash only");
    assert_eq!(locator.hash.as_str(), hash);
    assert!(locator.lang.is_none());

    let locator = bb::parse_locator(&format!("{hash}@eng")).expect("hash and lang");
    assert_eq!(locator.lang.as_ref().map(|tag| tag.as_str()), Some("eng"));
    assert!(locator.overlay.is_none());

    let locator =
        bb::parse_locator(&format!("{hash}@eng@{overlay}")).expect("fully specified");
    assert_eq!(locator.overlay.as_ref().map(|o| o.as_str()), Some(overlay.as_str()));

    assert_eq!(
        bb::parse_locator("abc@en").unwrap_err().kind(),
        ErrorKind::InvalidLanguageTag
    );
    assert_eq!(
        bb::parse_locator("nothex@eng").unwrap_err().kind(),
        ErrorKind::InvalidHash
    );
    assert_eq!(
        bb::parse_locator(&format!("{hash}@eng@{overlay}@more"))
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidLocator
    );
}

#[test]
fn locator_drives_retrieval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);
    let stored = pool.store(ADD_ENG, &eng(), "").expect("store");

    let locator = bb::parse_locator(&format!(
        "{}@eng@{}",
        stored.function_hash, stored.overlay_hash
    ))
    .expect("locator");
    let text = pool
        .denormalize(
            &locator.hash,
            locator.lang.as_ref().expect("lang"),
            locator.overlay.as_ref(),
        )
        .expect("denormalize");
    assert!(text.starts_with("def add(a, b):"));
}

#[test]
fn integrity_violation_detected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);
    let stored = pool.store(ADD_ENG, &eng(), "original").expect("store");

    let mapping_path: PathBuf = dir
        .path()
        .join("pool")
        .join(stored.function_hash.prefix())
        .join(stored.function_hash.rest())
        .join("eng")
        .join(stored.overlay_hash.prefix())
        .join(stored.overlay_hash.rest())
        .join("mapping.json");
    assert!(mapping_path.is_file());

    let text = fs::read_to_string(&mapping_path).expect("read");
    fs::write(&mapping_path, text.replace("original", "tampered")).expect("mutate");

    let report = pool.validate(&stored.function_hash).expect("validate");
    assert!(!report.is_valid());
    let integrity = report
        .errors
        .iter()
        .find(|err| err.kind() == ErrorKind::IntegrityFailure)
        .expect("integrity error");
    let PoolError::IntegrityFailure { path, .. } = integrity else {
        panic!("wrong variant");
    };
    assert_eq!(path, &mapping_path);
}

#[test]
fn store_is_deterministic_and_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let first = pool.store(ADD_ENG, &eng(), "note").expect("first");
    let files_before = count_files(dir.path());
    let second = pool.store(ADD_ENG, &eng(), "note").expect("second");
    assert_eq!(first, second);
    assert_eq!(count_files(dir.path()), files_before);
}

fn count_files(dir: &std::path::Path) -> usize {
    let mut count = 0;
    for entry in fs::read_dir(dir).expect("read dir") {
        let entry = entry.expect("entry");
        if entry.file_type().expect("type").is_dir() {
            count += count_files(&entry.path());
        } else {
            count += 1;
        }
    }
    count
}

#[test]
fn overlays_are_content_addressed_across_functions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    let one = pool
        .store("def add(a, b):\n    return a + b\n", &eng(), "")
        .expect("store one");
    let two = pool
        .store("def add(a, b):\n    return a - b\n", &eng(), "")
        .expect("store two");
    assert_ne!(one.function_hash, two.function_hash);
    // Same docstring, names, aliases, and comment: same overlay identity.
    assert_eq!(one.overlay_hash, two.overlay_hash);
}

#[test]
fn add_overlay_to_existing_function() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);
    let stored = pool.store(ADD_ENG, &eng(), "").expect("store");

    let overlay_hash = pool
        .add_overlay(
            &stored.function_hash,
            &fra(),
            "Additionne deux nombres".to_owned(),
            BTreeMap::from([
                ("_bb_v_0".to_owned(), "additionner".to_owned()),
                ("_bb_v_1".to_owned(), "x".to_owned()),
                ("_bb_v_2".to_owned(), "y".to_owned()),
            ]),
            BTreeMap::new(),
            String::new(),
        )
        .expect("add overlay");

    let restored = pool
        .denormalize(&stored.function_hash, &fra(), Some(&overlay_hash))
        .expect("denormalize");
    assert_eq!(
        restored,
        "def additionner(x, y):\n    'Additionne deux nombres'\n    return x + y\n"
    );

    let missing = "f".repeat(64);
    let err = pool
        .add_overlay(
            &bb::FunctionHash::parse(&missing).expect("hash"),
            &fra(),
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            String::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn missing_lookups_are_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);
    let stored = pool.store(ADD_ENG, &eng(), "").expect("store");

    let ghost = bb::FunctionHash::parse(&"0".repeat(64)).expect("hash");
    assert!(!pool.has_function(&ghost));
    assert_eq!(
        pool.load_object(&ghost).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    // Function exists, language does not.
    let err = pool
        .load_overlay(&stored.function_hash, &fra(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Language exists, requested overlay does not.
    let ghost_overlay = bb::OverlayHash::parse(&"9".repeat(64)).expect("hash");
    let err = pool
        .load_overlay(&stored.function_hash, &eng(), Some(&ghost_overlay))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn rejected_inputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    assert_eq!(
        pool.store("def f(:\n", &eng(), "").unwrap_err().kind(),
        ErrorKind::InvalidSource
    );
    assert_eq!(
        pool.store("x = 1\n", &eng(), "").unwrap_err().kind(),
        ErrorKind::UnsupportedUnit
    );
    assert_eq!(
        pool.store("def f():\n    pass\n\ndef g():\n    pass\n", &eng(), "")
            .unwrap_err()
            .kind(),
        ErrorKind::UnsupportedUnit
    );
    assert!(LangTag::parse("en").is_err());
}

#[test]
fn whole_pool_validates_after_many_stores() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_pool(&dir);

    pool.store(ADD_ENG, &eng(), "").expect("store");
    pool.store(ADD_FRA, &fra(), "").expect("store");
    pool.store("def helper(z):\n    return z * 2\n", &eng(), "")
        .expect("store");
    pool.store(
        "import math\n\ndef area(r):\n    \"\"\"Circle area\"\"\"\n    return math.pi * r ** 2\n",
        &eng(),
        "",
    )
    .expect("store");

    let report = pool.validate_all().expect("validate all");
    assert!(report.is_valid(), "reports: {:?}", report.reports);
    assert_eq!(report.functions_total, 3);
    assert!(report.languages.contains("eng"));
    assert!(report.languages.contains("fra"));
}
