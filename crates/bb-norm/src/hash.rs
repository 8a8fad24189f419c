//! Content hashing for functions and overlays.
//!
//! The function hash covers exactly the UTF-8 bytes of the canonical
//! source text. The overlay hash covers the canonical JSON of the four
//! overlay fields: keys sorted, compact separators, Unicode unescaped, no
//! trailing newline.

use sha2::{Digest, Sha256};

use bb_types::{FunctionHash, LanguageOverlay, OverlayHash};

/// SHA-256 of the canonical code, hex-lowercase.
pub fn function_hash(canonical_code: &str) -> FunctionHash {
    let digest = Sha256::digest(canonical_code.as_bytes());
    FunctionHash::new(format!("{digest:x}")).expect("sha256 hex digest is always 64 hex chars")
}

/// SHA-256 of the overlay's canonical JSON, hex-lowercase.
pub fn overlay_hash(overlay: &LanguageOverlay) -> OverlayHash {
    let digest = Sha256::digest(canonical_overlay_json(overlay).as_bytes());
    OverlayHash::new(format!("{digest:x}")).expect("sha256 hex digest is always 64 hex chars")
}

/// The overlay-hash preimage.
///
/// Keys are emitted in explicit sorted order (`alias_mapping`, `comment`,
/// `docstring`, `name_mapping`) rather than trusting a serializer default;
/// the nested maps are `BTreeMap`s, so their keys are sorted by
/// construction.
pub fn canonical_overlay_json(overlay: &LanguageOverlay) -> String {
    let mut object = serde_json::Map::new();
    object.insert(
        "alias_mapping".to_owned(),
        serde_json::to_value(&overlay.alias_mapping).expect("string map serializes"),
    );
    object.insert(
        "comment".to_owned(),
        serde_json::Value::String(overlay.comment.clone()),
    );
    object.insert(
        "docstring".to_owned(),
        serde_json::Value::String(overlay.docstring.clone()),
    );
    object.insert(
        "name_mapping".to_owned(),
        serde_json::to_value(&overlay.name_mapping).expect("string map serializes"),
    );
    serde_json::Value::Object(object).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn overlay() -> LanguageOverlay {
        LanguageOverlay {
            docstring: "Add two numbers".to_owned(),
            name_mapping: BTreeMap::from([
                ("_bb_v_0".to_owned(), "add".to_owned()),
                ("_bb_v_1".to_owned(), "a".to_owned()),
                ("_bb_v_2".to_owned(), "b".to_owned()),
            ]),
            alias_mapping: BTreeMap::new(),
            comment: String::new(),
        }
    }

    #[test]
    fn function_hash_known_vector() {
        // sha256 of the empty string.
        assert_eq!(
            function_hash("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn function_hash_is_deterministic() {
        let code = "def _bb_v_0(_bb_v_1, _bb_v_2):\n    return _bb_v_1 + _bb_v_2\n";
        assert_eq!(function_hash(code), function_hash(code));
        assert_ne!(function_hash(code), function_hash("x = 1\n"));
    }

    #[test]
    fn canonical_json_shape() {
        let json = canonical_overlay_json(&overlay());
        assert_eq!(
            json,
            r#"{"alias_mapping":{},"comment":"","docstring":"Add two numbers","name_mapping":{"_bb_v_0":"add","_bb_v_1":"a","_bb_v_2":"b"}}"#
        );
    }

    #[test]
    fn canonical_json_preserves_unicode() {
        let mut o = overlay();
        o.docstring = "Additionne deux entiers \u{e9}l\u{e9}mentaires".to_owned();
        let json = canonical_overlay_json(&o);
        assert!(json.contains("\u{e9}l\u{e9}mentaires"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn overlay_hash_ignores_map_insertion_order() {
        let mut forward = overlay();
        let mut backward = overlay();
        backward.name_mapping = forward.name_mapping.clone().into_iter().rev().collect();
        forward.name_mapping = forward.name_mapping.into_iter().collect();
        assert_eq!(overlay_hash(&forward), overlay_hash(&backward));
    }

    #[test]
    fn overlay_hash_covers_all_four_fields() {
        let base = overlay_hash(&overlay());

        let mut changed = overlay();
        changed.comment = "formal".to_owned();
        assert_ne!(overlay_hash(&changed), base);

        let mut changed = overlay();
        changed.docstring.push('!');
        assert_ne!(overlay_hash(&changed), base);

        let mut changed = overlay();
        changed
            .alias_mapping
            .insert("0".repeat(64), "twice".to_owned());
        assert_ne!(overlay_hash(&changed), base);

        let mut changed = overlay();
        changed
            .name_mapping
            .insert("_bb_v_3".to_owned(), "c".to_owned());
        assert_ne!(overlay_hash(&changed), base);
    }
}
