//! The inverse rewrite: canonical code + overlay -> readable source.
//!
//! Applies exactly the inverse of each normalizer pass, so re-normalizing
//! the reconstruction recovers the original function hash.

use std::collections::{BTreeMap, HashMap};

use bb_error::{PoolError, Result};
use bb_parser::ast::{Expr, ImportAlias, Module, Stmt};
use bb_parser::{parse_module, unparse};
use bb_types::{parse_pool_import_name, LanguageOverlay, OUTER_SLOT, POOL_MODULE};

use crate::names::{rename_stmt, rewrite_stmt, NameMap, Rewrite};

/// Reconstruct human-readable source from canonical code and an overlay.
pub fn denormalize(canonical_code: &str, overlay: &LanguageOverlay) -> Result<String> {
    let module = parse_module(canonical_code)?;

    // Validate the stored slot map before touching the tree.
    if NameMap::from_reverse(&overlay.name_mapping).is_none() {
        return Err(PoolError::unsupported(
            "overlay name mapping is not a dense slot range",
        ));
    }
    let reverse: HashMap<String, String> = overlay
        .name_mapping
        .iter()
        .map(|(slot, original)| (slot.clone(), original.clone()))
        .collect();

    let mut body = Vec::with_capacity(module.body.len());
    let mut restored_docstring = false;
    for stmt in module.body {
        let stmt = match stmt {
            Stmt::ImportFrom {
                module: path,
                names,
                level: 0,
            } if path == POOL_MODULE => restore_pool_import(names, &overlay.alias_mapping),
            Stmt::FunctionDef { .. } if !restored_docstring => {
                restored_docstring = true;
                let with_doc = insert_docstring(stmt, &overlay.docstring);
                let with_calls = rewrite_stmt(with_doc, &PoolCallRestorer {
                    alias_mapping: &overlay.alias_mapping,
                });
                rename_stmt(with_calls, &reverse)
            }
            other => other,
        };
        body.push(stmt);
    }

    if !restored_docstring {
        return Err(PoolError::unsupported(
            "canonical code does not contain a function definition",
        ));
    }

    Ok(unparse(&Module { body }))
}

/// Re-attach `as <alias>` clauses to a pool import.
fn restore_pool_import(
    names: Vec<ImportAlias>,
    alias_mapping: &BTreeMap<String, String>,
) -> Stmt {
    let names = names
        .into_iter()
        .map(|alias| {
            let asname = parse_pool_import_name(&alias.name)
                .and_then(|hash| alias_mapping.get(hash))
                .filter(|restored| restored.as_str() != alias.name)
                .cloned();
            ImportAlias {
                name: alias.name,
                asname,
            }
        })
        .collect();
    Stmt::ImportFrom {
        module: POOL_MODULE.to_owned(),
        names,
        level: 0,
    }
}

/// Insert the stored docstring as the first body statement, if any.
fn insert_docstring(func: Stmt, docstring: &str) -> Stmt {
    if docstring.is_empty() {
        return func;
    }
    let Stmt::FunctionDef {
        decorators,
        name,
        params,
        returns,
        mut body,
        is_async,
    } = func
    else {
        return func;
    };
    body.insert(0, Stmt::Expr(Expr::Str(docstring.to_owned())));
    Stmt::FunctionDef {
        decorators,
        name,
        params,
        returns,
        body,
        is_async,
    }
}

/// Rewrites `object_<hash>._bb_v_0` back to the contributor's bare alias.
struct PoolCallRestorer<'a> {
    alias_mapping: &'a BTreeMap<String, String>,
}

impl Rewrite for PoolCallRestorer<'_> {
    fn map_expr(&self, expr: Expr) -> Expr {
        if let Expr::Attribute { value, attr } = &expr {
            if attr == OUTER_SLOT {
                if let Expr::Name(name) = value.as_ref() {
                    if let Some(alias) = parse_pool_import_name(name)
                        .and_then(|hash| self.alias_mapping.get(hash))
                    {
                        return Expr::Name(alias.clone());
                    }
                }
            }
        }
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_source;

    fn hash64(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn round_trip(source: &str, comment: &str) -> (String, crate::normalize::Normalized) {
        let normalized = normalize_source(source).expect("normalize");
        let overlay = normalized.overlay(comment);
        let restored =
            denormalize(&normalized.canonical_code, &overlay).expect("denormalize");
        (restored, normalized)
    }

    #[test]
    fn restores_names_and_docstring() {
        let (restored, _) = round_trip(
            "def add(a, b):\n    \"\"\"Add two numbers\"\"\"\n    return a + b\n",
            "",
        );
        assert_eq!(
            restored,
            "def add(a, b):\n    'Add two numbers'\n    return a + b\n"
        );
    }

    #[test]
    fn restores_pool_alias_and_call() {
        let h = hash64('2');
        let source = format!(
            "from bb.pool import object_{h} as twice\n\ndef double_all(xs):\n    \"\"\"Double each element\"\"\"\n    return [twice(x) for x in xs]\n"
        );
        let (restored, _) = round_trip(&source, "");
        assert!(restored.contains(&format!("from bb.pool import object_{h} as twice")));
        assert!(restored.contains("return [twice(x) for x in xs]"));
        assert!(!restored.contains("_bb_v_"));
    }

    #[test]
    fn unaliased_pool_import_stays_bare() {
        let h = hash64('3');
        let source = format!(
            "from bb.pool import object_{h}\n\ndef f(x):\n    return object_{h}._bb_v_0(x)\n"
        );
        let (restored, _) = round_trip(&source, "");
        assert!(restored.contains(&format!("from bb.pool import object_{h}\n")));
        assert!(restored.contains(&format!("object_{h}._bb_v_0(x)")));
    }

    #[test]
    fn round_trip_recovers_function_hash() {
        let sources = [
            "def add(a, b):\n    \"\"\"Add two numbers\"\"\"\n    return a + b\n",
            "async def fetch(url):\n    \"\"\"Fetch\"\"\"\n    r = await get(url)\n    return r\n",
            "import math\n\ndef area(r):\n    return math.pi * r ** 2\n",
            "def outer(xs):\n    def helper(y):\n        return y * 2\n    total = 0\n    for x in xs:\n        total += helper(x)\n    return total\n",
            "def safe_div(a, b):\n    try:\n        return a / b\n    except ZeroDivisionError as e:\n        raise ValueError('denominator') from e\n",
        ];
        for source in sources {
            let normalized = normalize_source(source).expect("normalize");
            let overlay = normalized.overlay("");
            let restored =
                denormalize(&normalized.canonical_code, &overlay).expect("denormalize");
            let again = normalize_source(&restored).expect("re-normalize");
            assert_eq!(
                again.function_hash(),
                normalized.function_hash(),
                "round trip must preserve identity for:\n{source}"
            );
            assert_eq!(crate::hash::overlay_hash(&again.overlay("")), {
                crate::hash::overlay_hash(&overlay)
            });
        }
    }

    #[test]
    fn empty_docstring_inserts_nothing() {
        let (restored, _) = round_trip("def f(x):\n    return x\n", "");
        assert_eq!(restored, "def f(x):\n    return x\n");
    }

    #[test]
    fn corrupt_name_mapping_is_rejected() {
        let normalized = normalize_source("def f(x):\n    return x\n").expect("normalize");
        let mut overlay = normalized.overlay("");
        overlay
            .name_mapping
            .insert("_bb_v_9".to_owned(), "ghost".to_owned());
        assert!(denormalize(&normalized.canonical_code, &overlay).is_err());
    }

    #[test]
    fn code_without_function_is_rejected() {
        let overlay = LanguageOverlay {
            docstring: String::new(),
            name_mapping: BTreeMap::new(),
            alias_mapping: BTreeMap::new(),
            comment: String::new(),
        };
        assert!(denormalize("import os\n", &overlay).is_err());
    }
}
