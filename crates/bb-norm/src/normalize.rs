//! The canonical rewrite pipeline.
//!
//! Order matters and is fixed: sort imports, strip pool aliases, build the
//! name mapping, rewrite pool call sites, apply the mapping, drop the
//! outer docstring, emit. The emitted text is the hash preimage.

use std::collections::{BTreeMap, HashMap};

use bb_error::{PoolError, Result};
use bb_parser::ast::{Expr, Module, Stmt};
use bb_parser::{parse_module, unparse};
use bb_types::{FunctionHash, LanguageOverlay, IMPORT_PREFIX, OUTER_SLOT};

use crate::hash;
use crate::imports::{self, collect_bound_names};
use crate::names::{rename_stmt, rewrite_stmt, ExcludedNames, NameMap, Rewrite};

/// The outcome of normalizing one source unit.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Canonical source text; its UTF-8 bytes are the function-hash
    /// preimage.
    pub canonical_code: String,
    /// The outer function's docstring, raw and uncleaned; empty when the
    /// function has none.
    pub docstring: String,
    /// Slot bijection for the user-defined names.
    pub name_map: NameMap,
    /// Referenced pool hash -> contributor's alias.
    pub alias_mapping: BTreeMap<String, String>,
}

impl Normalized {
    /// The function identity of the canonical code.
    pub fn function_hash(&self) -> FunctionHash {
        hash::function_hash(&self.canonical_code)
    }

    /// Assemble the presentation overlay for this normalization.
    pub fn overlay(&self, comment: &str) -> LanguageOverlay {
        LanguageOverlay {
            docstring: self.docstring.clone(),
            name_mapping: self.name_map.reverse(),
            alias_mapping: self.alias_mapping.clone(),
            comment: comment.to_owned(),
        }
    }
}

/// Parse and normalize one source unit.
pub fn normalize_source(source: &str) -> Result<Normalized> {
    normalize_module(parse_module(source)?)
}

/// Normalize an already-parsed unit.
pub fn normalize_module(module: Module) -> Result<Normalized> {
    let (import_stmts, func) = split_unit(module)?;
    let classified = imports::classify(import_stmts)?;
    let (docstring, func) = extract_docstring(func);

    let mut excluded = ExcludedNames::new(
        classified.imported_names.iter().cloned(),
        classified.alias_names(),
    );
    exclude_body_import_names(&func, &mut excluded);

    let name_map = NameMap::build(&func, &excluded);

    let alias_to_hash: HashMap<String, String> = classified
        .alias_mapping
        .iter()
        .map(|(hash, alias)| (alias.clone(), hash.clone()))
        .collect();
    let func = rewrite_stmt(func, &PoolCallRewriter {
        alias_to_hash: &alias_to_hash,
    });
    let func = rename_stmt(func, &name_map.forward());

    let mut body = classified.imports;
    body.push(func);
    let canonical_code = unparse(&Module { body });

    Ok(Normalized {
        canonical_code,
        docstring,
        name_map,
        alias_mapping: classified.alias_mapping,
    })
}

/// Split the top level into imports and the single function definition.
fn split_unit(module: Module) -> Result<(Vec<Stmt>, Stmt)> {
    let mut imports = Vec::new();
    let mut func = None;
    for stmt in module.body {
        if stmt.is_import() {
            imports.push(stmt);
        } else if matches!(stmt, Stmt::FunctionDef { .. }) {
            if func.is_some() {
                return Err(PoolError::unsupported(
                    "only one function definition is allowed per unit",
                ));
            }
            func = Some(stmt);
        } else {
            return Err(PoolError::unsupported(
                "top level may contain only imports and one function definition",
            ));
        }
    }
    match func {
        Some(func) => Ok((imports, func)),
        None => Err(PoolError::unsupported("no function definition found")),
    }
}

/// Remove and return the outer function's docstring.
///
/// The raw decoded string value is kept as-is; contributors get back
/// exactly what they wrote.
fn extract_docstring(func: Stmt) -> (String, Stmt) {
    let Stmt::FunctionDef {
        decorators,
        name,
        params,
        returns,
        mut body,
        is_async,
    } = func
    else {
        return (String::new(), func);
    };

    let docstring = match body.first() {
        Some(Stmt::Expr(Expr::Str(_))) => {
            let Some(Stmt::Expr(Expr::Str(text))) = Some(body.remove(0)) else {
                unreachable!()
            };
            text
        }
        _ => String::new(),
    };

    (
        docstring,
        Stmt::FunctionDef {
            decorators,
            name,
            params,
            returns,
            body,
            is_async,
        },
    )
}

/// Names bound by import statements nested in the function body join the
/// exclusion set, so a local `import json` keeps `json` spelled as-is.
fn exclude_body_import_names(stmt: &Stmt, excluded: &mut ExcludedNames) {
    let mut names = std::collections::HashSet::new();
    fn walk(stmt: &Stmt, names: &mut std::collections::HashSet<String>) {
        collect_bound_names(stmt, names);
        for child in child_bodies(stmt) {
            for inner in child {
                walk(inner, names);
            }
        }
    }
    walk(stmt, &mut names);
    for name in names {
        excluded.insert(name);
    }
}

/// All statement lists nested directly under one statement.
fn child_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::FunctionDef { body, .. } | Stmt::With { body, .. } => vec![body],
        Stmt::For { body, orelse, .. }
        | Stmt::While { body, orelse, .. }
        | Stmt::If { body, orelse, .. } => vec![body, orelse],
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let mut bodies: Vec<&[Stmt]> = vec![body];
            for handler in handlers {
                bodies.push(&handler.body);
            }
            bodies.push(orelse);
            bodies.push(finalbody);
            bodies
        }
        Stmt::Match { cases, .. } => cases.iter().map(|case| case.body.as_slice()).collect(),
        _ => Vec::new(),
    }
}

/// Rewrites bare pool-alias names to `object_<hash>._bb_v_0`.
struct PoolCallRewriter<'a> {
    alias_to_hash: &'a HashMap<String, String>,
}

impl Rewrite for PoolCallRewriter<'_> {
    fn map_expr(&self, expr: Expr) -> Expr {
        if let Expr::Name(name) = &expr {
            if let Some(hash) = self.alias_to_hash.get(name) {
                return Expr::Attribute {
                    value: Box::new(Expr::Name(format!("{IMPORT_PREFIX}{hash}"))),
                    attr: OUTER_SLOT.to_owned(),
                };
            }
        }
        expr
    }
}
