//! Import classification, ordering, and pool-alias stripping.
//!
//! Imports split into two classes by syntactic form alone: pool imports
//! (`from bb.pool import object_<64-hex> [as alias]`) and everything else.
//! External imports pass through verbatim; pool imports lose their alias
//! clause, which is recorded for the overlay.

use std::collections::{BTreeMap, HashSet};

use bb_error::{PoolError, Result};
use bb_parser::ast::{ImportAlias, Module, Stmt};
use bb_types::{parse_pool_import_name, POOL_MODULE};

/// The import block of a unit after sorting and alias stripping.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedImports {
    /// Sorted imports with pool aliases removed, ready for emission.
    pub imports: Vec<Stmt>,
    /// Every name the (rewritten) imports bind in the unit's scope.
    pub imported_names: HashSet<String>,
    /// Referenced pool hash -> the alias the contributor used.
    pub alias_mapping: BTreeMap<String, String>,
}

impl ClassifiedImports {
    /// The alias names, i.e. the values of `alias_mapping`.
    pub fn alias_names(&self) -> HashSet<String> {
        self.alias_mapping.values().cloned().collect()
    }
}

/// Sort, classify, and strip a unit's top-level imports.
pub fn classify(imports: Vec<Stmt>) -> Result<ClassifiedImports> {
    let mut imports = imports;
    imports.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut out = ClassifiedImports::default();
    for stmt in imports {
        let stmt = match stmt {
            Stmt::ImportFrom {
                module,
                names,
                level,
            } if level == 0 && module == POOL_MODULE => {
                let mut stripped = Vec::with_capacity(names.len());
                for alias in names {
                    let Some(hash) = parse_pool_import_name(&alias.name) else {
                        return Err(PoolError::unsupported(format!(
                            "'{}' is not a valid pool import name",
                            alias.name
                        )));
                    };
                    if let Some(asname) = alias.asname {
                        out.alias_mapping.insert(hash.to_owned(), asname);
                    }
                    stripped.push(ImportAlias {
                        name: alias.name,
                        asname: None,
                    });
                }
                Stmt::ImportFrom {
                    module,
                    names: stripped,
                    level,
                }
            }
            other => other,
        };
        collect_bound_names(&stmt, &mut out.imported_names);
        out.imports.push(stmt);
    }
    Ok(out)
}

/// Names bound into scope by one import statement.
pub fn collect_bound_names(stmt: &Stmt, names: &mut HashSet<String>) {
    match stmt {
        Stmt::Import(aliases) | Stmt::ImportFrom { names: aliases, .. } => {
            for alias in aliases {
                names.insert(alias.bound_name().to_owned());
            }
        }
        _ => {}
    }
}

/// Pool-function hashes referenced by a unit's imports, in import order.
///
/// Existence of the referenced functions is deliberately not checked.
pub fn pool_references(module: &Module) -> Vec<String> {
    let mut refs = Vec::new();
    for stmt in &module.body {
        if let Stmt::ImportFrom {
            module: path,
            names,
            level: 0,
        } = stmt
        {
            if path != POOL_MODULE {
                continue;
            }
            for alias in names {
                if let Some(hash) = parse_pool_import_name(&alias.name) {
                    if !refs.iter().any(|existing| existing == hash) {
                        refs.push(hash.to_owned());
                    }
                }
            }
        }
    }
    refs
}

/// Total import ordering: `from`-imports before plain imports, then the
/// module path (with relative-level dots), then the sorted name list.
fn sort_key(stmt: &Stmt) -> (u8, String, Vec<String>) {
    match stmt {
        Stmt::ImportFrom {
            module,
            names,
            level,
        } => {
            let mut path = ".".repeat(*level as usize);
            path.push_str(module);
            (0, path, sorted_names(names))
        }
        Stmt::Import(names) => (1, String::new(), sorted_names(names)),
        _ => (2, String::new(), Vec::new()),
    }
}

fn sorted_names(names: &[ImportAlias]) -> Vec<String> {
    let mut sorted: Vec<String> = names.iter().map(|alias| alias.name.clone()).collect();
    sorted.sort_unstable();
    sorted
}
