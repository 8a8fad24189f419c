//! Content-addressed node rows: a flat, line-oriented encoding of a
//! parsed tree.
//!
//! Every JSON object in the tree's serde representation becomes a node
//! addressed by the SHA-256 of its canonical JSON, with child objects
//! replaced by their hashes. Each node flattens to `(hash, key, index,
//! value)` rows, so identical subtrees share one set of rows and external
//! tooling can diff or store trees at node granularity. [`read_module`]
//! inverts [`write_module`] exactly.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use bb_error::{PoolError, Result};
use bb_parser::Module;

/// Index marker for an empty array field.
pub const EMPTY_LIST_INDEX: i64 = -1;

/// One row of the flat encoding.
///
/// `index` is `None` for scalar fields, [`EMPTY_LIST_INDEX`] for an empty
/// array, and the element position otherwise. `value` is an atom or the
/// 64-hex hash of a child node.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub hash: String,
    pub key: String,
    pub index: Option<i64>,
    pub value: Value,
}

impl Row {
    /// Serialize as one JSON-lines array: `[hash, key, index, value]`.
    pub fn to_line(&self) -> String {
        let index = match self.index {
            Some(index) => Value::from(index),
            None => Value::Null,
        };
        Value::Array(vec![
            Value::String(self.hash.clone()),
            Value::String(self.key.clone()),
            index,
            self.value.clone(),
        ])
        .to_string()
    }

    /// Parse one JSON-lines array back into a row.
    pub fn from_line(line: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(line)
            .map_err(|err| PoolError::unsupported(format!("malformed row: {err}")))?;
        let Value::Array(items) = parsed else {
            return Err(PoolError::unsupported("row is not a JSON array"));
        };
        let [hash, key, index, value] = <[Value; 4]>::try_from(items)
            .map_err(|_| PoolError::unsupported("row must have four elements"))?;
        let (Value::String(hash), Value::String(key)) = (hash, key) else {
            return Err(PoolError::unsupported("row hash and key must be strings"));
        };
        let index = match index {
            Value::Null => None,
            Value::Number(number) => Some(number.as_i64().ok_or_else(|| {
                PoolError::unsupported("row index must be an integer")
            })?),
            _ => return Err(PoolError::unsupported("row index must be null or integer")),
        };
        Ok(Self {
            hash,
            key,
            index,
            value,
        })
    }
}

/// Flatten a module into rows. Returns the root node hash and every row,
/// children before parents.
pub fn write_module(module: &Module) -> Result<(String, Vec<Row>)> {
    let value = serde_json::to_value(module)
        .map_err(|err| PoolError::unsupported(format!("tree does not serialize: {err}")))?;
    let mut rows = Vec::new();
    let root = write_value(&value, &mut rows)?;
    let Value::String(root_hash) = root else {
        return Err(PoolError::unsupported("tree root is not an object"));
    };
    Ok((root_hash, rows))
}

/// Reconstruct a module from rows produced by [`write_module`].
pub fn read_module(rows: &[Row]) -> Result<Module> {
    let value = assemble(rows)?;
    serde_json::from_value(value)
        .map_err(|err| PoolError::unsupported(format!("rows do not form a tree: {err}")))
}

/// Encode one value; objects are hashed and emitted as rows, everything
/// else passes through as the field representation.
fn write_value(value: &Value, rows: &mut Vec<Row>) -> Result<Value> {
    let Value::Object(fields) = value else {
        return Ok(value.clone());
    };

    // Canonical node form: children replaced by their hashes, keys sorted
    // by the map representation.
    let mut canonical = Map::new();
    for (key, field) in fields {
        let repr = match field {
            Value::Array(items) => {
                let mut reprs = Vec::with_capacity(items.len());
                for item in items {
                    reprs.push(write_value(item, rows)?);
                }
                Value::Array(reprs)
            }
            other => write_value(other, rows)?,
        };
        canonical.insert(key.clone(), repr);
    }

    let digest = Sha256::digest(Value::Object(canonical.clone()).to_string().as_bytes());
    let hash = format!("{digest:x}");

    for (key, repr) in canonical {
        match repr {
            Value::Array(items) if items.is_empty() => rows.push(Row {
                hash: hash.clone(),
                key,
                index: Some(EMPTY_LIST_INDEX),
                value: Value::Null,
            }),
            Value::Array(items) => {
                for (position, item) in items.into_iter().enumerate() {
                    rows.push(Row {
                        hash: hash.clone(),
                        key: key.clone(),
                        index: Some(position as i64),
                        value: item,
                    });
                }
            }
            scalar => rows.push(Row {
                hash: hash.clone(),
                key,
                index: None,
                value: scalar,
            }),
        }
    }

    Ok(Value::String(hash))
}

/// Rebuild the root JSON value from rows.
fn assemble(rows: &[Row]) -> Result<Value> {
    // hash -> key -> collected field (scalar or indexed array slots).
    let mut objects: BTreeMap<&str, BTreeMap<&str, FieldSlot>> = BTreeMap::new();
    for row in rows {
        let fields = objects.entry(row.hash.as_str()).or_default();
        match row.index {
            None => {
                fields.insert(row.key.as_str(), FieldSlot::Scalar(row.value.clone()));
            }
            Some(EMPTY_LIST_INDEX) => {
                fields.insert(row.key.as_str(), FieldSlot::Array(BTreeMap::new()));
            }
            Some(position) => {
                let slot = fields
                    .entry(row.key.as_str())
                    .or_insert_with(|| FieldSlot::Array(BTreeMap::new()));
                let FieldSlot::Array(items) = slot else {
                    return Err(PoolError::unsupported(format!(
                        "field '{}' is both scalar and array",
                        row.key
                    )));
                };
                let position = usize::try_from(position).map_err(|_| {
                    PoolError::unsupported(format!("negative index {position}"))
                })?;
                items.insert(position, row.value.clone());
            }
        }
    }

    // The root is the one node no other node references.
    let mut referenced: HashSet<&str> = HashSet::new();
    for fields in objects.values() {
        for slot in fields.values() {
            let mut note = |value: &Value| {
                if let Value::String(text) = value {
                    if let Some((key, _)) = objects.get_key_value(text.as_str()) {
                        referenced.insert(*key);
                    }
                }
            };
            match slot {
                FieldSlot::Scalar(value) => note(value),
                FieldSlot::Array(items) => items.values().for_each(note),
            }
        }
    }
    let mut roots = objects
        .keys()
        .copied()
        .filter(|hash| !referenced.contains(hash));
    let root = roots
        .next()
        .ok_or_else(|| PoolError::unsupported("rows contain no root node"))?;
    if roots.next().is_some() {
        return Err(PoolError::unsupported("rows contain more than one root node"));
    }

    resolve(root, &objects)
}

enum FieldSlot {
    Scalar(Value),
    Array(BTreeMap<usize, Value>),
}

/// Materialize one node, recursively resolving hash references. A string
/// resolves as a reference only when it names a node in this document.
fn resolve(hash: &str, objects: &BTreeMap<&str, BTreeMap<&str, FieldSlot>>) -> Result<Value> {
    let fields = objects
        .get(hash)
        .ok_or_else(|| PoolError::unsupported(format!("missing node {hash}")))?;

    let mut out = Map::new();
    for (key, slot) in fields {
        let value = match slot {
            FieldSlot::Scalar(value) => resolve_field(value, objects)?,
            FieldSlot::Array(items) => {
                let expected = items.len();
                let mut list = Vec::with_capacity(expected);
                for (position, item) in items {
                    if *position != list.len() {
                        return Err(PoolError::unsupported(format!(
                            "field '{key}' of node {hash} has a gap at index {position}"
                        )));
                    }
                    list.push(resolve_field(item, objects)?);
                }
                Value::Array(list)
            }
        };
        out.insert((*key).to_owned(), value);
    }
    Ok(Value::Object(out))
}

fn resolve_field(
    value: &Value,
    objects: &BTreeMap<&str, BTreeMap<&str, FieldSlot>>,
) -> Result<Value> {
    if let Value::String(text) = value {
        if text.len() == 64 && objects.contains_key(text.as_str()) {
            return resolve(text, objects);
        }
    }
    Ok(value.clone())
}
