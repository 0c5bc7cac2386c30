#![forbid(unsafe_code)]

//! Column sources for plot traces.
//!
//! A trace descriptor sent to the client is compact: large numeric arrays live
//! in a separate column-source model and are stitched back in by dotted path
//! (`x`, `marker.color`, `error_x.array`, `transforms.0.value`). Columns are
//! flat numeric lists or little-endian `f64` byte buffers; multi-dimensional
//! columns carry a shape and are reshaped on the way in.
//!
//! # Invariants
//!
//! 1. `reshape(flatten(v))` reproduces `v` for every rectangular nested list.
//! 2. `stitch(extract_columns(t))` reproduces `t` up to numeric widening of
//!    byte buffers.
//!
//! # Failure Modes
//!
//! | Failure | Error |
//! |---------|-------|
//! | element count does not match shape | [`SyncError::Shape`] |
//! | byte buffer not a multiple of 8 | [`SyncError::Decode`] |
//! | ragged nested list | [`SyncError::InvalidSchema`] |

use std::collections::BTreeMap;

use syncview_core::{FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, SyncError, Value};

/// Schema of a column-source model: `data` (path → column) and `shapes`
/// (path → dimension list).
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn column_source_schema() -> Result<Schema> {
    Schema::define([
        FieldSpec::new("data", FieldType::Map, Value::empty_map()),
        FieldSpec::new("shapes", FieldType::Map, Value::empty_map()),
    ])
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Most lists a shape with a zero dimension may expand to.
///
/// Such a shape carries no elements, so nothing else bounds its size.
const MAX_EMPTY_LISTS: usize = 1 << 20;

/// Nest `flat` according to `shape`.
///
/// An empty shape yields the single scalar element.
///
/// # Errors
///
/// [`SyncError::Shape`] when `flat.len()` is not the product of `shape`, when
/// that product overflows `usize` (reported as `expected: usize::MAX`), or
/// when a zero-sized shape would expand to more than `MAX_EMPTY_LISTS` lists.
pub fn reshape(flat: &[Value], shape: &[usize]) -> Result<Value> {
    let mismatch = |expected| SyncError::Shape {
        shape: shape.to_vec(),
        expected,
        found: flat.len(),
    };
    let expected = element_count(shape).ok_or_else(|| mismatch(usize::MAX))?;
    if flat.len() != expected {
        return Err(mismatch(expected));
    }
    if expected == 0 {
        let lists = element_count(&shape[..shape.iter().take_while(|d| **d != 0).count()]);
        if lists.is_none_or(|n| n > MAX_EMPTY_LISTS) {
            return Err(mismatch(0));
        }
    }
    Ok(nest(flat, shape))
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
}

// `flat.len()` is a multiple of `outer` whenever `outer` is non-zero.
fn nest(flat: &[Value], shape: &[usize]) -> Value {
    match shape {
        [] => flat.first().cloned().unwrap_or(Value::Null),
        [_] => Value::List(flat.to_vec()),
        [outer, rest @ ..] => {
            let stride = flat.len().checked_div(*outer).unwrap_or(0);
            let items = (0..*outer)
                .map(|i| nest(&flat[i * stride..(i + 1) * stride], rest))
                .collect();
            Value::List(items)
        }
    }
}

/// Inverse of [`reshape`]: the row-major elements and the shape.
///
/// # Errors
///
/// [`SyncError::InvalidSchema`] for ragged or mixed nesting.
pub fn flatten(nested: &Value) -> Result<(Vec<Value>, Vec<usize>)> {
    let mut flat = Vec::new();
    let shape = flatten_into(nested, &mut flat)?;
    Ok((flat, shape))
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) -> Result<Vec<usize>> {
    let Value::List(items) = value else {
        out.push(value.clone());
        return Ok(Vec::new());
    };
    let mut inner: Option<Vec<usize>> = None;
    for item in items {
        let shape = flatten_into(item, out)?;
        match &inner {
            None => inner = Some(shape),
            Some(expected) if *expected == shape => {}
            Some(expected) => {
                return Err(SyncError::schema(format!(
                    "ragged column: element shape {shape:?} differs from {expected:?}"
                )));
            }
        }
    }
    let mut shape = vec![items.len()];
    shape.extend(inner.unwrap_or_default());
    Ok(shape)
}

fn parse_shape(value: Option<&Value>) -> Option<Vec<usize>> {
    value?
        .as_list()?
        .iter()
        .map(|v| v.as_i64().and_then(|n| usize::try_from(n).ok()))
        .collect()
}

// ---------------------------------------------------------------------------
// Byte buffers
// ---------------------------------------------------------------------------

/// Pack floats as little-endian `f64`.
#[must_use]
pub fn encode_f64_le(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_f64_le(bytes: &[u8]) -> Result<Vec<Value>> {
    if bytes.len() % 8 != 0 {
        return Err(SyncError::decode(format!(
            "f64 buffer length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            Value::Float(f64::from_le_bytes(raw))
        })
        .collect())
}

/// Decode one column and apply its shape, if it has more than one dimension.
///
/// # Errors
///
/// [`SyncError::Decode`] for malformed buffers or non-column values,
/// [`SyncError::Shape`] for a shape mismatch.
pub fn decode_column(column: &Value, shape: Option<&[usize]>) -> Result<Value> {
    let flat = match column {
        Value::Bytes(bytes) => decode_f64_le(bytes)?,
        Value::List(items) => items.clone(),
        other => {
            return Err(SyncError::decode(format!(
                "column must be a list or byte buffer, found {}",
                other.kind()
            )));
        }
    };
    match shape {
        Some(shape) if shape.len() > 1 => reshape(&flat, shape),
        _ => Ok(Value::List(flat)),
    }
}

// ---------------------------------------------------------------------------
// Dotted paths
// ---------------------------------------------------------------------------

/// Look up a dotted path. Numeric segments index lists.
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Map(map) => map.get(segment),
        Value::List(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Write `value` at a dotted path, creating intermediate maps.
///
/// # Errors
///
/// [`SyncError::InvalidSchema`] when a segment crosses a scalar or indexes
/// past the end of a list.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut segments = path.split('.').peekable();
    let mut node = root;
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if node.is_null() {
            *node = Value::empty_map();
        }
        node = match node {
            Value::Map(map) => {
                if last {
                    map.insert(segment.to_owned(), value);
                    return Ok(());
                }
                map.entry(segment.to_owned()).or_insert(Value::Null)
            }
            Value::List(items) => {
                let len = items.len();
                let slot = segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| {
                        SyncError::schema(format!(
                            "path `{path}`: segment `{segment}` is not an index below {len}"
                        ))
                    })?;
                if last {
                    *slot = value;
                    return Ok(());
                }
                slot
            }
            other => {
                return Err(SyncError::schema(format!(
                    "path `{path}`: cannot descend into {} at `{segment}`",
                    other.kind()
                )));
            }
        };
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stitch / extract
// ---------------------------------------------------------------------------

/// Insert every column of `columns` into a copy of `trace`.
///
/// `shapes` maps a column path to its dimension list.
///
/// # Errors
///
/// Column decode and shape errors, and [`set_path`] errors.
pub fn stitch(trace: &Value, columns: &Value, shapes: &Value) -> Result<Value> {
    let mut out = trace.clone();
    let Some(columns) = columns.as_map() else {
        return Ok(out);
    };
    for (path, column) in columns {
        let shape = parse_shape(shapes.get(path));
        let decoded = decode_column(column, shape.as_deref())?;
        set_path(&mut out, path, decoded)?;
    }
    Ok(out)
}

/// A trace with its numeric arrays moved out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedColumns {
    pub trace: Value,
    /// Dotted path → flat column.
    pub columns: BTreeMap<String, Value>,
    /// Dotted path → shape, for columns of more than one dimension.
    pub shapes: BTreeMap<String, Vec<usize>>,
}

impl ExtractedColumns {
    /// The `data`/`shapes` pair as written to a column-source model.
    #[must_use]
    pub fn source_fields(&self) -> (Value, Value) {
        let shapes = self
            .shapes
            .iter()
            .map(|(path, shape)| {
                let dims = shape
                    .iter()
                    .map(|d| Value::Int(i64::try_from(*d).unwrap_or(i64::MAX)))
                    .collect::<Vec<_>>();
                (path.clone(), Value::List(dims))
            })
            .collect::<BTreeMap<_, _>>();
        (Value::Map(self.columns.clone()), Value::Map(shapes))
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

/// Flat numeric column and its shape, if `value` is a non-empty rectangular
/// numeric array or a byte buffer.
fn numeric_column(value: &Value) -> Option<(Value, Vec<usize>)> {
    match value {
        Value::Bytes(_) => Some((value.clone(), Vec::new())),
        Value::List(items) if !items.is_empty() => {
            let (flat, shape) = flatten(value).ok()?;
            if flat.iter().all(is_number) {
                Some((Value::List(flat), shape))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Move numeric arrays out of `trace`, recursing into maps and lists of maps.
#[must_use]
pub fn extract_columns(trace: &Value) -> ExtractedColumns {
    let mut out = ExtractedColumns::default();
    out.trace = extract_node(trace, "", &mut out.columns, &mut out.shapes);
    out
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

fn extract_node(
    node: &Value,
    prefix: &str,
    columns: &mut BTreeMap<String, Value>,
    shapes: &mut BTreeMap<String, Vec<usize>>,
) -> Value {
    match node {
        Value::Map(map) => {
            let mut kept = BTreeMap::new();
            for (key, value) in map {
                let path = join(prefix, key);
                if let Some((column, shape)) = numeric_column(value) {
                    if shape.len() > 1 {
                        shapes.insert(path.clone(), shape);
                    }
                    columns.insert(path, column);
                } else {
                    kept.insert(key.clone(), extract_node(value, &path, columns, shapes));
                }
            }
            Value::Map(kept)
        }
        Value::List(items) if items.iter().any(|v| matches!(v, Value::Map(_))) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| extract_node(item, &join(prefix, &i.to_string()), columns, shapes))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Write the columns of `extracted` into a column-source model.
///
/// Only the fields whose value differs are written, so an unchanged split
/// produces no notification.
///
/// # Errors
///
/// Model write errors.
pub fn sync_columns(source: &PropertyModel, extracted: &ExtractedColumns) -> Result<usize> {
    let (data, shapes) = extracted.source_fields();
    source.update([("data", data), ("shapes", shapes)], Origin::RemoteSync)
}
