#![forbid(unsafe_code)]

//! Dynamic field values and declared field types.
//!
//! [`Value`] is the payload carried by every model field, patch and native
//! event. It is a closed, JSON-like tree with one extra leaf, [`Value::Bytes`],
//! for payloads that are not JSON-safe (file contents, numeric buffers).
//!
//! [`FieldType`] is the declared type of a model field. `FieldType::accepts`
//! is the single authority for `TypeMismatch` decisions.
//!
//! # Invariants
//!
//! 1. `Value::Map` keys are ordered (`BTreeMap`), so equality and iteration are
//!    independent of insertion order.
//! 2. `FieldType::Number` accepts both `Int` and `Float`; no other type
//!    performs implicit conversion.
//! 3. Converting to JSON and back is lossless for every variant except
//!    `Bytes`, which round-trips through the `{"__bytes__": <base64>}` form.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Key used when bytes are inlined into JSON as base64.
pub const INLINE_BYTES_KEY: &str = "__bytes__";

/// A dynamically typed field value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Runtime kind of a [`Value`], used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Empty string value.
    #[must_use]
    pub fn empty_str() -> Self {
        Self::Str(String::new())
    }

    /// Empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Build a map value from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list value from anything convertible into values.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }

    /// Whether this value is a scalar leaf (null, bool, number or string).
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_)
        )
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; ints widen to floats.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Convert into a `serde_json::Value`, inlining bytes as base64.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_with(&mut |bytes| {
            let mut obj = serde_json::Map::new();
            obj.insert(
                INLINE_BYTES_KEY.to_owned(),
                serde_json::Value::String(BASE64.encode(bytes)),
            );
            serde_json::Value::Object(obj)
        })
    }

    /// Convert into JSON, delegating every `Bytes` leaf to `on_bytes`.
    ///
    /// The wire codec uses this to move binary payloads into a side table.
    pub fn to_json_with(
        &self,
        on_bytes: &mut dyn FnMut(&[u8]) -> serde_json::Value,
    ) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(bytes) => on_bytes(bytes),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json_with(on_bytes)).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_with(on_bytes)))
                    .collect(),
            ),
        }
    }

    /// Convert from JSON, recognizing the inline base64 bytes form.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut inline = |obj: &serde_json::Map<String, serde_json::Value>| {
            if obj.len() != 1 {
                return None;
            }
            obj.get(INLINE_BYTES_KEY)
                .and_then(serde_json::Value::as_str)
                .and_then(|s| BASE64.decode(s).ok())
                .map(Value::Bytes)
        };
        Self::from_json_with(json, &mut inline)
    }

    /// Convert from JSON, letting `on_object` claim objects that encode bytes.
    pub fn from_json_with(
        json: &serde_json::Value,
        on_object: &mut dyn FnMut(&serde_json::Map<String, serde_json::Value>) -> Option<Value>,
    ) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|v| Self::from_json_with(v, on_object))
                    .collect(),
            ),
            serde_json::Value::Object(obj) => {
                if let Some(value) = on_object(obj) {
                    return value;
                }
                Self::Map(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Self::from_json_with(v, on_object)))
                        .collect(),
                )
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(&json)
    }
}

// ---------------------------------------------------------------------------
// FieldType
// ---------------------------------------------------------------------------

/// Declared type of a model field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Accepts any value.
    Any,
    Bool,
    Int,
    /// Int or float.
    Number,
    Str,
    Bytes,
    /// Homogeneous list.
    List(Box<FieldType>),
    Map,
    /// `Null` or the inner type.
    Nullable(Box<FieldType>),
    /// The inner type or a list of it.
    OneOrMany(Box<FieldType>),
}

impl FieldType {
    #[must_use]
    pub fn list_of(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    #[must_use]
    pub fn nullable(inner: FieldType) -> Self {
        Self::Nullable(Box::new(inner))
    }

    #[must_use]
    pub fn one_or_many(inner: FieldType) -> Self {
        Self::OneOrMany(Box::new(inner))
    }

    /// Whether `value` is a valid instance of this type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Number, Value::Int(_) | Value::Float(_)) => true,
            (Self::Str, Value::Str(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            (Self::List(inner), Value::List(items)) => items.iter().all(|v| inner.accepts(v)),
            (Self::Map, Value::Map(_)) => true,
            (Self::Nullable(_), Value::Null) => true,
            (Self::Nullable(inner), v) => inner.accepts(v),
            (Self::OneOrMany(inner), Value::List(items)) => {
                inner.accepts(value) || items.iter().all(|v| inner.accepts(v))
            }
            (Self::OneOrMany(inner), v) => inner.accepts(v),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Number => f.write_str("number"),
            Self::Str => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map => f.write_str("map"),
            Self::Nullable(inner) => write!(f, "{inner}?"),
            Self::OneOrMany(inner) => write!(f, "{inner} | list<{inner}>"),
        }
    }
}
