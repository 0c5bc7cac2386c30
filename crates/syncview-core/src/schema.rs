#![forbid(unsafe_code)]

//! Declarative field schemas.
//!
//! A [`Schema`] is defined once from an ordered list of [`FieldSpec`]s and is
//! immutable afterwards. Declared order is significant: batched updates
//! notify in this order.
//!
//! # Invariants
//!
//! 1. Field names are unique within a schema.
//! 2. Every default value is accepted by its field's declared type (and
//!    pattern, when one is set).
//! 3. Cloning a `Schema` is cheap and shares the same definition.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use regex::Regex;

use crate::error::{Result, SyncError};
use crate::value::{FieldType, Value};

/// Which side of the connection may write a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Mutability {
    /// Only the server (inbound patches) may write. Views render from it.
    #[default]
    ServerOnly,
    /// Written by the client (event bridges). A pure output: views never
    /// react to it.
    ClientWritable,
    /// Either side may write; views react to server-originated changes.
    Bidirectional,
}

impl Mutability {
    /// Whether client-originated writes are permitted.
    #[must_use]
    pub const fn client_may_write(self) -> bool {
        !matches!(self, Self::ServerOnly)
    }

    /// Whether views bound to the model should be told about changes.
    #[must_use]
    pub const fn drives_views(self) -> bool {
        !matches!(self, Self::ClientWritable)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ServerOnly => "server-writable-only",
            Self::ClientWritable => "client-writable",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration of a single model field.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    ty: FieldType,
    default: Value,
    mutability: Mutability,
    pattern: Option<Regex>,
}

impl FieldSpec {
    /// Declare a server-only field with the given type and default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: default.into(),
            mutability: Mutability::ServerOnly,
            pattern: None,
        }
    }

    #[must_use]
    pub fn mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    /// Shorthand for `mutability(Mutability::ClientWritable)`.
    #[must_use]
    pub fn client_writable(self) -> Self {
        self.mutability(Mutability::ClientWritable)
    }

    /// Shorthand for `mutability(Mutability::Bidirectional)`.
    #[must_use]
    pub fn bidirectional(self) -> Self {
        self.mutability(Mutability::Bidirectional)
    }

    /// Constrain string values to those matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSchema`] when `pattern` does not compile.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|err| SyncError::schema(format!("field `{}`: {err}", self.name)))?;
        self.pattern = Some(re);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    #[must_use]
    pub fn access(&self) -> Mutability {
        self.mutability
    }

    /// Check a candidate value against the declared type and pattern.
    ///
    /// # Errors
    ///
    /// [`SyncError::TypeMismatch`] or [`SyncError::PatternMismatch`].
    pub fn validate(&self, value: &Value) -> Result<()> {
        if !self.ty.accepts(value) {
            return Err(SyncError::TypeMismatch {
                field: self.name.clone(),
                expected: self.ty.to_string(),
                found: value.kind(),
            });
        }
        if let (Some(re), Value::Str(s)) = (&self.pattern, value)
            && !re.is_match(s)
        {
            return Err(SyncError::PatternMismatch {
                field: self.name.clone(),
                pattern: re.as_str().to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SchemaInner {
    fields: Vec<FieldSpec>,
    index: AHashMap<String, usize>,
}

/// Immutable, ordered set of field declarations.
#[derive(Clone, Debug)]
pub struct Schema {
    inner: Rc<SchemaInner>,
}

impl Schema {
    /// Register the field set. Called once per model type.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidSchema`] for duplicate names or defaults rejected
    /// by their own declaration.
    pub fn define(fields: impl IntoIterator<Item = FieldSpec>) -> Result<Self> {
        let fields: Vec<FieldSpec> = fields.into_iter().collect();
        let mut index = AHashMap::with_capacity(fields.len());
        for (i, spec) in fields.iter().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(SyncError::schema(format!(
                    "duplicate field `{}`",
                    spec.name
                )));
            }
            spec.validate(&spec.default).map_err(|err| {
                SyncError::schema(format!("default for `{}` is invalid: {err}", spec.name))
            })?;
        }
        Ok(Self {
            inner: Rc::new(SchemaInner { fields, index }),
        })
    }

    /// Position of `name` in declared order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.inner.index.get(name).copied()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.position(name).map(|i| &self.inner.fields[i])
    }

    #[must_use]
    pub fn field_at(&self, index: usize) -> Option<&FieldSpec> {
        self.inner.fields.get(index)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.inner.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location_like() -> Schema {
        Schema::define([
            FieldSpec::new("href", FieldType::Str, "").client_writable(),
            FieldSpec::new("search", FieldType::Str, "")
                .bidirectional()
                .pattern(r"^$|^\?")
                .unwrap(),
            FieldSpec::new("refresh", FieldType::Bool, false),
        ])
        .unwrap()
    }

    #[test]
    fn declared_order_is_preserved() {
        let schema = location_like();
        let names: Vec<_> = schema.fields().map(FieldSpec::name).collect();
        assert_eq!(names, ["href", "search", "refresh"]);
        assert_eq!(schema.position("refresh"), Some(2));
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn default_mutability_is_server_only() {
        let schema = location_like();
        assert_eq!(
            schema.field("refresh").map(FieldSpec::access),
            Some(Mutability::ServerOnly)
        );
        assert!(!Mutability::ServerOnly.client_may_write());
        assert!(!Mutability::ClientWritable.drives_views());
        assert!(Mutability::Bidirectional.drives_views());
    }

    #[test]
    fn duplicate_fields_rejected() {
        let err = Schema::define([
            FieldSpec::new("a", FieldType::Int, 0i64),
            FieldSpec::new("a", FieldType::Int, 1i64),
        ])
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidSchema { .. }));
    }

    #[test]
    fn invalid_default_rejected() {
        let err = Schema::define([FieldSpec::new("a", FieldType::Int, "zero")]).unwrap_err();
        assert!(err.to_string().contains("default for `a`"));
    }

    #[test]
    fn pattern_validation() {
        let schema = location_like();
        let search = schema.field("search").unwrap();
        assert!(search.validate(&Value::from("?color=blue")).is_ok());
        assert!(search.validate(&Value::from("")).is_ok());
        assert!(matches!(
            search.validate(&Value::from("color=blue")),
            Err(SyncError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn bad_pattern_is_schema_error() {
        let err = FieldSpec::new("x", FieldType::Str, "").pattern("(").unwrap_err();
        assert!(matches!(err, SyncError::InvalidSchema { .. }));
    }
}
