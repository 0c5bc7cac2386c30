#![forbid(unsafe_code)]

//! Typed, server-synchronized property records.
//!
//! A [`PropertyModel`] is a shared handle (`Rc`) over an ordered set of field
//! values described by a [`Schema`]. Every mutation is tagged with an
//! [`Origin`]; client-originated writes to server-only fields are rejected.
//!
//! # Invariants
//!
//! 1. Every stored value is accepted by its field declaration.
//! 2. A write that changes a value notifies the model's [`ChangeBus`]
//!    synchronously, before `set`/`update` returns.
//! 3. Writing a value equal to the current one is a no-op (no version bump,
//!    no notification) unless equal-write suppression is disabled.
//! 4. [`PropertyModel::update`] validates every entry before applying any of
//!    them, applies all of them, and only then notifies, once per changed
//!    field, in declared order.
//! 5. The version increments exactly once per committed field change.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `UnknownField` | name not in schema | nothing written |
//! | `TypeMismatch` / `PatternMismatch` | bad value | nothing written |
//! | `ReadOnlyViolation` | `LocalUi` write to a server-only field | nothing written |
//! | `SubscriberFault` | a subscriber failed | value is committed, fault surfaced |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{error, trace};

use crate::bus::{Change, ChangeBus, Origin, Subscription, Topic};
use crate::error::{Result, SyncError};
use crate::schema::{FieldSpec, Mutability, Schema};
use crate::value::Value;

/// Identity of a model within a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(String);

impl ModelId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ModelId> for ModelId {
    fn from(id: &ModelId) -> Self {
        id.clone()
    }
}

struct ModelInner {
    id: ModelId,
    schema: Schema,
    values: RefCell<Vec<Value>>,
    version: Cell<u64>,
    suppress_equal_writes: Cell<bool>,
    bus: ChangeBus,
}

/// Shared handle to a typed property record.
///
/// Cloning creates another handle to the **same** record.
#[derive(Clone)]
pub struct PropertyModel {
    inner: Rc<ModelInner>,
}

impl fmt::Debug for PropertyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyModel")
            .field("id", &self.inner.id)
            .field("version", &self.inner.version.get())
            .field("values", &self.inner.values.borrow())
            .finish()
    }
}

impl PropertyModel {
    /// Instantiate a model with every field at its declared default.
    #[must_use]
    pub fn new(id: impl Into<ModelId>, schema: Schema) -> Self {
        let values = schema.fields().map(|f| f.default_value().clone()).collect();
        Self {
            inner: Rc::new(ModelInner {
                id: id.into(),
                schema,
                values: RefCell::new(values),
                version: Cell::new(0),
                suppress_equal_writes: Cell::new(true),
                bus: ChangeBus::new(),
            }),
        }
    }

    /// Instantiate a model with initial values overriding the defaults.
    ///
    /// Initial values are part of the server-sent definition and do not
    /// notify anyone.
    ///
    /// # Errors
    ///
    /// `UnknownField`, `TypeMismatch` or `PatternMismatch` for a bad entry.
    pub fn with_values<K: AsRef<str>>(
        id: impl Into<ModelId>,
        schema: Schema,
        initial: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Self> {
        let model = Self::new(id, schema);
        for (name, value) in initial {
            let (index, spec) = model.resolve(name.as_ref())?;
            spec.validate(&value)?;
            model.inner.values.borrow_mut()[index] = value;
        }
        Ok(model)
    }

    #[must_use]
    pub fn id(&self) -> &ModelId {
        &self.inner.id
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    #[must_use]
    pub fn bus(&self) -> &ChangeBus {
        &self.inner.bus
    }

    /// Number of committed field changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Toggle equal-write suppression (enabled by default).
    pub fn set_suppress_equal_writes(&self, enabled: bool) {
        self.inner.suppress_equal_writes.set(enabled);
    }

    /// Whether two handles point at the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current value of `field`.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownField`].
    pub fn get(&self, field: &str) -> Result<Value> {
        let (index, _) = self.resolve(field)?;
        Ok(self.inner.values.borrow()[index].clone())
    }

    /// Read `field` by reference without cloning.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownField`].
    pub fn with<R>(&self, field: &str, f: impl FnOnce(&Value) -> R) -> Result<R> {
        let (index, _) = self.resolve(field)?;
        let values = self.inner.values.borrow();
        Ok(f(&values[index]))
    }

    /// All fields in declared order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let values = self.inner.values.borrow();
        self.inner
            .schema
            .fields()
            .zip(values.iter())
            .map(|(spec, v)| (spec.name().to_owned(), v.clone()))
            .collect()
    }

    /// Write one field.
    ///
    /// Returns `Ok(true)` when the value changed and subscribers were
    /// notified, `Ok(false)` for a suppressed equal write.
    ///
    /// # Errors
    ///
    /// `UnknownField`, `TypeMismatch`, `PatternMismatch`, `ReadOnlyViolation`
    /// (nothing written), or `SubscriberFault` (value committed).
    pub fn set(&self, field: &str, value: impl Into<Value>, origin: Origin) -> Result<bool> {
        let value = value.into();
        let (index, spec) = self.resolve(field)?;
        self.check_write(spec, &value, origin)?;
        match self.commit(index, value, origin) {
            Some(change) => {
                self.inner.bus.notify(&change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write several fields as one batch.
    ///
    /// Later entries for the same field win. Returns the number of fields
    /// whose value changed.
    ///
    /// # Errors
    ///
    /// Validation errors abort the batch before anything is written. A
    /// `SubscriberFault` is returned after every notification has run.
    pub fn update<K: AsRef<str>>(
        &self,
        entries: impl IntoIterator<Item = (K, Value)>,
        origin: Origin,
    ) -> Result<usize> {
        let mut staged: Vec<(usize, Value)> = Vec::new();
        for (name, value) in entries {
            let (index, spec) = self.resolve(name.as_ref())?;
            self.check_write(spec, &value, origin)?;
            match staged.iter_mut().find(|(i, _)| *i == index) {
                Some(slot) => slot.1 = value,
                None => staged.push((index, value)),
            }
        }
        staged.sort_by_key(|(index, _)| *index);

        let changes: Vec<Change> = staged
            .into_iter()
            .filter_map(|(index, value)| self.commit(index, value, origin))
            .collect();

        let mut first_fault = None;
        for change in &changes {
            if let Err(err) = self.inner.bus.notify(change) {
                first_fault.get_or_insert(err);
            }
        }
        match first_fault {
            Some(err) => Err(err),
            None => Ok(changes.len()),
        }
    }

    /// Subscribe to one field.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownField`].
    pub fn subscribe(
        &self,
        field: &str,
        callback: impl Fn(&Change) -> Result<()> + 'static,
    ) -> Result<Subscription> {
        let (index, _) = self.resolve(field)?;
        Ok(self.inner.bus.subscribe(Topic::Field(index), callback))
    }

    /// Subscribe to every field.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&Change) -> Result<()> + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(Topic::All, callback)
    }

    /// Mutability of `field`, if declared.
    #[must_use]
    pub fn access(&self, field: &str) -> Option<Mutability> {
        self.inner.schema.field(field).map(FieldSpec::access)
    }

    fn resolve(&self, field: &str) -> Result<(usize, &FieldSpec)> {
        let schema = &self.inner.schema;
        schema
            .position(field)
            .and_then(|i| schema.field_at(i).map(|spec| (i, spec)))
            .ok_or_else(|| SyncError::UnknownField {
                model: self.inner.id.to_string(),
                field: field.to_owned(),
            })
    }

    fn check_write(&self, spec: &FieldSpec, value: &Value, origin: Origin) -> Result<()> {
        if origin == Origin::LocalUi && !spec.access().client_may_write() {
            error!(
                model = %self.inner.id,
                field = spec.name(),
                "client-originated write to a server-only field"
            );
            return Err(SyncError::ReadOnlyViolation {
                field: spec.name().to_owned(),
            });
        }
        spec.validate(value)
    }

    /// Store `value`; returns the change record when the value differs.
    fn commit(&self, index: usize, value: Value, origin: Origin) -> Option<Change> {
        let old = {
            let mut values = self.inner.values.borrow_mut();
            if self.inner.suppress_equal_writes.get() && values[index] == value {
                trace!(model = %self.inner.id, index, "suppressed equal write");
                return None;
            }
            std::mem::replace(&mut values[index], value.clone())
        };
        self.inner.version.set(self.inner.version.get() + 1);
        let field = self
            .inner
            .schema
            .field_at(index)
            .map(|spec| spec.name().to_owned())
            .unwrap_or_default();
        Some(Change {
            model: self.inner.id.clone(),
            field,
            index,
            old,
            new: value,
            origin,
        })
    }
}
