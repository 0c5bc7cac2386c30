#![forbid(unsafe_code)]

//! Remote document synchronization.
//!
//! [`DocumentSync`] is the boundary between local models and the remote
//! document. Inbound patches are applied with [`Origin::RemoteSync`];
//! committed [`Origin::LocalUi`] changes are handed to the emit callback as
//! outbound [`Patch`]es. Because the origin travels with every change, an
//! inbound patch is never echoed back.
//!
//! # Invariants
//!
//! 1. Outbound patches are emitted in commit order.
//! 2. While held, outbound patches are queued; `unhold` flushes them in order.
//! 3. `apply_patches` resolves every target model before writing anything.

pub mod wire;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use syncview_core::{Change, ModelId, Origin, PropertyModel, Result, Subscription, SyncError, Value};
use tracing::{debug, trace};

use crate::config::SyncConfig;

pub use wire::{WireMessage, decode, encode};

/// A single field write exchanged with the remote document.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub model: ModelId,
    pub field: String,
    pub value: Value,
}

impl Patch {
    #[must_use]
    pub fn new(
        model: impl Into<ModelId>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

impl From<&Change> for Patch {
    fn from(change: &Change) -> Self {
        Self {
            model: change.model.clone(),
            field: change.field.clone(),
            value: change.new.clone(),
        }
    }
}

type EmitFn = dyn Fn(&Patch);

struct Registered {
    model: PropertyModel,
    _outbound: Subscription,
}

struct SyncInner {
    models: AHashMap<ModelId, Registered>,
    emit: Option<Rc<EmitFn>>,
    held: bool,
    queue: Vec<Patch>,
    config: SyncConfig,
}

/// Registry of synchronized models for one document.
#[derive(Clone)]
pub struct DocumentSync {
    inner: Rc<RefCell<SyncInner>>,
}

impl Default for DocumentSync {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DocumentSync")
            .field("models", &inner.models.len())
            .field("held", &inner.held)
            .field("queued", &inner.queue.len())
            .finish()
    }
}

impl DocumentSync {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SyncInner {
                models: AHashMap::new(),
                emit: None,
                held: false,
                queue: Vec::new(),
                config,
            })),
        }
    }

    #[must_use]
    pub fn config(&self) -> SyncConfig {
        self.inner.borrow().config.clone()
    }

    /// Install the outbound callback, replacing any previous one.
    pub fn on_emit(&self, emit: impl Fn(&Patch) + 'static) {
        self.inner.borrow_mut().emit = Some(Rc::new(emit));
    }

    /// Start synchronizing `model`. Returns `true` if a model with the same
    /// id was replaced.
    pub fn register(&self, model: &PropertyModel) -> bool {
        let suppress = self.inner.borrow().config.suppress_equal_writes;
        model.set_suppress_equal_writes(suppress);

        let weak: Weak<RefCell<SyncInner>> = Rc::downgrade(&self.inner);
        let outbound = model.subscribe_all(move |change| {
            if change.origin != Origin::LocalUi {
                trace!(model = %change.model, field = %change.field, "inbound change not echoed");
                return Ok(());
            }
            if let Some(inner) = weak.upgrade() {
                forward(&inner, Patch::from(change));
            }
            Ok(())
        });

        let replaced = self
            .inner
            .borrow_mut()
            .models
            .insert(
                model.id().clone(),
                Registered {
                    model: model.clone(),
                    _outbound: outbound,
                },
            )
            .is_some();
        debug!(model = %model.id(), replaced, "model registered");
        replaced
    }

    /// Stop synchronizing `id`. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &ModelId) -> bool {
        let removed = self.inner.borrow_mut().models.remove(id);
        // Dropped outside the borrow: releasing the subscription touches the bus.
        let found = removed.is_some();
        drop(removed);
        if found {
            debug!(model = %id, "model unregistered");
        }
        found
    }

    #[must_use]
    pub fn model(&self, id: &ModelId) -> Option<PropertyModel> {
        self.inner.borrow().models.get(id).map(|r| r.model.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().models.is_empty()
    }

    /// Apply one inbound patch.
    ///
    /// # Errors
    ///
    /// `UnknownModel`, or any error from [`PropertyModel::set`].
    pub fn apply_patch(&self, patch: &Patch) -> Result<bool> {
        let model = self.resolve(&patch.model)?;
        model.set(&patch.field, patch.value.clone(), Origin::RemoteSync)
    }

    /// Apply a batch of inbound patches, one `update` per model in order of
    /// first appearance. Returns the number of fields that changed.
    ///
    /// # Errors
    ///
    /// `UnknownModel` before anything is written, otherwise the first error
    /// from a per-model update.
    pub fn apply_patches(&self, patches: &[Patch]) -> Result<usize> {
        let mut groups: Vec<(PropertyModel, Vec<(&str, Value)>)> = Vec::new();
        for patch in patches {
            match groups.iter_mut().find(|(m, _)| m.id() == &patch.model) {
                Some((_, entries)) => entries.push((patch.field.as_str(), patch.value.clone())),
                None => {
                    let model = self.resolve(&patch.model)?;
                    groups.push((model, vec![(patch.field.as_str(), patch.value.clone())]));
                }
            }
        }

        let mut changed = 0;
        let mut first_err = None;
        for (model, entries) in groups {
            match model.update(entries, Origin::RemoteSync) {
                Ok(n) => changed += n,
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(changed),
        }
    }

    /// Queue outbound patches until [`unhold`](Self::unhold).
    pub fn hold(&self) {
        self.inner.borrow_mut().held = true;
    }

    /// Release the hold and flush queued patches in order. Returns how many
    /// were flushed.
    pub fn unhold(&self) -> usize {
        let (queued, emit) = {
            let mut inner = self.inner.borrow_mut();
            inner.held = false;
            (std::mem::take(&mut inner.queue), inner.emit.clone())
        };
        let count = queued.len();
        if let Some(emit) = emit {
            for patch in &queued {
                emit(patch);
            }
        }
        debug!(count, "outbound queue flushed");
        count
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.borrow().held
    }

    /// Encode patches with this document's wire options.
    ///
    /// # Errors
    ///
    /// `Decode` if serialization fails.
    pub fn encode(&self, patches: &[Patch]) -> Result<WireMessage> {
        let wire = self.inner.borrow().config.wire.clone();
        encode(patches, &wire)
    }

    /// Decode a message and apply it as one batch.
    ///
    /// # Errors
    ///
    /// Decoding errors, or any error from [`apply_patches`](Self::apply_patches).
    pub fn receive(&self, message: &WireMessage) -> Result<usize> {
        let patches = decode(message)?;
        self.apply_patches(&patches)
    }

    fn resolve(&self, id: &ModelId) -> Result<PropertyModel> {
        self.model(id).ok_or_else(|| SyncError::UnknownModel {
            model: id.to_string(),
        })
    }
}

fn forward(inner: &Rc<RefCell<SyncInner>>, patch: Patch) {
    let emit = {
        let mut inner = inner.borrow_mut();
        if inner.held {
            inner.queue.push(patch);
            return;
        }
        inner.emit.clone()
    };
    if let Some(emit) = emit {
        emit(&patch);
    }
}
