#![forbid(unsafe_code)]

//! Snapshot/patch adapter for third-party widgets.
//!
//! [`ExternalWidgetAdapter`] remembers the last snapshot it pushed and a
//! monotonically increasing [`SnapshotVersion`]. Patches name the version they
//! were computed against; a patch whose base has been superseded is dropped.
//!
//! [`WidgetManagerView`] hosts a widget built asynchronously by an external
//! widget manager from the model's `bundle` field.
//!
//! # Invariants
//!
//! 1. `push_snapshot` always increments the version, even for an identical
//!    snapshot.
//! 2. A patch is applied only when its base equals the current version.
//! 3. A widget-manager view reports `Attached` only after construction
//!    completes, and never touches the view after detach.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use syncview_core::{Change, FieldSpec, FieldType, Result, Schema, SyncError, Value};
use syncview_runtime::{RenderContext, RenderOutcome, UpdateAction, View};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, ExternalWidget};

/// Version of the snapshot last pushed to an external widget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotVersion(pub u64);

/// What happened to a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// Computed against a superseded snapshot.
    DroppedStale,
    /// The widget cannot update partially; push a snapshot instead.
    RequiresSnapshot,
}

/// Snapshot/patch bookkeeping around one external widget.
pub struct ExternalWidgetAdapter<W: ExternalWidget + ?Sized> {
    widget: Rc<W>,
    version: SnapshotVersion,
    snapshot: Option<Value>,
}

impl<W: ExternalWidget + ?Sized> fmt::Debug for ExternalWidgetAdapter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalWidgetAdapter")
            .field("version", &self.version)
            .field("has_snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<W: ExternalWidget + ?Sized> ExternalWidgetAdapter<W> {
    #[must_use]
    pub fn new(widget: Rc<W>) -> Self {
        Self {
            widget,
            version: SnapshotVersion::default(),
            snapshot: None,
        }
    }

    #[must_use]
    pub fn widget(&self) -> &Rc<W> {
        &self.widget
    }

    #[must_use]
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// The last snapshot pushed, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&Value> {
        self.snapshot.as_ref()
    }

    /// Fully re-initialize the widget.
    ///
    /// # Errors
    ///
    /// Whatever the widget reports; the version is not bumped on failure.
    pub fn push_snapshot(&mut self, state: Value) -> Result<SnapshotVersion> {
        self.widget.push_snapshot(&state)?;
        self.version = SnapshotVersion(self.version.0 + 1);
        self.snapshot = Some(state);
        debug!(version = self.version.0, "snapshot pushed");
        Ok(self.version)
    }

    /// Check that `base` is still the current snapshot.
    ///
    /// # Errors
    ///
    /// [`SyncError::StaleSnapshot`].
    pub fn check_base(&self, base: SnapshotVersion) -> Result<()> {
        if base == self.version {
            Ok(())
        } else {
            Err(SyncError::StaleSnapshot {
                base: base.0,
                current: self.version.0,
            })
        }
    }

    /// Apply `delta` to item `index` if `base` is current.
    ///
    /// # Errors
    ///
    /// Whatever the widget reports for an applicable patch.
    pub fn push_patch(
        &mut self,
        base: SnapshotVersion,
        index: usize,
        delta: &Value,
    ) -> Result<PatchOutcome> {
        if let Err(err) = self.check_base(base) {
            debug!(index, error = %err, "dropping stale patch");
            return Ok(PatchOutcome::DroppedStale);
        }
        if !self.widget.supports_partial_update() {
            return Ok(PatchOutcome::RequiresSnapshot);
        }
        self.widget.push_patch(index, delta)?;
        Ok(PatchOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Widget-manager view
// ---------------------------------------------------------------------------

/// Schema of a model rendered through an external widget manager.
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn widget_manager_schema() -> Result<Schema> {
    Schema::define([
        FieldSpec::new("bundle", FieldType::Map, Value::empty_map()),
        FieldSpec::new("state", FieldType::Any, Value::Null),
    ])
}

type Slot = Rc<RefCell<Option<ExternalWidgetAdapter<dyn ExternalWidget>>>>;

/// View whose widget is constructed asynchronously by a [`WidgetManager`].
///
/// [`WidgetManager`]: crate::capability::WidgetManager
pub struct WidgetManagerView {
    caps: CapabilityProvider,
    slot: Slot,
}

impl WidgetManagerView {
    #[must_use]
    pub fn new(caps: CapabilityProvider) -> Self {
        Self {
            caps,
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Snapshot version of the constructed widget, if any.
    #[must_use]
    pub fn version(&self) -> Option<SnapshotVersion> {
        self.slot.borrow().as_ref().map(ExternalWidgetAdapter::version)
    }
}

impl View for WidgetManagerView {
    fn name(&self) -> &'static str {
        "widget-manager"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        let manager = self.caps.widget_manager()?;
        self.slot.borrow_mut().take();

        let bundle = cx.model().get("bundle")?;
        let state = cx.model().get("state")?;
        let liveness = cx.liveness();
        let ready = cx.ready_signal();
        let slot = Rc::clone(&self.slot);

        manager.create_view(
            &bundle,
            Box::new(move |result| {
                if !liveness.is_alive() || !ready.is_current() {
                    debug!("widget constructed for a superseded render; discarded");
                    return;
                }
                match result {
                    Ok(widget) => {
                        let mut adapter = ExternalWidgetAdapter::new(widget);
                        if !state.is_null()
                            && let Err(err) = adapter.push_snapshot(state)
                        {
                            warn!(error = %err, "initial widget state rejected");
                        }
                        *slot.borrow_mut() = Some(adapter);
                        ready.complete();
                    }
                    Err(err) => warn!(error = %err, "widget manager failed to construct view"),
                }
            }),
        );
        Ok(RenderOutcome::Pending)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        _cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        match change.field.as_str() {
            "bundle" => Ok(UpdateAction::Rebuild),
            "state" => {
                let mut slot = self.slot.borrow_mut();
                match slot.as_mut() {
                    Some(adapter) => {
                        adapter.push_snapshot(change.new.clone())?;
                        Ok(UpdateAction::Patched)
                    }
                    None => Ok(UpdateAction::Ignored),
                }
            }
            _ => Ok(UpdateAction::Ignored),
        }
    }

    fn dispose(&mut self) {
        self.slot.borrow_mut().take();
    }
}
