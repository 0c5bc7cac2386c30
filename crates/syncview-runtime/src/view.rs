#![forbid(unsafe_code)]

//! Views and the host that drives them.
//!
//! A [`View`] is a small trait: render into native resources, react to field
//! changes, dispose. The [`ViewHost`] owns the view and its
//! [`ViewLifecycle`], routes model changes to it and contains its faults.
//!
//! # Routing
//!
//! The host subscribes to every field of its model. A change is routed to
//! the view when:
//!
//! - the field drives views (not `ClientWritable`), and
//! - the view is `Rendering` or `Attached`.
//!
//! A change that arrives while the view is already executing (for example a
//! write the view itself made) is queued and delivered after the current call
//! returns. Order is preserved.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `render` returns `Err` | logged, state back to `Unattached`, scope released, retryable |
//! | `on_field_changed` returns `Err` | logged, view stays `Attached` |
//! | render of a detached view | `InvalidTransition` |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use syncview_core::{Change, PropertyModel, Result, SyncError, Subscription};
use tracing::{debug, debug_span, warn};
use web_time::Instant;

use crate::lifecycle::{Liveness, ReadySignal, ViewLifecycle, ViewState};
use crate::scope::BindingScope;

/// Result of a render call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The view painted synchronously.
    Ready,
    /// Painting completes later through the context's [`ReadySignal`].
    Pending,
}

/// How a view handled a field change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateAction {
    /// Patched in place.
    Patched,
    /// Nothing to do for this field.
    Ignored,
    /// Tear down and render again.
    Rebuild,
}

/// Everything a view may touch while rendering or updating.
pub struct RenderContext<'a> {
    model: &'a PropertyModel,
    scope: &'a mut BindingScope,
    liveness: Liveness,
    ready: ReadySignal,
}

impl<'a> RenderContext<'a> {
    #[must_use]
    pub fn new(
        model: &'a PropertyModel,
        scope: &'a mut BindingScope,
        liveness: Liveness,
        ready: ReadySignal,
    ) -> Self {
        Self {
            model,
            scope,
            liveness,
            ready,
        }
    }

    #[must_use]
    pub fn model(&self) -> &PropertyModel {
        self.model
    }

    /// Resources registered here are released on re-render and detach.
    pub fn scope(&mut self) -> &mut BindingScope {
        self.scope
    }

    /// Token for async completions. Cloned so it can move into callbacks.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Completion handle for the current render.
    #[must_use]
    pub fn ready_signal(&self) -> ReadySignal {
        self.ready.clone()
    }
}

/// A model-backed view.
pub trait View {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Allocate native resources and paint. Must be idempotent: the host
    /// clears the previous scope before calling it again.
    ///
    /// # Errors
    ///
    /// Any error is contained by the host and leaves the view `Unattached`.
    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome>;

    /// React to a server-driven field change.
    ///
    /// # Errors
    ///
    /// Errors are logged by the host; the view stays attached.
    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        let _ = (change, cx);
        Ok(UpdateAction::Ignored)
    }

    /// Release anything not held by the scope.
    fn dispose(&mut self) {}
}

struct HostShared<V> {
    view: RefCell<V>,
    name: &'static str,
    model: PropertyModel,
    lifecycle: Rc<RefCell<ViewLifecycle>>,
    liveness: Liveness,
    scope: RefCell<BindingScope>,
    routing: RefCell<Option<Subscription>>,
    pending: RefCell<VecDeque<Change>>,
    last_error: RefCell<Option<SyncError>>,
}

/// Owns a [`View`] and drives its lifecycle.
pub struct ViewHost<V: View + 'static> {
    shared: Rc<HostShared<V>>,
}

impl<V: View + 'static> ViewHost<V> {
    /// Wrap `view` for `model`. The view is `Unattached` until
    /// [`render`](Self::render).
    pub fn new(model: &PropertyModel, view: V) -> Self {
        let shared = Rc::new(HostShared {
            name: view.name(),
            view: RefCell::new(view),
            model: model.clone(),
            lifecycle: Rc::new(RefCell::new(ViewLifecycle::new())),
            liveness: Liveness::new(),
            scope: RefCell::new(BindingScope::new()),
            routing: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            last_error: RefCell::new(None),
        });
        let weak: Weak<HostShared<V>> = Rc::downgrade(&shared);
        let sub = model.subscribe_all(move |change| {
            if let Some(shared) = weak.upgrade() {
                route(&shared, change);
            }
            Ok(())
        });
        *shared.routing.borrow_mut() = Some(sub);
        Self { shared }
    }

    #[must_use]
    pub fn state(&self) -> ViewState {
        self.shared.lifecycle.borrow().state()
    }

    /// Whether the view has painted and is not detached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.lifecycle.borrow().is_finished()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.lifecycle.borrow().generation()
    }

    #[must_use]
    pub fn model(&self) -> &PropertyModel {
        &self.shared.model
    }

    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.shared.liveness.clone()
    }

    /// The most recent contained render or update error.
    #[must_use]
    pub fn last_error(&self) -> Option<SyncError> {
        self.shared.last_error.borrow().clone()
    }

    /// Number of resources the current render holds.
    #[must_use]
    pub fn held_resources(&self) -> usize {
        self.shared.scope.borrow().binding_count()
    }

    /// Borrow the view. Returns `None` while the view is executing.
    pub fn with_view<R>(&self, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shared.view.try_borrow().ok().map(|v| f(&v))
    }

    /// Render (or re-render) the view.
    ///
    /// View errors are contained: the returned state is `Unattached` and
    /// [`last_error`](Self::last_error) holds the cause.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the view is detached or currently executing.
    pub fn render(&self) -> Result<ViewState> {
        render(&self.shared)
    }

    /// Tear the view down. Idempotent; returns `false` if already detached.
    pub fn detach(&self) -> bool {
        let shared = &self.shared;
        if !shared.lifecycle.borrow_mut().detach() {
            return false;
        }
        shared.liveness.kill();
        if let Some(mut sub) = shared.routing.borrow_mut().take() {
            sub.unsubscribe();
        }
        shared.pending.borrow_mut().clear();
        // Take the scope out before clearing: teardown hooks may re-enter.
        let mut scope = std::mem::take(&mut *shared.scope.borrow_mut());
        scope.clear();
        match shared.view.try_borrow_mut() {
            Ok(mut view) => view.dispose(),
            Err(_) => warn!(view = shared.name, "detached while executing; dispose skipped"),
        }
        debug!(view = shared.name, "view detached");
        true
    }
}

impl<V: View + 'static> Drop for ViewHost<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<V: View + 'static> fmt::Debug for ViewHost<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHost")
            .field("view", &self.shared.name)
            .field("model", self.shared.model.id())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn render<V: View + 'static>(shared: &Rc<HostShared<V>>) -> Result<ViewState> {
    let _span = debug_span!("render", view = shared.name, model = %shared.model.id()).entered();

    let Ok(mut view) = shared.view.try_borrow_mut() else {
        let state = shared.lifecycle.borrow().state();
        return Err(SyncError::InvalidTransition {
            from: state.name(),
            to: ViewState::Rendering.name(),
        });
    };
    let generation = shared.lifecycle.borrow_mut().begin_render()?;

    let mut scope = std::mem::take(&mut *shared.scope.borrow_mut());
    scope.clear();

    let started = Instant::now();
    let ready = ReadySignal::new(&shared.lifecycle, generation);
    let outcome = {
        let mut cx = RenderContext::new(
            &shared.model,
            &mut scope,
            shared.liveness.clone(),
            ready.clone(),
        );
        view.render(&mut cx)
    };
    drop(view);

    match outcome {
        Ok(RenderOutcome::Ready) => {
            ready.complete();
            store_scope(shared, scope);
            shared.last_error.borrow_mut().take();
            debug!(
                generation,
                elapsed_us = started.elapsed().as_micros() as u64,
                "render complete"
            );
        }
        Ok(RenderOutcome::Pending) => {
            store_scope(shared, scope);
            shared.last_error.borrow_mut().take();
            debug!(generation, "render pending");
        }
        Err(err) => {
            warn!(view = shared.name, error = %err, "render failed");
            scope.clear();
            shared.lifecycle.borrow_mut().fail_render();
            shared.pending.borrow_mut().clear();
            *shared.last_error.borrow_mut() = Some(err);
            return Ok(shared.lifecycle.borrow().state());
        }
    }

    drain(shared);
    Ok(shared.lifecycle.borrow().state())
}

fn route<V: View + 'static>(shared: &Rc<HostShared<V>>, change: &Change) {
    let drives = shared
        .model
        .access(&change.field)
        .is_some_and(|m| m.drives_views());
    if !drives {
        return;
    }
    let state = shared.lifecycle.borrow().state();
    if !matches!(
        state,
        ViewState::Rendering | ViewState::Attached | ViewState::Updating
    ) {
        return;
    }
    shared.pending.borrow_mut().push_back(change.clone());
    if shared.view.try_borrow_mut().is_err() {
        // Delivered by whoever is executing the view.
        return;
    }
    drain(shared);
}

fn drain<V: View + 'static>(shared: &Rc<HostShared<V>>) {
    loop {
        if !shared.liveness.is_alive() {
            shared.pending.borrow_mut().clear();
            return;
        }
        if shared.view.try_borrow_mut().is_err() {
            return;
        }
        let Some(change) = shared.pending.borrow_mut().pop_front() else {
            return;
        };
        if deliver(shared, &change) == Some(UpdateAction::Rebuild) {
            debug!(view = shared.name, field = %change.field, "rebuild requested");
            if let Err(err) = render(shared) {
                warn!(view = shared.name, error = %err, "rebuild failed");
            }
        }
    }
}

fn deliver<V: View + 'static>(shared: &Rc<HostShared<V>>, change: &Change) -> Option<UpdateAction> {
    let Ok(mut view) = shared.view.try_borrow_mut() else {
        shared.pending.borrow_mut().push_front(change.clone());
        return None;
    };
    let updating = shared.lifecycle.borrow_mut().begin_update().is_ok();
    let generation = shared.lifecycle.borrow().generation();
    let ready = ReadySignal::new(&shared.lifecycle, generation);

    let mut scope = std::mem::take(&mut *shared.scope.borrow_mut());
    let result = {
        let mut cx = RenderContext::new(&shared.model, &mut scope, shared.liveness.clone(), ready);
        view.on_field_changed(change, &mut cx)
    };
    drop(view);
    store_scope(shared, scope);
    if updating {
        shared.lifecycle.borrow_mut().end_update();
    }

    match result {
        Ok(action) => Some(action),
        Err(err) => {
            warn!(view = shared.name, field = %change.field, error = %err, "view update failed");
            *shared.last_error.borrow_mut() = Some(err);
            None
        }
    }
}

/// Put a scope back after a view call, unless the view was detached meanwhile.
fn store_scope<V: View + 'static>(shared: &Rc<HostShared<V>>, mut scope: BindingScope) {
    if shared.liveness.is_alive() {
        *shared.scope.borrow_mut() = scope;
    } else {
        scope.clear();
    }
}
