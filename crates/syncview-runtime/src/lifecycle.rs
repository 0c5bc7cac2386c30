#![forbid(unsafe_code)]

//! View lifecycle state machine.
//!
//! ```text
//! Unattached ──render──▶ Rendering ──ready──▶ Attached ◀──▶ Updating
//!      ▲                    │  ▲                 │
//!      └──── render error ──┘  └──── rebuild ────┘
//!
//! Rendering | Attached | Updating ──detach──▶ Detached (terminal)
//! ```
//!
//! Every render bumps a generation counter. A [`ReadySignal`] carries the
//! generation it was issued for, so a completion that arrives after a newer
//! render started (or after detach) is ignored.
//!
//! # Invariants
//!
//! 1. `Detached` is terminal; every transition out of it fails with
//!    `InvalidTransition`.
//! 2. `is_finished()` is true only in `Attached` and `Updating`.
//! 3. A ready signal completes at most once and only for the current
//!    generation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use syncview_core::{Result, SyncError};
use tracing::debug;

/// Lifecycle state of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ViewState {
    #[default]
    Unattached,
    Rendering,
    Attached,
    Updating,
    Detached,
}

impl ViewState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unattached => "Unattached",
            Self::Rendering => "Rendering",
            Self::Attached => "Attached",
            Self::Updating => "Updating",
            Self::Detached => "Detached",
        }
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State plus render generation for one view.
#[derive(Debug, Default)]
pub struct ViewLifecycle {
    state: ViewState,
    generation: u64,
}

impl ViewLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ViewState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ViewState::Attached | ViewState::Updating)
    }

    fn transition(&mut self, to: ViewState) {
        debug!(from = %self.state, to = %to, generation = self.generation, "view transition");
        self.state = to;
    }

    fn invalid(&self, to: ViewState) -> SyncError {
        SyncError::InvalidTransition {
            from: self.state.name(),
            to: to.name(),
        }
    }

    /// Enter `Rendering` for a fresh generation.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from `Detached` or `Updating`.
    pub fn begin_render(&mut self) -> Result<u64> {
        match self.state {
            ViewState::Unattached | ViewState::Rendering | ViewState::Attached => {
                self.generation += 1;
                self.transition(ViewState::Rendering);
                Ok(self.generation)
            }
            ViewState::Updating | ViewState::Detached => Err(self.invalid(ViewState::Rendering)),
        }
    }

    /// Complete render `generation`. Returns `false` for a stale or
    /// out-of-state completion.
    pub fn mark_ready(&mut self, generation: u64) -> bool {
        if self.state != ViewState::Rendering || generation != self.generation {
            debug!(
                state = %self.state,
                generation,
                current = self.generation,
                "ignoring stale ready signal"
            );
            return false;
        }
        self.transition(ViewState::Attached);
        true
    }

    /// A render failed; the view may be rendered again.
    pub fn fail_render(&mut self) {
        if self.state == ViewState::Rendering {
            self.transition(ViewState::Unattached);
        }
    }

    /// Enter `Updating` from `Attached`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from any other state.
    pub fn begin_update(&mut self) -> Result<()> {
        if self.state != ViewState::Attached {
            return Err(self.invalid(ViewState::Updating));
        }
        self.state = ViewState::Updating;
        Ok(())
    }

    /// Leave `Updating`. No-op in any other state.
    pub fn end_update(&mut self) {
        if self.state == ViewState::Updating {
            self.state = ViewState::Attached;
        }
    }

    /// Enter the terminal state. Returns `false` when already detached.
    pub fn detach(&mut self) -> bool {
        if self.state == ViewState::Detached {
            return false;
        }
        self.transition(ViewState::Detached);
        true
    }
}

// ---------------------------------------------------------------------------
// ReadySignal
// ---------------------------------------------------------------------------

/// Completion handle for an asynchronous render.
///
/// Views that return `RenderOutcome::Pending` keep a clone and call
/// [`complete`](Self::complete) once their external handshake finishes.
#[derive(Clone)]
pub struct ReadySignal {
    lifecycle: Weak<RefCell<ViewLifecycle>>,
    generation: u64,
}

impl ReadySignal {
    #[must_use]
    pub fn new(lifecycle: &Rc<RefCell<ViewLifecycle>>, generation: u64) -> Self {
        Self {
            lifecycle: Rc::downgrade(lifecycle),
            generation,
        }
    }

    /// A signal that is never current. Useful for contexts without a render.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            lifecycle: Weak::new(),
            generation: 0,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether completing now would attach the view.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.lifecycle.upgrade().is_some_and(|lc| {
            let lc = lc.borrow();
            lc.state() == ViewState::Rendering && lc.generation() == self.generation
        })
    }

    /// Move the view to `Attached` if this signal is still current.
    pub fn complete(&self) -> bool {
        match self.lifecycle.upgrade() {
            Some(lc) => lc.borrow_mut().mark_ready(self.generation),
            None => false,
        }
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("generation", &self.generation)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Token checked by asynchronous completions before touching a view.
///
/// Clones share the same flag. Killed once, on detach.
#[derive(Clone, Debug)]
pub struct Liveness {
    alive: Rc<Cell<bool>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn kill(&self) {
        self.alive.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut lc = ViewLifecycle::new();
        assert_eq!(lc.state(), ViewState::Unattached);
        let generation = lc.begin_render().unwrap();
        assert!(!lc.is_finished());
        assert!(lc.mark_ready(generation));
        assert!(lc.is_finished());
        lc.begin_update().unwrap();
        assert_eq!(lc.state(), ViewState::Updating);
        lc.end_update();
        assert_eq!(lc.state(), ViewState::Attached);
        assert!(lc.detach());
        assert!(!lc.detach());
    }

    #[test]
    fn detached_is_terminal() {
        let mut lc = ViewLifecycle::new();
        lc.detach();
        let err = lc.begin_render().unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidTransition {
                from: "Detached",
                to: "Rendering"
            }
        );
        assert!(lc.begin_update().is_err());
    }

    #[test]
    fn failed_render_is_retryable() {
        let mut lc = ViewLifecycle::new();
        lc.begin_render().unwrap();
        lc.fail_render();
        assert_eq!(lc.state(), ViewState::Unattached);
        let generation = lc.begin_render().unwrap();
        assert_eq!(generation, 2);
    }

    #[test]
    fn stale_signal_is_ignored() {
        let lc = Rc::new(RefCell::new(ViewLifecycle::new()));
        let first = lc.borrow_mut().begin_render().unwrap();
        let stale = ReadySignal::new(&lc, first);
        let second = lc.borrow_mut().begin_render().unwrap();
        let fresh = ReadySignal::new(&lc, second);

        assert!(!stale.is_current());
        assert!(!stale.complete());
        assert_eq!(lc.borrow().state(), ViewState::Rendering);

        assert!(fresh.complete());
        assert!(!fresh.complete());
        assert_eq!(lc.borrow().state(), ViewState::Attached);
    }

    #[test]
    fn signal_after_detach_is_ignored() {
        let lc = Rc::new(RefCell::new(ViewLifecycle::new()));
        let generation = lc.borrow_mut().begin_render().unwrap();
        let signal = ReadySignal::new(&lc, generation);
        lc.borrow_mut().detach();
        assert!(!signal.complete());
        drop(lc);
        assert!(!signal.complete());
        assert!(!ReadySignal::detached().is_current());
    }

    #[test]
    fn liveness_is_shared() {
        let live = Liveness::new();
        let other = live.clone();
        live.kill();
        assert!(!other.is_alive());
    }
}
