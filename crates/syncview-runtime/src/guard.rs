#![forbid(unsafe_code)]

//! Re-entrancy guard for event bridges.
//!
//! A bridge enters the guard while it writes fields in response to a native
//! event. Any change notification that reaches the same bridge while the
//! guard is held was caused by that write and must not be forwarded back to
//! the native side.

use std::cell::Cell;
use std::rc::Rc;

/// Shared "currently syncing" flag.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct ReentrancyGuard {
    active: Rc<Cell<bool>>,
}

impl ReentrancyGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guard. Returns `None` if it is already held.
    #[must_use = "the guard is released when the token drops"]
    pub fn enter(&self) -> Option<GuardToken> {
        if self.active.get() {
            return None;
        }
        self.active.set(true);
        Some(GuardToken {
            active: Rc::clone(&self.active),
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Run `f` with the guard held, or skip it when already inside.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _token = self.enter()?;
        Some(f())
    }
}

/// Releases the guard on drop.
#[derive(Debug)]
pub struct GuardToken {
    active: Rc<Cell<bool>>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.active.set(false);
    }
}
