#![forbid(unsafe_code)]

//! Per-render resource scope.
//!
//! A [`BindingScope`] collects everything a view acquires while rendering:
//! change-bus subscriptions, native listener tables and arbitrary teardown
//! hooks. Clearing or dropping the scope releases them.
//!
//! # Invariants
//!
//! 1. Resources are released in reverse registration order.
//! 2. After `clear()` or drop, no callback registered through this scope
//!    fires.
//! 3. `clear()` leaves the scope empty and reusable for the next render.

use std::fmt;

use syncview_core::{Change, PropertyModel, Result, Subscription};

use crate::listener::ListenerTable;

enum Held {
    Subscription(Subscription),
    Listeners(ListenerTable),
    Teardown(Box<dyn FnOnce()>),
}

impl Held {
    fn release(self) {
        match self {
            Self::Subscription(mut sub) => sub.unsubscribe(),
            Self::Listeners(mut table) => table.teardown(),
            Self::Teardown(f) => f(),
        }
    }
}

/// Collects subscriptions and listeners for one view.
#[derive(Default)]
pub struct BindingScope {
    held: Vec<Held>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.held.push(Held::Subscription(sub));
    }

    /// Keep a listener table attached until the scope is cleared.
    pub fn listen(&mut self, table: ListenerTable) {
        self.held.push(Held::Listeners(table));
    }

    /// Run `f` when the scope is cleared.
    pub fn on_teardown(&mut self, f: impl FnOnce() + 'static) {
        self.held.push(Held::Teardown(Box::new(f)));
    }

    /// Subscribe to one field of `model` within this scope.
    ///
    /// # Errors
    ///
    /// `UnknownField` when `field` is not declared.
    pub fn subscribe(
        &mut self,
        model: &PropertyModel,
        field: &str,
        callback: impl Fn(&Change) -> Result<()> + 'static,
    ) -> Result<&mut Self> {
        let sub = model.subscribe(field, callback)?;
        self.hold(sub);
        Ok(self)
    }

    /// Subscribe to every field of `model` within this scope.
    pub fn subscribe_all(
        &mut self,
        model: &PropertyModel,
        callback: impl Fn(&Change) -> Result<()> + 'static,
    ) -> &mut Self {
        let sub = model.subscribe_all(callback);
        self.hold(sub);
        self
    }

    /// Number of held resources.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything immediately, newest first.
    pub fn clear(&mut self) {
        while let Some(item) = self.held.pop() {
            item.release();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.held.len())
            .finish()
    }
}
