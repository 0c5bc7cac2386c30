#![forbid(unsafe_code)]

//! Native event sources and explicit listener tables.
//!
//! Every view registers its native listeners through a [`ListenerTable`]
//! built during render. The table records each `(source, id)` pair so that
//! teardown removes exactly what was added, in reverse order.
//!
//! # Invariants
//!
//! 1. After [`ListenerTable::teardown`] (or drop) no handler registered
//!    through the table is attached to its source.
//! 2. Teardown is idempotent.

use std::fmt;
use std::rc::Rc;

use syncview_core::Value;

/// A native event delivered by an [`EventSource`].
#[derive(Clone, Debug, PartialEq)]
pub struct NativeEvent {
    pub name: String,
    pub payload: Value,
}

impl NativeEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Event with a `Null` payload.
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// Identifier returned by [`EventSource::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Native event handler.
pub type Handler = Rc<dyn Fn(&NativeEvent)>;

/// Anything that emits named native events (a DOM element, a speech
/// recognizer, the history object).
pub trait EventSource {
    fn add_listener(&self, event: &str, handler: Handler) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

/// Registration table for one render pass.
#[derive(Default)]
pub struct ListenerTable {
    entries: Vec<(Rc<dyn EventSource>, ListenerId, String)>,
}

impl ListenerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` to `event` on `source`.
    pub fn on(
        &mut self,
        source: &Rc<dyn EventSource>,
        event: &str,
        handler: impl Fn(&NativeEvent) + 'static,
    ) -> ListenerId {
        let id = source.add_listener(event, Rc::new(handler));
        self.entries.push((Rc::clone(source), id, event.to_owned()));
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Event names in registration order.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, _, name)| name.as_str())
    }

    /// Remove every registered listener, newest first.
    pub fn teardown(&mut self) {
        while let Some((source, id, _)) = self.entries.pop() {
            source.remove_listener(id);
        }
    }
}

impl Drop for ListenerTable {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerTable")
            .field("events", &self.events().collect::<Vec<_>>())
            .finish()
    }
}
