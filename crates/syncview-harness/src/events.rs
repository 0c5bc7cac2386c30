#![forbid(unsafe_code)]

//! In-memory event source.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use syncview_core::Value;
use syncview_runtime::{EventSource, Handler, ListenerId, NativeEvent};
use tracing::trace;

/// Event source whose events are fired by the test.
#[derive(Default)]
pub struct FakeEventSource {
    next: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, String, Handler)>>,
}

impl FakeEventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `event` with `payload`. Returns the number of handlers run.
    ///
    /// Handlers are collected before any runs, so a handler may add or
    /// remove listeners.
    pub fn emit(&self, event: &str, payload: impl Into<Value>) -> usize {
        let native = NativeEvent::new(event, payload);
        let handlers: Vec<Handler> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect();
        trace!(event, handlers = handlers.len(), "fake event");
        for handler in &handlers {
            handler(&native);
        }
        handlers.len()
    }

    /// Fire `event` with a `Null` payload.
    pub fn fire(&self, event: &str) -> usize {
        self.emit(event, Value::Null)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[must_use]
    pub fn listeners_for(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event)
            .count()
    }
}

impl EventSource for FakeEventSource {
    fn add_listener(&self, event: &str, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next.get());
        self.next.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((id, event.to_owned(), handler));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(other, _, _)| *other != id);
    }
}
