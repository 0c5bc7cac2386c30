#![forbid(unsafe_code)]

//! Per-field change notification.
//!
//! A [`ChangeBus`] belongs to exactly one [`PropertyModel`](crate::PropertyModel).
//! Views and the document sync subscribe to it; they never own it.
//!
//! # Architecture
//!
//! The bus stores subscribers as `Weak` callbacks. The strong reference lives
//! in the [`Subscription`] handle returned to the subscriber, so dropping the
//! handle (or calling [`Subscription::unsubscribe`]) is enough to stop
//! delivery. Dead entries are pruned lazily at the start of each round.
//!
//! Callbacks are upgraded one at a time, immediately before they are
//! invoked, so a subscription released by an earlier callback in the same
//! round is never called.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A failing callback does not prevent its siblings from running; the first
//!    failure is returned as [`SyncError::SubscriberFault`] after the round.
//! 3. Unsubscribing is idempotent.
//! 4. The bus holds no `RefCell` borrow while a callback runs, so callbacks may
//!    subscribe, unsubscribe or write to the model.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::model::ModelId;
use crate::value::Value;

/// Where a mutation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Native UI input observed by an event bridge.
    LocalUi,
    /// An inbound patch applied by the document sync.
    RemoteSync,
}

/// A committed field change.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub model: ModelId,
    pub field: String,
    /// Declared position of the field in its schema.
    pub index: usize,
    pub old: Value,
    pub new: Value,
    pub origin: Origin,
}

/// What a subscription listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One field, by declared position.
    Field(usize),
    /// Every field of the model.
    All,
}

impl Topic {
    fn matches(self, index: usize) -> bool {
        match self {
            Self::Field(i) => i == index,
            Self::All => true,
        }
    }
}

/// Subscriber callback. Returning `Err` marks the subscriber as faulted for
/// this round only.
pub type Callback = dyn Fn(&Change) -> Result<()>;

/// Identifier of a subscription, unique per bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    topic: Topic,
    callback: Weak<Callback>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Publish/subscribe channel for one model's fields.
#[derive(Clone, Default)]
pub struct ChangeBus {
    inner: Rc<RefCell<BusInner>>,
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ChangeBus")
            .field("subscribers", &inner.entries.len())
            .finish()
    }
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`.
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(&Change) -> Result<()> + 'static,
    ) -> Subscription {
        let callback: Rc<Callback> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(Entry {
            id,
            topic,
            callback: Rc::downgrade(&callback),
        });
        Subscription {
            id,
            callback: Some(callback),
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Release `subscription`. Calling this twice is a no-op.
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.unsubscribe();
    }

    /// Number of live subscribers that would receive a change on `topic`.
    ///
    /// For `Topic::All` this counts only all-field subscribers.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|e| e.topic == topic && e.callback.strong_count() > 0)
            .count()
    }

    /// Deliver `change` to every matching subscriber.
    ///
    /// # Errors
    ///
    /// The first callback failure, wrapped as [`SyncError::SubscriberFault`],
    /// after all callbacks have run.
    pub fn notify(&self, change: &Change) -> Result<()> {
        let targets: SmallVec<[Weak<Callback>; 8]> = {
            let mut inner = self.inner.borrow_mut();
            inner.entries.retain(|e| e.callback.strong_count() > 0);
            inner
                .entries
                .iter()
                .filter(|e| e.topic.matches(change.index))
                .map(|e| Weak::clone(&e.callback))
                .collect()
        };

        let mut first_fault = None;
        for weak in targets {
            let Some(callback) = weak.upgrade() else {
                continue;
            };
            if let Err(err) = callback(change) {
                warn!(
                    model = %change.model,
                    field = %change.field,
                    error = %err,
                    "change subscriber failed"
                );
                first_fault.get_or_insert(SyncError::SubscriberFault {
                    field: change.field.clone(),
                    message: err.to_string(),
                });
            }
        }
        first_fault.map_or(Ok(()), Err)
    }
}

/// Handle owning a bus callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    callback: Option<Rc<Callback>>,
    bus: Weak<RefCell<BusInner>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    /// Stop delivery. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.callback.take().is_none() {
            return;
        }
        if let Some(bus) = self.bus.upgrade()
            && let Ok(mut inner) = bus.try_borrow_mut()
        {
            inner.entries.retain(|e| e.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn change(index: usize) -> Change {
        Change {
            model: ModelId::new("m"),
            field: format!("f{index}"),
            index,
            old: Value::Int(0),
            new: Value::Int(1),
            origin: Origin::RemoteSync,
        }
    }

    #[test]
    fn notifies_in_registration_order() {
        let bus = ChangeBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|n| {
                let log = Rc::clone(&log);
                bus.subscribe(Topic::Field(0), move |_| {
                    log.borrow_mut().push(n);
                    Ok(())
                })
            })
            .collect();
        bus.notify(&change(0)).unwrap();
        assert_eq!(*log.borrow(), [0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn topic_filters_fields() {
        let bus = ChangeBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _field = bus.subscribe(Topic::Field(1), move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        let h = Rc::clone(&hits);
        let _all = bus.subscribe(Topic::All, move |_| {
            h.set(h.get() + 10);
            Ok(())
        });
        bus.notify(&change(0)).unwrap();
        assert_eq!(hits.get(), 10);
        bus.notify(&change(1)).unwrap();
        assert_eq!(hits.get(), 21);
    }

    #[test]
    fn failing_subscriber_does_not_stop_siblings() {
        let bus = ChangeBus::new();
        let ran = Rc::new(Cell::new(false));
        let _bad = bus.subscribe(Topic::All, |c| {
            Err(SyncError::schema(format!("boom on {}", c.field)))
        });
        let r = Rc::clone(&ran);
        let _good = bus.subscribe(Topic::All, move |_| {
            r.set(true);
            Ok(())
        });
        let err = bus.notify(&change(2)).unwrap_err();
        assert!(ran.get());
        match err {
            SyncError::SubscriberFault { field, message } => {
                assert_eq!(field, "f2");
                assert!(message.contains("boom on f2"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn first_fault_is_reported() {
        let bus = ChangeBus::new();
        let _a = bus.subscribe(Topic::All, |_| Err(SyncError::schema("first")));
        let _b = bus.subscribe(Topic::All, |_| Err(SyncError::schema("second")));
        let err = bus.notify(&change(0)).unwrap_err();
        assert!(err.to_string().contains("first"));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = ChangeBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let mut sub = bus.subscribe(Topic::All, move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        assert_eq!(bus.subscriber_count(Topic::All), 1);
        bus.unsubscribe(&mut sub);
        bus.unsubscribe(&mut sub);
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(Topic::All), 0);
        bus.notify(&change(0)).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn drop_releases_subscription() {
        let bus = ChangeBus::new();
        let hits = Rc::new(Cell::new(0));
        {
            let h = Rc::clone(&hits);
            let _sub = bus.subscribe(Topic::All, move |_| {
                h.set(h.get() + 1);
                Ok(())
            });
            bus.notify(&change(0)).unwrap();
        }
        bus.notify(&change(0)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unsubscribed_mid_round_is_not_called() {
        let bus = ChangeBus::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let called = Rc::new(Cell::new(false));

        let v = Rc::clone(&victim);
        let _killer = bus.subscribe(Topic::All, move |_| {
            if let Some(mut sub) = v.borrow_mut().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let c = Rc::clone(&called);
        *victim.borrow_mut() = Some(bus.subscribe(Topic::All, move |_| {
            c.set(true);
            Ok(())
        }));

        bus.notify(&change(0)).unwrap();
        assert!(!called.get(), "released subscriber must not be called");
    }

    #[test]
    fn callbacks_may_subscribe_during_notify() {
        let bus = ChangeBus::new();
        let extra: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
        let b = bus.clone();
        let e = Rc::clone(&extra);
        let _sub = bus.subscribe(Topic::All, move |_| {
            e.borrow_mut().push(b.subscribe(Topic::All, |_| Ok(())));
            Ok(())
        });
        bus.notify(&change(0)).unwrap();
        assert_eq!(extra.borrow().len(), 1);
        assert_eq!(bus.subscriber_count(Topic::All), 2);
    }
}
