//! ViewHost routing, containment and teardown.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use syncview_core::{
    Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, SyncError, Value,
};
use syncview_runtime::{
    ReadySignal, RenderContext, RenderOutcome, UpdateAction, View, ViewHost, ViewState,
};

fn model() -> PropertyModel {
    let schema = Schema::define([
        FieldSpec::new("label", FieldType::Str, "").bidirectional(),
        FieldSpec::new("width", FieldType::Int, 100i64),
        FieldSpec::new("clicks", FieldType::Int, 0i64).client_writable(),
    ])
    .unwrap();
    PropertyModel::new("w", schema)
}

#[derive(Default)]
struct Journal {
    renders: Cell<u32>,
    seen: RefCell<Vec<(String, Value)>>,
    disposed: Cell<bool>,
}

struct Probe {
    journal: Rc<Journal>,
    fail_render: Rc<Cell<bool>>,
    pending: bool,
    signal: Rc<RefCell<Option<ReadySignal>>>,
}

impl Probe {
    fn new(journal: &Rc<Journal>) -> Self {
        Self {
            journal: Rc::clone(journal),
            fail_render: Rc::new(Cell::new(false)),
            pending: false,
            signal: Rc::new(RefCell::new(None)),
        }
    }
}

impl View for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.journal.renders.set(self.journal.renders.get() + 1);
        cx.scope().on_teardown(|| {});
        if self.fail_render.get() {
            return Err(SyncError::MissingCapability {
                capability: "plotting",
            });
        }
        if self.pending {
            *self.signal.borrow_mut() = Some(cx.ready_signal());
            return Ok(RenderOutcome::Pending);
        }
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        self.journal
            .seen
            .borrow_mut()
            .push((change.field.clone(), change.new.clone()));
        match change.field.as_str() {
            "width" => Ok(UpdateAction::Rebuild),
            "label" if change.new == Value::from("echo") => {
                // A write made by the view itself is queued, not nested.
                cx.model().set("label", "echoed", Origin::LocalUi)?;
                Ok(UpdateAction::Patched)
            }
            "label" if change.new == Value::from("bad") => Err(SyncError::schema("cannot show")),
            _ => Ok(UpdateAction::Patched),
        }
    }

    fn dispose(&mut self) {
        self.journal.disposed.set(true);
    }
}

#[test]
fn render_attaches_and_routes_changes() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    assert_eq!(host.state(), ViewState::Unattached);

    // Not attached yet: nothing is delivered.
    model.set("label", "early", Origin::RemoteSync).unwrap();
    assert!(journal.seen.borrow().is_empty());

    assert_eq!(host.render().unwrap(), ViewState::Attached);
    assert!(host.is_finished());
    model.set("label", "hi", Origin::RemoteSync).unwrap();
    assert_eq!(
        *journal.seen.borrow(),
        vec![("label".to_owned(), Value::from("hi"))]
    );
    assert_eq!(host.state(), ViewState::Attached);
}

#[test]
fn client_writable_fields_are_not_routed() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    host.render().unwrap();
    model.set("clicks", 3i64, Origin::LocalUi).unwrap();
    assert!(journal.seen.borrow().is_empty());
}

#[test]
fn rebuild_re_renders() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    host.render().unwrap();
    let generation = host.generation();
    model.set("width", 200i64, Origin::RemoteSync).unwrap();
    assert_eq!(journal.renders.get(), 2);
    assert_eq!(host.generation(), generation + 1);
    assert_eq!(host.state(), ViewState::Attached);
}

#[test]
fn self_write_is_queued_and_delivered_after() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    host.render().unwrap();
    model.set("label", "echo", Origin::RemoteSync).unwrap();
    assert_eq!(
        *journal.seen.borrow(),
        vec![
            ("label".to_owned(), Value::from("echo")),
            ("label".to_owned(), Value::from("echoed")),
        ]
    );
    assert_eq!(model.get("label").unwrap(), Value::from("echoed"));
}

#[tracing_test::traced_test]
#[test]
fn update_errors_are_contained() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    host.render().unwrap();
    assert!(model.set("label", "bad", Origin::RemoteSync).is_ok());
    assert_eq!(host.state(), ViewState::Attached);
    assert!(matches!(
        host.last_error(),
        Some(SyncError::InvalidSchema { .. })
    ));
    assert!(logs_contain("view update failed"));
}

#[tracing_test::traced_test]
#[test]
fn failed_render_is_contained_and_retryable() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let probe = Probe::new(&journal);
    let fail = Rc::clone(&probe.fail_render);
    fail.set(true);
    let host = ViewHost::new(&model, probe);

    assert_eq!(host.render().unwrap(), ViewState::Unattached);
    assert_eq!(host.held_resources(), 0);
    assert!(host.last_error().is_some_and(|e| e.is_retryable()));
    assert!(logs_contain("render failed"));

    fail.set(false);
    assert_eq!(host.render().unwrap(), ViewState::Attached);
    assert_eq!(host.held_resources(), 1);
    assert!(host.last_error().is_none());
}

#[test]
fn pending_render_waits_for_signal() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let mut probe = Probe::new(&journal);
    probe.pending = true;
    let signal = Rc::clone(&probe.signal);
    let host = ViewHost::new(&model, probe);

    assert_eq!(host.render().unwrap(), ViewState::Rendering);
    assert!(!host.is_finished());
    let ready = signal.borrow_mut().take().unwrap();
    assert!(ready.complete());
    assert!(host.is_finished());
}

#[test]
fn detach_releases_everything_and_is_terminal() {
    let model = model();
    let journal = Rc::new(Journal::default());
    let host = ViewHost::new(&model, Probe::new(&journal));
    host.render().unwrap();
    let liveness = host.liveness();

    assert!(host.detach());
    assert!(!host.detach());
    assert!(journal.disposed.get());
    assert!(!liveness.is_alive());
    assert_eq!(host.held_resources(), 0);
    assert_eq!(model.bus().subscriber_count(syncview_core::Topic::All), 0);

    model.set("label", "late", Origin::RemoteSync).unwrap();
    assert!(journal.seen.borrow().is_empty());
    assert!(matches!(
        host.render(),
        Err(SyncError::InvalidTransition { from: "Detached", .. })
    ));
}

#[test]
fn dropping_host_detaches() {
    let model = model();
    let journal = Rc::new(Journal::default());
    {
        let host = ViewHost::new(&model, Probe::new(&journal));
        host.render().unwrap();
    }
    assert!(journal.disposed.get());
    assert_eq!(model.bus().subscriber_count(syncview_core::Topic::All), 0);
}
