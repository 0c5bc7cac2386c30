#![forbid(unsafe_code)]

//! Recording plot library and widget manager.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use syncview_core::{Result, SyncError, Value};
use syncview_runtime::EventSource;
use syncview_widgets::{ExternalWidget, PlotInstance, PlotLibrary, WidgetCallback, WidgetManager};

use crate::events::FakeEventSource;

/// Everything pushed to one external widget.
#[derive(Default)]
pub struct RecordingWidget {
    partial: bool,
    snapshots: RefCell<Vec<Value>>,
    patches: RefCell<Vec<(usize, Value)>>,
    relayouts: RefCell<Vec<Value>>,
    events: Rc<FakeEventSource>,
}

impl RecordingWidget {
    #[must_use]
    pub fn new(partial: bool) -> Self {
        Self {
            partial,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<Value> {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn last_snapshot(&self) -> Option<Value> {
        self.snapshots.borrow().last().cloned()
    }

    #[must_use]
    pub fn patches(&self) -> Vec<(usize, Value)> {
        self.patches.borrow().clone()
    }

    #[must_use]
    pub fn relayouts(&self) -> Vec<Value> {
        self.relayouts.borrow().clone()
    }

    /// The plot's event source, for firing interaction events.
    #[must_use]
    pub fn source(&self) -> &FakeEventSource {
        &self.events
    }
}

impl ExternalWidget for RecordingWidget {
    fn push_snapshot(&self, snapshot: &Value) -> Result<()> {
        self.snapshots.borrow_mut().push(snapshot.clone());
        Ok(())
    }

    fn push_patch(&self, index: usize, delta: &Value) -> Result<()> {
        self.patches.borrow_mut().push((index, delta.clone()));
        Ok(())
    }

    fn supports_partial_update(&self) -> bool {
        self.partial
    }
}

impl PlotInstance for RecordingWidget {
    fn relayout(&self, layout: &Value) -> Result<()> {
        self.relayouts.borrow_mut().push(layout.clone());
        Ok(())
    }

    fn events(&self) -> Rc<dyn EventSource> {
        self.events.clone()
    }
}

/// Plot library that records every plot it creates.
#[derive(Default)]
pub struct RecordingPlotLibrary {
    partial: bool,
    fail: Cell<bool>,
    created: RefCell<Vec<Rc<RecordingWidget>>>,
}

impl RecordingPlotLibrary {
    /// A library with partial-update support.
    #[must_use]
    pub fn new() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    /// A library that can only take full snapshots.
    #[must_use]
    pub fn snapshot_only() -> Self {
        Self::default()
    }

    /// Make the next `create_plot` calls fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.created.borrow().len()
    }

    /// The most recently created plot.
    #[must_use]
    pub fn latest(&self) -> Option<Rc<RecordingWidget>> {
        self.created.borrow().last().cloned()
    }
}

impl PlotLibrary for RecordingPlotLibrary {
    fn create_plot(&self) -> Result<Rc<dyn PlotInstance>> {
        if self.fail.get() {
            return Err(SyncError::capability("plotting", "library not loaded"));
        }
        let plot = Rc::new(RecordingWidget::new(self.partial));
        self.created.borrow_mut().push(Rc::clone(&plot));
        let plot: Rc<dyn PlotInstance> = plot;
        Ok(plot)
    }
}

/// Widget manager whose constructions complete when the test says so.
#[derive(Default)]
pub struct DeferredWidgetManager {
    parked: RefCell<Vec<(Value, WidgetCallback)>>,
    built: RefCell<Vec<Rc<RecordingWidget>>>,
}

impl DeferredWidgetManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.parked.borrow().len()
    }

    /// Number of widgets constructed so far.
    #[must_use]
    pub fn built(&self) -> usize {
        self.built.borrow().len()
    }

    /// Bundles of constructions still in flight, oldest first.
    #[must_use]
    pub fn pending_bundles(&self) -> Vec<Value> {
        self.parked.borrow().iter().map(|(b, _)| b.clone()).collect()
    }

    /// Complete the oldest construction successfully.
    pub fn complete_next(&self) -> Option<Rc<RecordingWidget>> {
        let next = {
            let mut parked = self.parked.borrow_mut();
            (!parked.is_empty()).then(|| parked.remove(0))
        };
        let (_, done) = next?;
        let widget = Rc::new(RecordingWidget::new(true));
        self.built.borrow_mut().push(Rc::clone(&widget));
        let shared: Rc<dyn ExternalWidget> = widget.clone();
        done(Ok(shared));
        Some(widget)
    }

    /// Fail the oldest construction.
    pub fn fail_next(&self, message: &str) -> bool {
        let next = {
            let mut parked = self.parked.borrow_mut();
            (!parked.is_empty()).then(|| parked.remove(0))
        };
        match next {
            Some((_, done)) => {
                done(Err(SyncError::capability("widget-manager", message)));
                true
            }
            None => false,
        }
    }
}

impl WidgetManager for DeferredWidgetManager {
    fn create_view(&self, bundle: &Value, done: WidgetCallback) {
        self.parked.borrow_mut().push((bundle.clone(), done));
    }
}
