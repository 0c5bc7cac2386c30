#![forbid(unsafe_code)]

//! Interactive plot view.
//!
//! The model carries compact trace descriptors (`data`), a `layout` and a
//! `config`. Large numeric arrays live in per-trace column-source models and
//! are stitched in before each push (see [`columns`]). User interaction with
//! the plot is mirrored into the `*_data` output fields after filtering.
//!
//! # Update Strategy
//!
//! | Change | Action |
//! |--------|--------|
//! | trace count differs | rebuild |
//! | traces differ (ignoring `uid`) | patch each changed trace |
//! | a column source changes | patch that trace |
//! | `layout` | relayout |
//! | `config` | rebuild |
//!
//! A library without partial-update support gets a full snapshot instead.
//!
//! # Event Filtering
//!
//! Interaction payloads are reduced to primitives and lists of primitives.
//! Nested objects are dropped unless their key is whitelisted, and point
//! lists are filtered shallowly per element. Both key sets come from
//! [`PlotEventConfig`].

pub mod columns;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use syncview_core::{Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, Value};
use syncview_runtime::{
    ListenerTable, PlotEventConfig, ReentrancyGuard, RenderContext, RenderOutcome, UpdateAction,
    View,
};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, PlotInstance};
use crate::external::{ExternalWidgetAdapter, PatchOutcome};

/// Plot event name, output field, and whether the event clears the field.
const EVENT_FIELDS: [(&str, &str, bool); 8] = [
    ("click", "click_data", false),
    ("hover", "hover_data", false),
    ("unhover", "hover_data", true),
    ("selected", "selected_data", false),
    ("deselect", "selected_data", true),
    ("relayout", "relayout_data", false),
    ("restyle", "restyle_data", false),
    ("clickannotation", "clickannotation_data", false),
];

/// Schema of a plot model.
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn plot_schema() -> Result<Schema> {
    let mut fields = vec![
        FieldSpec::new("data", FieldType::list_of(FieldType::Map), Value::List(Vec::new())),
        FieldSpec::new("layout", FieldType::Map, Value::empty_map()),
        FieldSpec::new("config", FieldType::Map, Value::empty_map()),
    ];
    let mut outputs: Vec<&str> = EVENT_FIELDS.iter().map(|(_, field, _)| *field).collect();
    outputs.dedup();
    fields.extend(
        outputs
            .into_iter()
            .map(|name| FieldSpec::new(name, FieldType::Any, Value::Null).client_writable()),
    );
    Schema::define(fields)
}

// ---------------------------------------------------------------------------
// Event filtering
// ---------------------------------------------------------------------------

fn is_flat(value: &Value) -> bool {
    value.is_primitive()
        || value
            .as_list()
            .is_some_and(|items| items.iter().all(Value::is_primitive))
}

fn shallow(map: &BTreeMap<String, Value>) -> Value {
    Value::Map(
        map.iter()
            .filter(|(_, v)| is_flat(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// Reduce a plot interaction payload to what is worth syncing.
#[must_use]
pub fn filter_event_data(payload: &Value, config: &PlotEventConfig) -> Value {
    let Some(map) = payload.as_map() else {
        return if is_flat(payload) { payload.clone() } else { Value::Null };
    };
    let mut out = BTreeMap::new();
    for (key, value) in map {
        if is_flat(value) || config.is_whitelisted(key) {
            out.insert(key.clone(), value.clone());
        } else if config.is_point_list(key)
            && let Some(points) = value.as_list()
        {
            let filtered = points
                .iter()
                .filter_map(|point| match point {
                    Value::Map(fields) => Some(shallow(fields)),
                    other if other.is_primitive() => Some(other.clone()),
                    _ => None,
                })
                .collect();
            out.insert(key.clone(), Value::List(filtered));
        }
    }
    Value::Map(out)
}

// ---------------------------------------------------------------------------
// Snapshot assembly
// ---------------------------------------------------------------------------

type Sources = Rc<Vec<Option<PropertyModel>>>;
type Slot = Rc<RefCell<Option<ExternalWidgetAdapter<dyn PlotInstance>>>>;
type WeakSlot = Weak<RefCell<Option<ExternalWidgetAdapter<dyn PlotInstance>>>>;

fn without_uid(trace: &Value) -> Value {
    match trace {
        Value::Map(map) => Value::Map(
            map.iter()
                .filter(|(k, _)| k.as_str() != "uid")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn stitched_trace(trace: &Value, source: Option<&PropertyModel>) -> Result<Value> {
    match source {
        Some(source) => columns::stitch(trace, &source.get("data")?, &source.get("shapes")?),
        None => Ok(trace.clone()),
    }
}

fn build_snapshot(model: &PropertyModel, sources: &[Option<PropertyModel>]) -> Result<Value> {
    let data = model.get("data")?;
    let traces = data
        .as_list()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, trace)| stitched_trace(trace, sources.get(i).and_then(Option::as_ref)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::map([
        ("data", Value::List(traces)),
        ("layout", model.get("layout")?),
        ("config", model.get("config")?),
    ]))
}

/// Push trace `index` as a patch, or a full snapshot if the library needs one.
fn push_trace(
    adapter: &mut ExternalWidgetAdapter<dyn PlotInstance>,
    model: &PropertyModel,
    sources: &[Option<PropertyModel>],
    index: usize,
    trace: &Value,
) -> Result<PatchOutcome> {
    let stitched = stitched_trace(trace, sources.get(index).and_then(Option::as_ref))?;
    let base = adapter.version();
    let outcome = adapter.push_patch(base, index, &stitched)?;
    if outcome == PatchOutcome::RequiresSnapshot {
        adapter.push_snapshot(build_snapshot(model, sources)?)?;
    }
    Ok(outcome)
}

fn on_source_changed(
    slot: &WeakSlot,
    model: &PropertyModel,
    sources: &Sources,
    index: usize,
) -> Result<()> {
    let Some(slot) = slot.upgrade() else {
        return Ok(());
    };
    let trace = model.with("data", |data| {
        data.as_list().and_then(|traces| traces.get(index)).cloned()
    })?;
    let Some(trace) = trace else {
        debug!(index, "column source has no trace");
        return Ok(());
    };
    let mut slot = slot.borrow_mut();
    if let Some(adapter) = slot.as_mut() {
        push_trace(adapter, model, sources, index, &trace)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// View binding a plot model to a plotting library.
pub struct PlotView {
    caps: CapabilityProvider,
    sources: Sources,
    events: PlotEventConfig,
    guard: ReentrancyGuard,
    slot: Slot,
}

impl PlotView {
    #[must_use]
    pub fn new(caps: CapabilityProvider, events: PlotEventConfig) -> Self {
        Self {
            caps,
            sources: Rc::new(Vec::new()),
            events,
            guard: ReentrancyGuard::new(),
            slot: Rc::new(RefCell::new(None)),
        }
    }

    /// Column sources, index-aligned with the model's traces.
    #[must_use]
    pub fn with_sources(
        mut self,
        sources: impl IntoIterator<Item = Option<PropertyModel>>,
    ) -> Self {
        self.sources = Rc::new(sources.into_iter().collect());
        self
    }

    /// Snapshot version currently shown, if the plot exists.
    #[must_use]
    pub fn version(&self) -> Option<crate::external::SnapshotVersion> {
        self.slot.borrow().as_ref().map(ExternalWidgetAdapter::version)
    }
}

impl View for PlotView {
    fn name(&self) -> &'static str {
        "plot"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.slot.borrow_mut().take();
        let plot = self.caps.plot_library()?.create_plot()?;
        let mut adapter = ExternalWidgetAdapter::new(Rc::clone(&plot));
        adapter.push_snapshot(build_snapshot(cx.model(), &self.sources)?)?;
        *self.slot.borrow_mut() = Some(adapter);

        for (index, source) in self.sources.iter().enumerate() {
            let Some(source) = source else { continue };
            let slot = Rc::downgrade(&self.slot);
            let model = cx.model().clone();
            let sources = Rc::clone(&self.sources);
            cx.scope().subscribe_all(source, move |_| {
                on_source_changed(&slot, &model, &sources, index)
            });
        }

        let source = plot.events();
        let mut table = ListenerTable::new();
        for (event, field, clears) in EVENT_FIELDS {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            let config = self.events.clone();
            table.on(&source, event, move |native| {
                let value = if clears {
                    Value::Null
                } else {
                    filter_event_data(&native.payload, &config)
                };
                guard.run(|| {
                    if let Err(err) = model.set(field, value, Origin::LocalUi) {
                        warn!(model = %model.id(), field, error = %err, "plot event write failed");
                    }
                });
            });
        }
        cx.scope().listen(table);
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        let mut slot = self.slot.borrow_mut();
        let Some(adapter) = slot.as_mut() else {
            return Ok(UpdateAction::Ignored);
        };
        match change.field.as_str() {
            "data" => {
                let old = change.old.as_list().unwrap_or_default();
                let new = change.new.as_list().unwrap_or_default();
                if old.len() != new.len() {
                    return Ok(UpdateAction::Rebuild);
                }
                for (index, (before, after)) in old.iter().zip(new).enumerate() {
                    if without_uid(before) == without_uid(after) {
                        continue;
                    }
                    let outcome = push_trace(adapter, cx.model(), &self.sources, index, after)?;
                    if outcome == PatchOutcome::RequiresSnapshot {
                        break;
                    }
                }
                Ok(UpdateAction::Patched)
            }
            "layout" => {
                adapter.widget().relayout(&change.new)?;
                Ok(UpdateAction::Patched)
            }
            "config" => Ok(UpdateAction::Rebuild),
            _ => Ok(UpdateAction::Ignored),
        }
    }

    fn dispose(&mut self) {
        self.slot.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> PlotEventConfig {
        PlotEventConfig::default()
    }

    #[test]
    fn relayout_keeps_primitives_and_drops_objects() {
        let payload = Value::map([
            ("xaxis.range[0]", Value::from(0.5)),
            ("fullLayout", Value::map([("width", Value::Int(400))])),
        ]);
        assert_eq!(
            filter_event_data(&payload, &config()),
            Value::map([("xaxis.range[0]", Value::from(0.5))])
        );
    }

    #[test]
    fn whitelisted_objects_survive() {
        let range = Value::map([("x", Value::list([0.0, 1.0]))]);
        let payload = Value::map([
            ("range", range.clone()),
            ("lassoPoints", Value::map([("x", Value::list([1i64]))])),
            ("event", Value::map([("shiftKey", Value::Bool(true))])),
        ]);
        let out = filter_event_data(&payload, &config());
        assert_eq!(out.get("range"), Some(&range));
        assert!(out.get("lassoPoints").is_some());
        assert!(out.get("event").is_none());
    }

    #[test]
    fn points_are_filtered_shallowly() {
        let point = Value::map([
            ("x", Value::Int(1)),
            ("y", Value::Int(2)),
            ("customdata", Value::list(["a"])),
            ("data", Value::map([("type", Value::from("scatter"))])),
        ]);
        let payload = Value::map([("points", Value::list([point]))]);
        assert_eq!(
            filter_event_data(&payload, &config()),
            Value::map([(
                "points",
                Value::list([Value::map([
                    ("customdata", Value::list(["a"])),
                    ("x", Value::Int(1)),
                    ("y", Value::Int(2)),
                ])])
            )])
        );
    }

    #[test]
    fn custom_whitelist_is_honored() {
        let config = PlotEventConfig {
            whitelist: vec!["bbox".to_owned()],
            point_list_keys: Vec::new(),
        };
        let payload = Value::map([
            ("bbox", Value::map([("x0", Value::Int(1))])),
            ("range", Value::map([("x", Value::list([0i64]))])),
        ]);
        let out = filter_event_data(&payload, &config);
        assert!(out.get("bbox").is_some());
        assert!(out.get("range").is_none());
    }

    #[test]
    fn uid_is_ignored_for_comparison() {
        let a = Value::map([("uid", Value::from("1")), ("x", Value::Int(1))]);
        let b = Value::map([("uid", Value::from("2")), ("x", Value::Int(1))]);
        assert_eq!(without_uid(&a), without_uid(&b));
    }

    #[test]
    fn schema_declares_outputs_as_client_writable() {
        let schema = plot_schema().unwrap();
        assert_eq!(schema.len(), 9);
        assert!(
            schema
                .field("hover_data")
                .is_some_and(|f| f.access().client_may_write())
        );
        assert!(!schema.field("data").is_some_and(|f| f.access().client_may_write()));
    }
}
