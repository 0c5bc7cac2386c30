#![forbid(unsafe_code)]

//! Capability bridges driven through [`ViewHost`] against the fakes.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use syncview_core::{Origin, PropertyModel, SyncError, Value};
use syncview_harness::{DEFAULT_HREF, FakeSynthesizer, Fakes};
use syncview_runtime::{DocumentSync, Patch, PlotEventConfig, ViewHost, ViewState};
use syncview_widgets::plot::columns::{column_source_schema, encode_f64_le};
use syncview_widgets::{
    CapabilityProvider, FileHandle, FileInputView, LocationView, PlotView,
    SpeechRecognitionView, TextToSpeechView, WidgetManagerView, file_input_schema,
    location_schema, plot_schema, speech_schema, tts_schema, widget_manager_schema,
};

fn trace(entries: &[(&str, Value)]) -> Value {
    Value::map(entries.iter().cloned())
}

fn plot_model(data: Vec<Value>) -> PropertyModel {
    PropertyModel::with_values("plot", plot_schema().unwrap(), [("data", Value::List(data))])
        .unwrap()
}

fn plot_host(fakes: &Fakes, model: &PropertyModel) -> ViewHost<PlotView> {
    let host = ViewHost::new(
        model,
        PlotView::new(fakes.provider(), PlotEventConfig::default()),
    );
    assert_eq!(host.render().unwrap(), ViewState::Attached);
    host
}

// ============================================================================
// Plot
// ============================================================================

#[test]
fn plot_snapshot_stitches_column_sources() {
    let fakes = Fakes::new();
    let source = PropertyModel::with_values(
        "cds",
        column_source_schema().unwrap(),
        [(
            "data",
            Value::map([("x", Value::Bytes(encode_f64_le(&[1.0, 2.0])))]),
        )],
    )
    .unwrap();
    let model = plot_model(vec![trace(&[("type", Value::from("scatter"))])]);
    let host = ViewHost::new(
        &model,
        PlotView::new(fakes.provider(), PlotEventConfig::default())
            .with_sources([Some(source.clone())]),
    );
    host.render().unwrap();

    let plot = fakes.plots.latest().unwrap();
    let expected = trace(&[
        ("type", Value::from("scatter")),
        ("x", Value::list([1.0, 2.0])),
    ]);
    assert_eq!(
        plot.last_snapshot().unwrap().get("data"),
        Some(&Value::list([expected]))
    );

    source
        .set(
            "data",
            Value::map([("x", Value::list([3.0]))]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(
        plot.patches(),
        vec![(
            0,
            trace(&[("type", Value::from("scatter")), ("x", Value::list([3.0]))])
        )]
    );
}

#[test]
fn plot_patches_only_traces_that_changed() {
    let fakes = Fakes::new();
    let model = plot_model(vec![
        trace(&[("uid", Value::from("a")), ("y", Value::list([1i64]))]),
        trace(&[("uid", Value::from("b")), ("y", Value::list([2i64]))]),
    ]);
    let _host = plot_host(&fakes, &model);
    let plot = fakes.plots.latest().unwrap();

    let changed = trace(&[("uid", Value::from("b")), ("y", Value::list([5i64]))]);
    model
        .set(
            "data",
            Value::list([
                trace(&[("uid", Value::from("regenerated")), ("y", Value::list([1i64]))]),
                changed.clone(),
            ]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(plot.patches(), vec![(1, changed)]);
    assert_eq!(plot.snapshots().len(), 1);
    assert_eq!(fakes.plots.created(), 1);
}

#[test]
fn plot_rebuilds_on_trace_count_or_config_change() {
    let fakes = Fakes::new();
    let model = plot_model(vec![trace(&[("y", Value::list([1i64]))])]);
    let host = plot_host(&fakes, &model);

    model
        .set(
            "data",
            Value::list([
                trace(&[("y", Value::list([1i64]))]),
                trace(&[("y", Value::list([2i64]))]),
            ]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(fakes.plots.created(), 2);
    assert_eq!(host.generation(), 2);

    model
        .set(
            "config",
            Value::map([("responsive", Value::Bool(true))]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(fakes.plots.created(), 3);
    assert_eq!(host.state(), ViewState::Attached);
    let snapshot = fakes.plots.latest().unwrap().last_snapshot().unwrap();
    assert_eq!(
        snapshot.get("config"),
        Some(&Value::map([("responsive", Value::Bool(true))]))
    );
}

#[test]
fn plot_layout_change_is_a_relayout() {
    let fakes = Fakes::new();
    let model = plot_model(Vec::new());
    let _host = plot_host(&fakes, &model);
    let layout = Value::map([("title", Value::from("Sales"))]);
    model.set("layout", layout.clone(), Origin::RemoteSync).unwrap();

    let plot = fakes.plots.latest().unwrap();
    assert_eq!(plot.relayouts(), vec![layout]);
    assert_eq!(fakes.plots.created(), 1);
}

#[test]
fn snapshot_only_library_gets_full_snapshots() {
    let fakes = Fakes::new().with_snapshot_only_plots();
    let model = plot_model(vec![trace(&[("y", Value::list([1i64]))])]);
    let _host = plot_host(&fakes, &model);
    model
        .set(
            "data",
            Value::list([trace(&[("y", Value::list([9i64]))])]),
            Origin::RemoteSync,
        )
        .unwrap();

    let plot = fakes.plots.latest().unwrap();
    assert!(plot.patches().is_empty());
    assert_eq!(plot.snapshots().len(), 2);
    assert_eq!(
        plot.last_snapshot().unwrap().get("data"),
        Some(&Value::list([trace(&[("y", Value::list([9i64]))])]))
    );
}

#[test]
fn hover_is_cleared_by_unhover() {
    let fakes = Fakes::new();
    let model = plot_model(Vec::new());
    let _host = plot_host(&fakes, &model);
    let plot = fakes.plots.latest().unwrap();

    plot.source().emit(
        "hover",
        Value::map([("points", Value::list([Value::map([("x", Value::Int(1))])]))]),
    );
    assert_eq!(
        model.get("hover_data").unwrap(),
        Value::map([("points", Value::list([Value::map([("x", Value::Int(1))])]))])
    );
    plot.source().fire("unhover");
    assert_eq!(model.get("hover_data").unwrap(), Value::Null);
}

#[test]
fn plot_without_library_stays_unattached() {
    let model = plot_model(Vec::new());
    let host = ViewHost::new(
        &model,
        PlotView::new(CapabilityProvider::none(), PlotEventConfig::default()),
    );
    assert_eq!(host.render().unwrap(), ViewState::Unattached);
    assert!(matches!(
        host.last_error(),
        Some(SyncError::MissingCapability { .. })
    ));
}

// ============================================================================
// Widget manager
// ============================================================================

#[test]
fn widget_manager_attaches_when_construction_completes() {
    let fakes = Fakes::new();
    let state = Value::map([("value", Value::Int(3))]);
    let model = PropertyModel::with_values(
        "w",
        widget_manager_schema().unwrap(),
        [
            ("bundle", Value::map([("spec", Value::from("slider"))])),
            ("state", state.clone()),
        ],
    )
    .unwrap();
    let host = ViewHost::new(&model, WidgetManagerView::new(fakes.provider()));
    assert_eq!(host.render().unwrap(), ViewState::Rendering);
    assert_eq!(
        fakes.widgets.pending_bundles(),
        vec![Value::map([("spec", Value::from("slider"))])]
    );

    let widget = fakes.widgets.complete_next().unwrap();
    assert_eq!(host.state(), ViewState::Attached);
    assert!(host.is_finished());
    assert_eq!(widget.snapshots(), vec![state]);

    let next = Value::map([("value", Value::Int(4))]);
    model.set("state", next.clone(), Origin::RemoteSync).unwrap();
    assert_eq!(widget.last_snapshot(), Some(next));
    assert_eq!(host.with_view(|view| view.version().map(|v| v.0)), Some(Some(2)));
}

#[test]
fn superseded_widget_construction_is_discarded() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("w", widget_manager_schema().unwrap());
    let host = ViewHost::new(&model, WidgetManagerView::new(fakes.provider()));
    host.render().unwrap();
    model
        .set(
            "bundle",
            Value::map([("spec", Value::from("v2"))]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(fakes.widgets.pending(), 2);

    fakes.widgets.complete_next().unwrap();
    assert_eq!(host.state(), ViewState::Rendering);
    fakes.widgets.complete_next().unwrap();
    assert_eq!(host.state(), ViewState::Attached);
    assert_eq!(fakes.widgets.built(), 2);
}

#[test]
fn failed_widget_construction_leaves_view_pending() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("w", widget_manager_schema().unwrap());
    let host = ViewHost::new(&model, WidgetManagerView::new(fakes.provider()));
    host.render().unwrap();
    assert!(fakes.widgets.fail_next("bundle did not load"));
    assert_eq!(host.state(), ViewState::Rendering);
    assert!(!host.is_finished());
}

// ============================================================================
// File input
// ============================================================================

#[test]
#[tracing_test::traced_test]
fn failed_read_commits_placeholder() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("files", file_input_schema().unwrap());
    let host = ViewHost::new(&model, FileInputView::new(fakes.provider()));
    host.render().unwrap();
    fakes.picker.select(&[FileHandle::new("broken.bin", "")]);
    fakes
        .reader
        .resolve("broken.bin", Err(SyncError::capability("file-reader", "EIO")));

    assert_eq!(model.get("value").unwrap(), Value::from(""));
    assert_eq!(model.get("filename").unwrap(), Value::from("broken.bin"));
    assert!(logs_contain("file read failed; using placeholder"));
}

#[test]
fn accept_change_reconfigures_picker() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("files", file_input_schema().unwrap());
    let host = ViewHost::new(&model, FileInputView::new(fakes.provider()));
    host.render().unwrap();
    model.set("accept", ".csv,.tsv", Origin::RemoteSync).unwrap();
    model.set("directory", true, Origin::RemoteSync).unwrap();
    let config = fakes.picker.config();
    assert_eq!(config.accept, ".csv,.tsv");
    assert!(config.directory);
    assert!(!config.multiple);
}

// ============================================================================
// Speech recognition
// ============================================================================

#[test]
fn recognizer_follows_model_settings_and_commands() {
    let fakes = Fakes::new();
    let model = PropertyModel::with_values(
        "speech",
        speech_schema().unwrap(),
        [("lang", Value::from("en-US"))],
    )
    .unwrap();
    let host = ViewHost::new(&model, SpeechRecognitionView::new(fakes.provider()));
    host.render().unwrap();
    assert_eq!(fakes.recognizer.settings().unwrap().lang, "en-US");

    model.set("continuous", true, Origin::RemoteSync).unwrap();
    assert!(fakes.recognizer.settings().unwrap().continuous);

    model.set("start", 1i64, Origin::RemoteSync).unwrap();
    model.set("stop", 1i64, Origin::RemoteSync).unwrap();
    model.set("start", 2i64, Origin::RemoteSync).unwrap();
    assert_eq!(fakes.recognizer.commands(), vec!["start", "stop", "start"]);

    model
        .set(
            "grammars",
            Value::list([
                Value::map([("src", Value::from("#JSGF V1.0;")), ("weight", Value::from(0.5))]),
                Value::map([("uri", Value::from("https://example.com/g.grxml"))]),
            ]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(
        fakes.recognizer.grammars(),
        vec![
            ("src:#JSGF V1.0;".to_owned(), 0.5),
            ("uri:https://example.com/g.grxml".to_owned(), 1.0),
        ]
    );
}

#[test]
fn recognizer_events_are_mirrored() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("speech", speech_schema().unwrap());
    let host = ViewHost::new(&model, SpeechRecognitionView::new(fakes.provider()));
    host.render().unwrap();
    let source = fakes.recognizer.source();

    source.fire("start");
    source.fire("speechstart");
    assert_eq!(model.get("started").unwrap(), Value::Bool(true));
    assert_eq!(model.get("speech_started").unwrap(), Value::Bool(true));

    source.emit(
        "result",
        Value::list([Value::map([
            ("isFinal", Value::Bool(true)),
            (
                "alternatives",
                Value::list([Value::map([
                    ("transcript", Value::from("hello")),
                    ("confidence", Value::from(0.9)),
                ])]),
            ),
        ])]),
    );
    assert_eq!(
        model.get("results").unwrap(),
        Value::list([Value::map([
            ("is_final", Value::Bool(true)),
            (
                "alternatives",
                Value::list([Value::map([
                    ("confidence", Value::from(0.9)),
                    ("transcript", Value::from("hello")),
                ])]),
            ),
        ])])
    );

    source.emit(
        "error",
        Value::map([("error", Value::from("network")), ("message", Value::from("offline"))]),
    );
    source.fire("end");
    assert_eq!(model.get("started").unwrap(), Value::Bool(false));
    assert_eq!(model.get("speech_started").unwrap(), Value::Bool(false));
    assert_eq!(
        model.get("errors").unwrap(),
        Value::list([Value::map([
            ("error", Value::from("network")),
            ("message", Value::from("offline")),
        ])])
    );
}

// ============================================================================
// Text to speech
// ============================================================================

#[test]
fn synthesizer_status_is_mirrored_after_each_command() {
    let mut fakes = Fakes::new();
    let alex = Value::map([("name", Value::from("Alex"))]);
    fakes.synthesizer = Rc::new(FakeSynthesizer::new().with_voices(vec![alex.clone()]));
    let model = PropertyModel::new("tts", tts_schema().unwrap());
    let host = ViewHost::new(&model, TextToSpeechView::new(fakes.provider()));
    host.render().unwrap();
    assert_eq!(model.get("voices").unwrap(), Value::list([alex]));

    model
        .set(
            "speaks",
            Value::map([("text", Value::from("hello")), ("voice", Value::from("Alex"))]),
            Origin::RemoteSync,
        )
        .unwrap();
    assert_eq!(model.get("speaking").unwrap(), Value::Bool(true));
    assert_eq!(model.get("pending").unwrap(), Value::Bool(false));

    model
        .set("speaks", Value::map([("text", Value::from("again"))]), Origin::RemoteSync)
        .unwrap();
    assert_eq!(model.get("pending").unwrap(), Value::Bool(true));

    model.set("pauses", 1i64, Origin::RemoteSync).unwrap();
    assert_eq!(model.get("paused").unwrap(), Value::Bool(true));
    model.set("cancels", 1i64, Origin::RemoteSync).unwrap();
    assert_eq!(model.get("speaking").unwrap(), Value::Bool(false));
    assert_eq!(model.get("paused").unwrap(), Value::Bool(false));

    let spoken = fakes.synthesizer.spoken();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0].voice.as_deref(), Some("Alex"));
}

#[test]
fn synthesizer_events_refresh_the_model() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("tts", tts_schema().unwrap());
    let host = ViewHost::new(&model, TextToSpeechView::new(fakes.provider()));
    host.render().unwrap();

    model
        .set("speaks", Value::map([("text", Value::from("hi"))]), Origin::RemoteSync)
        .unwrap();
    fakes.synthesizer.finish();
    assert_eq!(model.get("speaking").unwrap(), Value::Bool(false));

    let voices = vec![Value::map([("name", Value::from("Kate"))])];
    fakes.synthesizer.change_voices(voices.clone());
    assert_eq!(model.get("voices").unwrap(), Value::List(voices));
}

// ============================================================================
// Location
// ============================================================================

#[test]
fn location_is_read_on_render_and_popstate() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("loc", location_schema().unwrap());
    let host = ViewHost::new(&model, LocationView::new(fakes.provider()));
    host.render().unwrap();
    assert_eq!(model.get("href").unwrap(), Value::from(DEFAULT_HREF));
    assert_eq!(model.get("pathname").unwrap(), Value::from("/app"));
    assert_eq!(model.get("port").unwrap(), Value::from("5006"));

    fakes.history.pop_to("http://localhost:5006/back?q=1");
    assert_eq!(model.get("pathname").unwrap(), Value::from("/back"));
    assert_eq!(model.get("search").unwrap(), Value::from("?q=1"));
    assert!(fakes.history.pushed().is_empty());
    assert!(fakes.history.assigned().is_empty());
}

#[test]
fn server_path_change_pushes_history() {
    let fakes = Fakes::new();
    let model = PropertyModel::new("loc", location_schema().unwrap());
    let host = ViewHost::new(&model, LocationView::new(fakes.provider()));
    host.render().unwrap();

    model.set("pathname", "/other", Origin::RemoteSync).unwrap();
    assert_eq!(fakes.history.pushed(), vec!["http://localhost:5006/other"]);
    assert_eq!(
        model.get("href").unwrap(),
        Value::from("http://localhost:5006/other")
    );

    model.set("refresh", true, Origin::RemoteSync).unwrap();
    model.set("hash", "#intro", Origin::RemoteSync).unwrap();
    assert_eq!(
        fakes.history.assigned(),
        vec!["http://localhost:5006/other#intro"]
    );
    assert_eq!(fakes.history.pushed().len(), 1);
}

// ============================================================================
// Document sync
// ============================================================================

#[test]
fn ui_events_are_forwarded_and_server_patches_are_not_echoed() {
    let fakes = Fakes::new();
    let sync = DocumentSync::new();
    let sent = Rc::new(RefCell::new(Vec::new()));
    let outbox = Rc::clone(&sent);
    sync.on_emit(move |patch| outbox.borrow_mut().push(patch.clone()));

    let model = plot_model(Vec::new());
    sync.register(&model);
    let _host = plot_host(&fakes, &model);
    let plot = fakes.plots.latest().unwrap();

    let layout = Value::map([("title", Value::from("Live"))]);
    assert!(sync.apply_patch(&Patch::new("plot", "layout", layout.clone())).unwrap());
    assert_eq!(plot.relayouts(), vec![layout]);
    assert!(sent.borrow().is_empty());

    plot.source()
        .emit("click", Value::map([("points", Value::list([Value::map([("x", Value::Int(2))])]))]));
    assert_eq!(
        *sent.borrow(),
        vec![Patch::new(
            "plot",
            "click_data",
            Value::map([("points", Value::list([Value::map([("x", Value::Int(2))])]))]),
        )]
    );
}

#[test]
fn wire_message_drives_a_bound_view() {
    let fakes = Fakes::new();
    let sync = DocumentSync::new();
    let model = PropertyModel::new("loc", location_schema().unwrap());
    sync.register(&model);
    let host = ViewHost::new(&model, LocationView::new(fakes.provider()));
    host.render().unwrap();

    let message = sync
        .encode(&[
            Patch::new("loc", "pathname", "/docs"),
            Patch::new("loc", "search", "?page=2"),
        ])
        .unwrap();
    assert_eq!(sync.receive(&message).unwrap(), 2);
    assert_eq!(
        fakes.history.pushed().last().map(String::as_str),
        Some("http://localhost:5006/docs?page=2")
    );
    assert_eq!(
        model.get("href").unwrap(),
        Value::from("http://localhost:5006/docs?page=2")
    );
}
