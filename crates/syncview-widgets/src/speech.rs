#![forbid(unsafe_code)]

//! Speech recognition bridge.
//!
//! Server-side inputs configure the recognizer and drive it through counter
//! fields (`start`, `stop`, `abort`): every change of a counter issues one
//! command. Recognizer events are mirrored into the output fields.
//!
//! | Event | Output |
//! |-------|--------|
//! | `start` / `end` | `started` (and every activity flag cleared on `end`) |
//! | `audiostart` / `audioend` | `audio_started` |
//! | `soundstart` / `soundend` | `sound_started` |
//! | `speechstart` / `speechend` | `speech_started` |
//! | `nomatch` | `no_match` |
//! | `result` | `results`, normalized |
//! | `error` | appended to `errors` |

use std::rc::Rc;

use syncview_core::{Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, Value};
use syncview_runtime::{
    ListenerTable, NativeEvent, ReentrancyGuard, RenderContext, RenderOutcome, UpdateAction, View,
};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, GrammarList, RecognitionSettings, SpeechRecognizer};

/// Activity events: event name, output flag, value written.
const FLAG_EVENTS: [(&str, &str, bool); 8] = [
    ("start", "started", true),
    ("audiostart", "audio_started", true),
    ("audioend", "audio_started", false),
    ("soundstart", "sound_started", true),
    ("soundend", "sound_started", false),
    ("speechstart", "speech_started", true),
    ("speechend", "speech_started", false),
    ("nomatch", "no_match", true),
];

const ACTIVITY_FLAGS: [&str; 4] = ["started", "audio_started", "sound_started", "speech_started"];

/// Schema of a speech-recognition model.
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn speech_schema() -> Result<Schema> {
    let flag = |name: &str| FieldSpec::new(name, FieldType::Bool, false).client_writable();
    Schema::define([
        FieldSpec::new("start", FieldType::Int, 0i64),
        FieldSpec::new("stop", FieldType::Int, 0i64),
        FieldSpec::new("abort", FieldType::Int, 0i64),
        FieldSpec::new("lang", FieldType::Str, ""),
        FieldSpec::new("continuous", FieldType::Bool, false),
        FieldSpec::new("interim_results", FieldType::Bool, false),
        FieldSpec::new("max_alternatives", FieldType::Int, 1i64),
        FieldSpec::new("service_uri", FieldType::Str, ""),
        FieldSpec::new("grammars", FieldType::list_of(FieldType::Map), Value::List(Vec::new())),
        flag("started"),
        flag("audio_started"),
        flag("sound_started"),
        flag("speech_started"),
        flag("no_match"),
        FieldSpec::new("results", FieldType::list_of(FieldType::Map), Value::List(Vec::new()))
            .client_writable(),
        FieldSpec::new("errors", FieldType::list_of(FieldType::Map), Value::List(Vec::new()))
            .client_writable(),
    ])
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_alternative(alternative: &Value) -> Value {
    let confidence = alternative
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let transcript = alternative
        .get("transcript")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Value::map([
        ("confidence", Value::from(confidence)),
        ("transcript", Value::from(transcript)),
    ])
}

fn normalize_result(result: &Value) -> Value {
    let (is_final, alternatives) = match result {
        Value::List(alternatives) => (false, alternatives.as_slice()),
        other => (
            other
                .get("is_final")
                .or_else(|| other.get("isFinal"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            other
                .get("alternatives")
                .and_then(Value::as_list)
                .unwrap_or_default(),
        ),
    };
    Value::map([
        ("is_final", Value::from(is_final)),
        (
            "alternatives",
            Value::List(alternatives.iter().map(normalize_alternative).collect()),
        ),
    ])
}

/// Normalize a recognizer `result` payload to
/// `[{is_final, alternatives: [{confidence, transcript}]}]`.
///
/// Accepts either a list of results or a map with a `results` list.
#[must_use]
pub fn normalize_results(payload: &Value) -> Value {
    let results = payload
        .as_list()
        .or_else(|| payload.get("results").and_then(Value::as_list))
        .unwrap_or_default();
    Value::List(results.iter().map(normalize_result).collect())
}

/// Add every valid `{src|uri, weight}` entry of `grammars` to `target`.
/// Returns the number of grammars added.
pub fn load_grammars(target: &mut dyn GrammarList, grammars: &Value) -> usize {
    let mut added = 0;
    for entry in grammars.as_list().unwrap_or_default() {
        let weight = entry.get("weight").and_then(Value::as_f64).unwrap_or(1.0);
        if let Some(src) = entry.get("src").and_then(Value::as_str) {
            target.add_from_string(src, weight);
        } else if let Some(uri) = entry.get("uri").and_then(Value::as_str) {
            target.add_from_uri(uri, weight);
        } else {
            warn!(?entry, "grammar needs `src` or `uri`; skipped");
            continue;
        }
        added += 1;
    }
    added
}

fn settings(model: &PropertyModel) -> Result<RecognitionSettings> {
    let text = |field: &str| -> Result<String> {
        Ok(model.get(field)?.as_str().unwrap_or_default().to_owned())
    };
    let flag = |field: &str| -> Result<bool> { Ok(model.get(field)?.as_bool().unwrap_or(false)) };
    let max_alternatives = model
        .get("max_alternatives")?
        .as_i64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1);
    Ok(RecognitionSettings {
        lang: text("lang")?,
        continuous: flag("continuous")?,
        interim_results: flag("interim_results")?,
        max_alternatives,
        service_uri: text("service_uri")?,
    })
}

fn apply_grammars(recognizer: &dyn SpeechRecognizer, model: &PropertyModel) -> Result<()> {
    let grammars = model.get("grammars")?;
    let mut list = recognizer.new_grammar_list();
    let added = load_grammars(list.as_mut(), &grammars);
    debug!(added, "grammar list installed");
    recognizer.set_grammars(list);
    Ok(())
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Write `entries` as a local event, never re-forwarding.
fn mirror(guard: &ReentrancyGuard, model: &PropertyModel, entries: Vec<(&str, Value)>) {
    guard.run(|| {
        if let Err(err) = model.update(entries, Origin::LocalUi) {
            warn!(model = %model.id(), error = %err, "speech event write failed");
        }
    });
}

fn error_entry(event: &NativeEvent) -> Value {
    let text = |key: &str| {
        event
            .payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    Value::map([
        ("error", Value::from(text("error"))),
        ("message", Value::from(text("message"))),
    ])
}

/// View bridging a speech recognizer.
pub struct SpeechRecognitionView {
    caps: CapabilityProvider,
    guard: ReentrancyGuard,
    recognizer: Option<Rc<dyn SpeechRecognizer>>,
}

impl SpeechRecognitionView {
    #[must_use]
    pub fn new(caps: CapabilityProvider) -> Self {
        Self {
            caps,
            guard: ReentrancyGuard::new(),
            recognizer: None,
        }
    }
}

impl View for SpeechRecognitionView {
    fn name(&self) -> &'static str {
        "speech-recognition"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.recognizer = None;
        let recognizer = self.caps.speech_recognizer()?;
        recognizer.configure(&settings(cx.model())?);
        apply_grammars(recognizer.as_ref(), cx.model())?;

        let source = recognizer.events();
        let mut table = ListenerTable::new();
        for (event, field, value) in FLAG_EVENTS {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            table.on(&source, event, move |_| {
                let mut entries = vec![(field, Value::from(value))];
                if event == "start" {
                    entries.push(("no_match", Value::from(false)));
                }
                mirror(&guard, &model, entries);
            });
        }
        {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            table.on(&source, "end", move |_| {
                let entries = ACTIVITY_FLAGS
                    .iter()
                    .map(|flag| (*flag, Value::from(false)))
                    .collect();
                mirror(&guard, &model, entries);
            });
        }
        {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            table.on(&source, "result", move |event| {
                mirror(&guard, &model, vec![("results", normalize_results(&event.payload))]);
            });
        }
        {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            table.on(&source, "error", move |event| {
                let mut errors = model
                    .get("errors")
                    .ok()
                    .and_then(|v| v.as_list().map(<[Value]>::to_vec))
                    .unwrap_or_default();
                errors.push(error_entry(event));
                mirror(&guard, &model, vec![("errors", Value::List(errors))]);
            });
        }
        cx.scope().listen(table);
        self.recognizer = Some(recognizer);
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        let Some(recognizer) = &self.recognizer else {
            return Ok(UpdateAction::Ignored);
        };
        match change.field.as_str() {
            "start" => recognizer.start(),
            "stop" => recognizer.stop(),
            "abort" => recognizer.abort(),
            "lang" | "continuous" | "interim_results" | "max_alternatives" | "service_uri" => {
                recognizer.configure(&settings(cx.model())?);
            }
            "grammars" => apply_grammars(recognizer.as_ref(), cx.model())?,
            _ => return Ok(UpdateAction::Ignored),
        }
        Ok(UpdateAction::Patched)
    }

    fn dispose(&mut self) {
        if let Some(recognizer) = self.recognizer.take() {
            recognizer.abort();
        }
    }
}
