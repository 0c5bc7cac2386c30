#![forbid(unsafe_code)]

//! Speech synthesis bridge.
//!
//! `speaks` carries the utterance to say; `cancels`, `pauses` and `resumes`
//! are command counters. The synthesizer's queue state and voice list are
//! mirrored into `paused`, `pending`, `speaking` and `voices`, refreshed on
//! every synthesizer event and after every command.

use std::rc::Rc;

use syncview_core::{Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, Value};
use syncview_runtime::{
    ListenerTable, ReentrancyGuard, RenderContext, RenderOutcome, UpdateAction, View,
};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, SpeechSynthesizer, Utterance};

const SYNTH_EVENTS: [&str; 6] = ["voiceschanged", "start", "end", "pause", "resume", "error"];

/// Schema of a text-to-speech model.
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn tts_schema() -> Result<Schema> {
    Schema::define([
        FieldSpec::new("speaks", FieldType::Map, Value::empty_map()),
        FieldSpec::new("cancels", FieldType::Int, 0i64),
        FieldSpec::new("pauses", FieldType::Int, 0i64),
        FieldSpec::new("resumes", FieldType::Int, 0i64),
        FieldSpec::new("paused", FieldType::Bool, false).client_writable(),
        FieldSpec::new("pending", FieldType::Bool, false).client_writable(),
        FieldSpec::new("speaking", FieldType::Bool, false).client_writable(),
        FieldSpec::new("voices", FieldType::list_of(FieldType::Map), Value::List(Vec::new()))
            .client_writable(),
    ])
}

/// Parse an utterance map. `None` when there is no text to speak.
///
/// `voice` may be a voice name or a voice map with a `name`.
#[must_use]
pub fn utterance_from_value(value: &Value) -> Option<Utterance> {
    let text = value.get("text")?.as_str()?;
    if text.is_empty() {
        return None;
    }
    let number =
        |key: &str, default: f64| value.get(key).and_then(Value::as_f64).unwrap_or(default);
    let voice = value.get("voice").and_then(|voice| {
        voice
            .as_str()
            .or_else(|| voice.get("name").and_then(Value::as_str))
            .map(str::to_owned)
    });
    Some(Utterance {
        text: text.to_owned(),
        lang: value
            .get("lang")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        voice,
        pitch: number("pitch", 1.0),
        rate: number("rate", 1.0),
        volume: number("volume", 1.0),
    })
}

fn refresh(
    synthesizer: &dyn SpeechSynthesizer,
    model: &PropertyModel,
    guard: &ReentrancyGuard,
    with_voices: bool,
) {
    let status = synthesizer.status();
    let mut entries = vec![
        ("paused", Value::from(status.paused)),
        ("pending", Value::from(status.pending)),
        ("speaking", Value::from(status.speaking)),
    ];
    if with_voices {
        entries.push(("voices", Value::List(synthesizer.voices())));
    }
    guard.run(|| {
        if let Err(err) = model.update(entries, Origin::LocalUi) {
            warn!(model = %model.id(), error = %err, "synthesizer status write failed");
        }
    });
}

/// View bridging a speech synthesizer.
pub struct TextToSpeechView {
    caps: CapabilityProvider,
    guard: ReentrancyGuard,
    synthesizer: Option<Rc<dyn SpeechSynthesizer>>,
}

impl TextToSpeechView {
    #[must_use]
    pub fn new(caps: CapabilityProvider) -> Self {
        Self {
            caps,
            guard: ReentrancyGuard::new(),
            synthesizer: None,
        }
    }
}

impl View for TextToSpeechView {
    fn name(&self) -> &'static str {
        "text-to-speech"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.synthesizer = None;
        let synthesizer = self.caps.speech_synthesizer()?;

        let source = synthesizer.events();
        let mut table = ListenerTable::new();
        for event in SYNTH_EVENTS {
            let model = cx.model().clone();
            let guard = self.guard.clone();
            let synth = Rc::clone(&synthesizer);
            table.on(&source, event, move |_| {
                refresh(synth.as_ref(), &model, &guard, event == "voiceschanged");
            });
        }
        cx.scope().listen(table);

        refresh(synthesizer.as_ref(), cx.model(), &self.guard, true);
        self.synthesizer = Some(synthesizer);
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        let Some(synthesizer) = &self.synthesizer else {
            return Ok(UpdateAction::Ignored);
        };
        match change.field.as_str() {
            "speaks" => match utterance_from_value(&change.new) {
                Some(utterance) => synthesizer.speak(&utterance),
                None => {
                    debug!("utterance without text ignored");
                    return Ok(UpdateAction::Ignored);
                }
            },
            "cancels" => synthesizer.cancel(),
            "pauses" => synthesizer.pause(),
            "resumes" => synthesizer.resume(),
            _ => return Ok(UpdateAction::Ignored),
        }
        refresh(synthesizer.as_ref(), cx.model(), &self.guard, false);
        Ok(UpdateAction::Patched)
    }

    fn dispose(&mut self) {
        if let Some(synthesizer) = self.synthesizer.take() {
            synthesizer.cancel();
        }
    }
}
