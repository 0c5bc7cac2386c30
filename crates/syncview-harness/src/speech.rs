#![forbid(unsafe_code)]

//! Speech recognizer and synthesizer fakes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use syncview_core::Value;
use syncview_runtime::EventSource;
use syncview_widgets::{
    GrammarList, RecognitionSettings, SpeechRecognizer, SpeechSynthesizer, SynthesisStatus,
    Utterance,
};

use crate::events::FakeEventSource;

type Entries = Rc<RefCell<Vec<(String, f64)>>>;

/// Grammar list that records its entries as `src:...` / `uri:...`.
struct FakeGrammarList {
    entries: Entries,
}

impl GrammarList for FakeGrammarList {
    fn add_from_string(&mut self, src: &str, weight: f64) {
        self.entries.borrow_mut().push((format!("src:{src}"), weight));
    }

    fn add_from_uri(&mut self, uri: &str, weight: f64) {
        self.entries.borrow_mut().push((format!("uri:{uri}"), weight));
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Recognizer that records commands and lets the test fire its events.
#[derive(Default)]
pub struct FakeRecognizer {
    settings: RefCell<Option<RecognitionSettings>>,
    staged: RefCell<Option<Entries>>,
    installed: RefCell<Vec<(String, f64)>>,
    commands: RefCell<Vec<&'static str>>,
    events: Rc<FakeEventSource>,
}

impl FakeRecognizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn settings(&self) -> Option<RecognitionSettings> {
        self.settings.borrow().clone()
    }

    /// Entries of the grammar list installed last.
    #[must_use]
    pub fn grammars(&self) -> Vec<(String, f64)> {
        self.installed.borrow().clone()
    }

    /// `start`, `stop` and `abort` calls in order.
    #[must_use]
    pub fn commands(&self) -> Vec<&'static str> {
        self.commands.borrow().clone()
    }

    #[must_use]
    pub fn source(&self) -> &FakeEventSource {
        &self.events
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn configure(&self, settings: &RecognitionSettings) {
        *self.settings.borrow_mut() = Some(settings.clone());
    }

    fn new_grammar_list(&self) -> Box<dyn GrammarList> {
        let entries = Entries::default();
        *self.staged.borrow_mut() = Some(Rc::clone(&entries));
        Box::new(FakeGrammarList { entries })
    }

    fn set_grammars(&self, _grammars: Box<dyn GrammarList>) {
        let entries = self
            .staged
            .borrow_mut()
            .take()
            .map(|entries| entries.borrow().clone())
            .unwrap_or_default();
        *self.installed.borrow_mut() = entries;
    }

    fn start(&self) {
        self.commands.borrow_mut().push("start");
    }

    fn stop(&self) {
        self.commands.borrow_mut().push("stop");
    }

    fn abort(&self) {
        self.commands.borrow_mut().push("abort");
    }

    fn events(&self) -> Rc<dyn EventSource> {
        self.events.clone()
    }
}

/// Synthesizer with a scripted queue.
#[derive(Default)]
pub struct FakeSynthesizer {
    status: Cell<SynthesisStatus>,
    spoken: RefCell<Vec<Utterance>>,
    voices: RefCell<Vec<Value>>,
    events: Rc<FakeEventSource>,
}

impl FakeSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_voices(self, voices: Vec<Value>) -> Self {
        *self.voices.borrow_mut() = voices;
        self
    }

    /// Replace the voice list and fire `voiceschanged`.
    pub fn change_voices(&self, voices: Vec<Value>) {
        *self.voices.borrow_mut() = voices;
        self.events.fire("voiceschanged");
    }

    /// Finish the current utterance and fire `end`.
    pub fn finish(&self) {
        self.status.set(SynthesisStatus::default());
        self.events.fire("end");
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.borrow().clone()
    }

    #[must_use]
    pub fn source(&self) -> &FakeEventSource {
        &self.events
    }
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn speak(&self, utterance: &Utterance) {
        self.spoken.borrow_mut().push(utterance.clone());
        let status = self.status.get();
        self.status.set(SynthesisStatus {
            pending: status.speaking,
            speaking: true,
            ..status
        });
    }

    fn cancel(&self) {
        self.status.set(SynthesisStatus::default());
    }

    fn pause(&self) {
        let status = self.status.get();
        self.status.set(SynthesisStatus {
            paused: true,
            ..status
        });
    }

    fn resume(&self) {
        let status = self.status.get();
        self.status.set(SynthesisStatus {
            paused: false,
            ..status
        });
    }

    fn status(&self) -> SynthesisStatus {
        self.status.get()
    }

    fn voices(&self) -> Vec<Value> {
        self.voices.borrow().clone()
    }

    fn events(&self) -> Rc<dyn EventSource> {
        self.events.clone()
    }
}
