#![forbid(unsafe_code)]

//! Host capabilities.
//!
//! Every browser or device API a view depends on is injected through a
//! [`CapabilityProvider`] at construction time. Absence is explicit: the
//! accessor returns [`SyncError::MissingCapability`] and the view renders
//! nothing instead of failing hard.
//!
//! All traits are single-threaded (`Rc`, no `Send`) and callback-based where
//! the underlying API is asynchronous.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use syncview_core::{Result, SyncError, Value};
use syncview_runtime::EventSource;

bitflags! {
    /// Set of capabilities a provider can supply.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u16 {
        const FILE_READER = 1 << 0;
        const FILE_PICKER = 1 << 1;
        const SPEECH_RECOGNITION = 1 << 2;
        const SPEECH_SYNTHESIS = 1 << 3;
        const PLOTTING = 1 << 4;
        const WIDGET_MANAGER = 1 << 5;
        const HISTORY = 1 << 6;
    }
}

impl Capabilities {
    /// Stable name of a single capability, used in errors and logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        const LABELS: [(Capabilities, &str); 7] = [
            (Capabilities::FILE_READER, "file-reader"),
            (Capabilities::FILE_PICKER, "file-picker"),
            (Capabilities::SPEECH_RECOGNITION, "speech-recognition"),
            (Capabilities::SPEECH_SYNTHESIS, "speech-synthesis"),
            (Capabilities::PLOTTING, "plotting"),
            (Capabilities::WIDGET_MANAGER, "widget-manager"),
            (Capabilities::HISTORY, "history"),
        ];
        LABELS
            .iter()
            .find(|(cap, _)| *cap == self)
            .map_or("capability-set", |(_, label)| *label)
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Metadata of a file chosen by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub mime_type: String,
    /// Path relative to the chosen directory; empty outside directory mode.
    pub relative_path: String,
}

impl FileHandle {
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            relative_path: String::new(),
        }
    }

    #[must_use]
    pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = path.into();
        self
    }

    /// Parse the map form carried in a picker `change` event.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_owned();
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        Some(Self {
            name,
            mime_type: text("mime_type"),
            relative_path: text("relative_path"),
        })
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("mime_type", Value::from(self.mime_type.as_str())),
            ("relative_path", Value::from(self.relative_path.as_str())),
        ])
    }
}

/// Completion callback of an asynchronous read.
pub type ReadCallback = Box<dyn FnOnce(Result<Vec<u8>>)>;

/// Asynchronous file content access.
pub trait FileReader {
    /// Read `file`; `done` may run synchronously or later.
    fn read(&self, file: &FileHandle, done: ReadCallback);
}

/// The native file input element.
pub trait FilePicker {
    fn configure(&self, accept: &str, multiple: bool, directory: bool);
    /// Emits `change` with a list of file maps as payload.
    fn events(&self) -> Rc<dyn EventSource>;
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Parsed browser location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationSnapshot {
    pub href: String,
    pub hostname: String,
    pub pathname: String,
    pub protocol: String,
    pub port: String,
    pub search: String,
    pub hash: String,
}

/// Browser location and history.
pub trait History {
    fn location(&self) -> LocationSnapshot;
    /// Full navigation (reload).
    fn assign(&self, href: &str);
    /// Silent history entry, no reload.
    fn push_state(&self, href: &str);
    /// Emits `popstate`.
    fn events(&self) -> Rc<dyn EventSource>;
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

/// Vendor grammar list under construction.
pub trait GrammarList {
    fn add_from_string(&mut self, src: &str, weight: f64);
    fn add_from_uri(&mut self, uri: &str, weight: f64);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recognizer settings mirrored from model fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecognitionSettings {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
    pub service_uri: String,
}

/// Continuous speech recognition.
pub trait SpeechRecognizer {
    fn configure(&self, settings: &RecognitionSettings);
    fn new_grammar_list(&self) -> Box<dyn GrammarList>;
    fn set_grammars(&self, grammars: Box<dyn GrammarList>);
    fn start(&self);
    fn stop(&self);
    fn abort(&self);
    /// Emits `start`, `end`, `audiostart`, `audioend`, `soundstart`,
    /// `soundend`, `speechstart`, `speechend`, `nomatch`, `result`, `error`.
    fn events(&self) -> Rc<dyn EventSource>;
}

/// An utterance to speak.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<String>,
    pub pitch: f64,
    pub rate: f64,
    pub volume: f64,
}

impl Default for Utterance {
    fn default() -> Self {
        Self {
            text: String::new(),
            lang: String::new(),
            voice: None,
            pitch: 1.0,
            rate: 1.0,
            volume: 1.0,
        }
    }
}

/// Synthesizer queue state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SynthesisStatus {
    pub paused: bool,
    pub pending: bool,
    pub speaking: bool,
}

/// Speech synthesis.
pub trait SpeechSynthesizer {
    fn speak(&self, utterance: &Utterance);
    fn cancel(&self);
    fn pause(&self);
    fn resume(&self);
    fn status(&self) -> SynthesisStatus;
    /// Voice descriptors as maps (`name`, `lang`, `default`, `local_service`,
    /// `voice_uri`).
    fn voices(&self) -> Vec<Value>;
    /// Emits `voiceschanged`, `start`, `end`, `pause`, `resume`, `error`.
    fn events(&self) -> Rc<dyn EventSource>;
}

// ---------------------------------------------------------------------------
// External widgets
// ---------------------------------------------------------------------------

/// A third-party widget fed by snapshots and optional partial patches.
pub trait ExternalWidget {
    /// Fully (re)initialize from `snapshot`.
    fn push_snapshot(&self, snapshot: &Value) -> Result<()>;
    /// Apply `delta` to item `index` (one trace, one series).
    fn push_patch(&self, index: usize, delta: &Value) -> Result<()>;
    fn supports_partial_update(&self) -> bool;
}

/// A live plot.
pub trait PlotInstance: ExternalWidget {
    fn relayout(&self, layout: &Value) -> Result<()>;
    /// Emits `click`, `hover`, `unhover`, `selected`, `deselect`,
    /// `relayout`, `restyle`, `clickannotation`.
    fn events(&self) -> Rc<dyn EventSource>;
}

/// Plotting library entry point.
pub trait PlotLibrary {
    /// # Errors
    ///
    /// [`SyncError::Capability`] when the library cannot create a plot.
    fn create_plot(&self) -> Result<Rc<dyn PlotInstance>>;
}

/// Completion callback of widget-manager construction.
pub type WidgetCallback = Box<dyn FnOnce(Result<Rc<dyn ExternalWidget>>)>;

/// Externally hosted widget runtime that constructs views asynchronously.
pub trait WidgetManager {
    fn create_view(&self, bundle: &Value, done: WidgetCallback);
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Injected set of host capabilities. Cloning is cheap.
#[derive(Clone, Default)]
pub struct CapabilityProvider {
    file_reader: Option<Rc<dyn FileReader>>,
    file_picker: Option<Rc<dyn FilePicker>>,
    speech_recognizer: Option<Rc<dyn SpeechRecognizer>>,
    speech_synthesizer: Option<Rc<dyn SpeechSynthesizer>>,
    plot_library: Option<Rc<dyn PlotLibrary>>,
    widget_manager: Option<Rc<dyn WidgetManager>>,
    history: Option<Rc<dyn History>>,
}

impl fmt::Debug for CapabilityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityProvider")
            .field("available", &self.available())
            .finish()
    }
}

fn require<T: ?Sized>(slot: &Option<Rc<T>>, cap: Capabilities) -> Result<Rc<T>> {
    slot.clone().ok_or(SyncError::MissingCapability {
        capability: cap.label(),
    })
}

impl CapabilityProvider {
    /// A provider with nothing available.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn available(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::FILE_READER, self.file_reader.is_some());
        caps.set(Capabilities::FILE_PICKER, self.file_picker.is_some());
        caps.set(
            Capabilities::SPEECH_RECOGNITION,
            self.speech_recognizer.is_some(),
        );
        caps.set(
            Capabilities::SPEECH_SYNTHESIS,
            self.speech_synthesizer.is_some(),
        );
        caps.set(Capabilities::PLOTTING, self.plot_library.is_some());
        caps.set(Capabilities::WIDGET_MANAGER, self.widget_manager.is_some());
        caps.set(Capabilities::HISTORY, self.history.is_some());
        caps
    }

    #[must_use]
    pub fn has(&self, caps: Capabilities) -> bool {
        self.available().contains(caps)
    }

    #[must_use]
    pub fn with_file_reader(mut self, reader: Rc<dyn FileReader>) -> Self {
        self.file_reader = Some(reader);
        self
    }

    #[must_use]
    pub fn with_file_picker(mut self, picker: Rc<dyn FilePicker>) -> Self {
        self.file_picker = Some(picker);
        self
    }

    #[must_use]
    pub fn with_speech_recognizer(mut self, recognizer: Rc<dyn SpeechRecognizer>) -> Self {
        self.speech_recognizer = Some(recognizer);
        self
    }

    #[must_use]
    pub fn with_speech_synthesizer(mut self, synthesizer: Rc<dyn SpeechSynthesizer>) -> Self {
        self.speech_synthesizer = Some(synthesizer);
        self
    }

    #[must_use]
    pub fn with_plot_library(mut self, library: Rc<dyn PlotLibrary>) -> Self {
        self.plot_library = Some(library);
        self
    }

    #[must_use]
    pub fn with_widget_manager(mut self, manager: Rc<dyn WidgetManager>) -> Self {
        self.widget_manager = Some(manager);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Rc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn file_reader(&self) -> Result<Rc<dyn FileReader>> {
        require(&self.file_reader, Capabilities::FILE_READER)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn file_picker(&self) -> Result<Rc<dyn FilePicker>> {
        require(&self.file_picker, Capabilities::FILE_PICKER)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn speech_recognizer(&self) -> Result<Rc<dyn SpeechRecognizer>> {
        require(&self.speech_recognizer, Capabilities::SPEECH_RECOGNITION)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn speech_synthesizer(&self) -> Result<Rc<dyn SpeechSynthesizer>> {
        require(&self.speech_synthesizer, Capabilities::SPEECH_SYNTHESIS)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn plot_library(&self) -> Result<Rc<dyn PlotLibrary>> {
        require(&self.plot_library, Capabilities::PLOTTING)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn widget_manager(&self) -> Result<Rc<dyn WidgetManager>> {
        require(&self.widget_manager, Capabilities::WIDGET_MANAGER)
    }

    /// # Errors
    ///
    /// [`SyncError::MissingCapability`] when absent.
    pub fn history(&self) -> Result<Rc<dyn History>> {
        require(&self.history, Capabilities::HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullReader;

    impl FileReader for NullReader {
        fn read(&self, _file: &FileHandle, done: ReadCallback) {
            done(Ok(Vec::new()));
        }
    }

    #[test]
    fn missing_capability_is_reported_by_name() {
        let caps = CapabilityProvider::none();
        let err = caps.history().err().unwrap();
        assert_eq!(
            err,
            SyncError::MissingCapability {
                capability: "history"
            }
        );
        assert!(err.is_retryable());
        assert_eq!(caps.available(), Capabilities::empty());
    }

    #[test]
    fn builder_registers_presence() {
        let caps = CapabilityProvider::none().with_file_reader(Rc::new(NullReader));
        assert!(caps.has(Capabilities::FILE_READER));
        assert!(!caps.has(Capabilities::FILE_READER | Capabilities::FILE_PICKER));
        assert!(caps.file_reader().is_ok());
    }

    #[test]
    fn file_handle_parses_event_map() {
        let handle = FileHandle::new("a.csv", "text/csv").with_relative_path("data/a.csv");
        assert_eq!(FileHandle::from_value(&handle.to_value()), Some(handle));
        let bare = Value::map([("name", Value::from("b.bin"))]);
        assert_eq!(
            FileHandle::from_value(&bare),
            Some(FileHandle::new("b.bin", ""))
        );
        assert_eq!(FileHandle::from_value(&Value::Null), None);
    }
}
