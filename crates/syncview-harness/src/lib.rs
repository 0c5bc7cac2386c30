#![forbid(unsafe_code)]

//! Deterministic capability fakes for syncview tests.
//!
//! This crate provides:
//! - [`FakeEventSource`] an event source fired by the test
//! - [`ManualFileReader`] / [`FakeFilePicker`] reads that resolve in any order
//! - [`RecordingPlotLibrary`] / [`DeferredWidgetManager`] external widgets
//!   that record every push
//! - [`FakeRecognizer`] / [`FakeSynthesizer`] scripted speech
//! - [`FakeHistory`] an in-memory location and history
//! - [`Fakes`] all of the above behind one [`CapabilityProvider`]

pub mod events;
pub mod files;
pub mod history;
pub mod plot;
pub mod speech;

use std::rc::Rc;

use syncview_widgets::CapabilityProvider;

pub use events::FakeEventSource;
pub use files::{FakeFilePicker, ManualFileReader, PickerConfig};
pub use history::{FakeHistory, parse_href};
pub use plot::{DeferredWidgetManager, RecordingPlotLibrary, RecordingWidget};
pub use speech::{FakeRecognizer, FakeSynthesizer};

/// Default location of [`Fakes::new`].
pub const DEFAULT_HREF: &str = "http://localhost:5006/app";

/// One fake per capability, kept alongside the provider that exposes them.
pub struct Fakes {
    pub reader: Rc<ManualFileReader>,
    pub picker: Rc<FakeFilePicker>,
    pub plots: Rc<RecordingPlotLibrary>,
    pub widgets: Rc<DeferredWidgetManager>,
    pub recognizer: Rc<FakeRecognizer>,
    pub synthesizer: Rc<FakeSynthesizer>,
    pub history: Rc<FakeHistory>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self::new()
    }
}

impl Fakes {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: Rc::new(ManualFileReader::new()),
            picker: Rc::new(FakeFilePicker::new()),
            plots: Rc::new(RecordingPlotLibrary::new()),
            widgets: Rc::new(DeferredWidgetManager::new()),
            recognizer: Rc::new(FakeRecognizer::new()),
            synthesizer: Rc::new(FakeSynthesizer::new()),
            history: Rc::new(FakeHistory::new(DEFAULT_HREF)),
        }
    }

    /// Swap in a plot library without partial-update support.
    #[must_use]
    pub fn with_snapshot_only_plots(mut self) -> Self {
        self.plots = Rc::new(RecordingPlotLibrary::snapshot_only());
        self
    }

    /// A provider exposing every fake.
    #[must_use]
    pub fn provider(&self) -> CapabilityProvider {
        CapabilityProvider::none()
            .with_file_reader(self.reader.clone())
            .with_file_picker(self.picker.clone())
            .with_plot_library(self.plots.clone())
            .with_widget_manager(self.widgets.clone())
            .with_speech_recognizer(self.recognizer.clone())
            .with_speech_synthesizer(self.synthesizer.clone())
            .with_history(self.history.clone())
    }
}
