#![forbid(unsafe_code)]

//! Event bridges and external widget adapters for syncview.
//!
//! This crate provides:
//! - [`CapabilityProvider`] injected host APIs with explicit absence
//! - [`FileInputView`], [`PlotView`], [`SpeechRecognitionView`],
//!   [`TextToSpeechView`] and [`LocationView`] native event bridges
//! - [`ExternalWidgetAdapter`] snapshot/patch bookkeeping for third-party
//!   widgets, and [`WidgetManagerView`] for asynchronously built ones
//!
//! Each bridge module also exports the schema of the model it renders.

pub mod capability;
pub mod external;
pub mod file_input;
pub mod location;
pub mod plot;
pub mod speech;
pub mod tts;

pub use capability::{
    Capabilities, CapabilityProvider, ExternalWidget, FileHandle, FilePicker, FileReader,
    GrammarList, History, LocationSnapshot, PlotInstance, PlotLibrary, ReadCallback,
    RecognitionSettings, SpeechRecognizer, SpeechSynthesizer, SynthesisStatus, Utterance,
    WidgetCallback, WidgetManager,
};
pub use external::{
    ExternalWidgetAdapter, PatchOutcome, SnapshotVersion, WidgetManagerView, widget_manager_schema,
};
pub use file_input::{FileInputView, file_input_schema};
pub use location::{LocationView, compose_href, location_schema};
pub use plot::columns::{ExtractedColumns, column_source_schema, extract_columns, sync_columns};
pub use plot::{PlotView, filter_event_data, plot_schema};
pub use speech::{SpeechRecognitionView, normalize_results, speech_schema};
pub use tts::{TextToSpeechView, tts_schema, utterance_from_value};
