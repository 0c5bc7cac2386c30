#![forbid(unsafe_code)]

//! File picker and manually resolved file reader.

use std::cell::RefCell;
use std::rc::Rc;

use syncview_core::{Result, Value};
use syncview_runtime::EventSource;
use syncview_widgets::{FileHandle, FilePicker, FileReader, ReadCallback};

use crate::events::FakeEventSource;

/// Reader whose reads stay pending until the test resolves them, in any
/// order.
#[derive(Default)]
pub struct ManualFileReader {
    parked: RefCell<Vec<(FileHandle, ReadCallback)>>,
}

impl ManualFileReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of files with a read in flight, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.parked
            .borrow()
            .iter()
            .map(|(file, _)| file.name.clone())
            .collect()
    }

    /// Complete the oldest pending read of `name`. Returns `false` when there
    /// is none.
    pub fn resolve(&self, name: &str, result: Result<Vec<u8>>) -> bool {
        let position = self
            .parked
            .borrow()
            .iter()
            .position(|(file, _)| file.name == name);
        let Some(position) = position else {
            return false;
        };
        let (_, done) = self.parked.borrow_mut().remove(position);
        done(result);
        true
    }

    /// Complete every pending read with `contents(name)`, newest first.
    pub fn resolve_all_reversed(&self, contents: impl Fn(&str) -> Vec<u8>) -> usize {
        let mut resolved = 0;
        loop {
            let next = self.parked.borrow_mut().pop();
            let Some((file, done)) = next else {
                return resolved;
            };
            done(Ok(contents(&file.name)));
            resolved += 1;
        }
    }
}

impl FileReader for ManualFileReader {
    fn read(&self, file: &FileHandle, done: ReadCallback) {
        self.parked.borrow_mut().push((file.clone(), done));
    }
}

/// Picker configuration as last applied by a view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PickerConfig {
    pub accept: String,
    pub multiple: bool,
    pub directory: bool,
}

/// File input element driven by the test.
#[derive(Default)]
pub struct FakeFilePicker {
    config: RefCell<PickerConfig>,
    events: Rc<FakeEventSource>,
}

impl FakeFilePicker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(&self) -> PickerConfig {
        self.config.borrow().clone()
    }

    #[must_use]
    pub fn source(&self) -> &FakeEventSource {
        &self.events
    }

    /// Simulate the user choosing `files`.
    pub fn select(&self, files: &[FileHandle]) -> usize {
        let payload = Value::list(files.iter().map(FileHandle::to_value));
        self.events.emit("change", payload)
    }
}

impl FilePicker for FakeFilePicker {
    fn configure(&self, accept: &str, multiple: bool, directory: bool) {
        *self.config.borrow_mut() = PickerConfig {
            accept: accept.to_owned(),
            multiple,
            directory,
        };
    }

    fn events(&self) -> Rc<dyn EventSource> {
        self.events.clone()
    }
}
