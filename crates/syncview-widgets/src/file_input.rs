#![forbid(unsafe_code)]

//! File selection bridge.
//!
//! Mirrors the native file input into `value`, `filename` and `mime_type`.
//! Reads are asynchronous and may complete in any order; results are slotted
//! by input position and committed together once every read has finished.
//!
//! # Normalization
//!
//! | Selection | `value` / `filename` / `mime_type` |
//! |-----------|------------------------------------|
//! | no files | `""` each |
//! | single mode | scalars for the first file |
//! | `multiple` or `directory` | index-aligned lists |
//! | unreadable file | `""` placeholder in its slot |
//!
//! File contents are base64 strings. In directory mode `filename` carries the
//! path relative to the chosen directory.
//!
//! # Invariants
//!
//! 1. A newer selection supersedes every older in-flight read; stale batches
//!    never commit.
//! 2. Nothing is written after the view is detached.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use syncview_core::{Change, FieldSpec, FieldType, Origin, PropertyModel, Result, Schema, Value};
use syncview_runtime::{
    Liveness, ListenerTable, ReentrancyGuard, RenderContext, RenderOutcome, UpdateAction, View,
};
use tracing::{debug, warn};

use crate::capability::{CapabilityProvider, FileHandle, FilePicker, FileReader};

/// Schema of a file-input model.
///
/// # Errors
///
/// Never in practice; the declaration is static.
pub fn file_input_schema() -> Result<Schema> {
    let text = || FieldType::one_or_many(FieldType::Str);
    Schema::define([
        FieldSpec::new("accept", FieldType::Str, ""),
        FieldSpec::new("multiple", FieldType::Bool, false),
        FieldSpec::new("directory", FieldType::Bool, false),
        FieldSpec::new("value", text(), "").client_writable(),
        FieldSpec::new("filename", text(), "").client_writable(),
        FieldSpec::new("mime_type", text(), "").client_writable(),
    ])
}

/// One read result, in input position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct FileResult {
    content: String,
    name: String,
    mime_type: String,
}

struct Batch {
    generation: u64,
    listed: bool,
    results: Vec<Option<FileResult>>,
    remaining: usize,
}

/// Everything a read completion needs to commit.
#[derive(Clone)]
struct Committer {
    model: PropertyModel,
    guard: ReentrancyGuard,
    liveness: Liveness,
    current: Rc<Cell<u64>>,
}

impl Committer {
    fn commit(&self, generation: u64, listed: bool, results: Vec<FileResult>) {
        if !self.liveness.is_alive() {
            debug!(model = %self.model.id(), "file reads finished after detach; dropped");
            return;
        }
        if generation != self.current.get() {
            debug!(
                model = %self.model.id(),
                generation,
                current = self.current.get(),
                "superseded file selection dropped"
            );
            return;
        }
        let column = |values: Vec<String>| {
            if listed {
                Value::list(values)
            } else {
                Value::from(values.into_iter().next().unwrap_or_default())
            }
        };
        let entries = [
            ("value", column(results.iter().map(|r| r.content.clone()).collect())),
            ("filename", column(results.iter().map(|r| r.name.clone()).collect())),
            ("mime_type", column(results.iter().map(|r| r.mime_type.clone()).collect())),
        ];
        self.guard.run(|| {
            if let Err(err) = self.model.update(entries, Origin::LocalUi) {
                warn!(model = %self.model.id(), error = %err, "file selection write failed");
            }
        });
    }
}

fn display_name(file: &FileHandle, directory: bool) -> String {
    if directory && !file.relative_path.is_empty() {
        file.relative_path.clone()
    } else {
        file.name.clone()
    }
}

/// Start reading a new selection. Returns the batch generation.
fn start_selection(
    committer: &Committer,
    reader: &Rc<dyn FileReader>,
    files: Vec<FileHandle>,
    listed: bool,
    directory: bool,
) -> u64 {
    let generation = committer.current.get() + 1;
    committer.current.set(generation);

    if files.is_empty() {
        committer.commit(generation, false, Vec::new());
        return generation;
    }
    if !listed && files.len() > 1 {
        debug!(count = files.len(), "single mode keeps the first file only");
    }
    let files: Vec<FileHandle> = if listed {
        files
    } else {
        files.into_iter().take(1).collect()
    };

    let batch = Rc::new(RefCell::new(Batch {
        generation,
        listed,
        results: vec![None; files.len()],
        remaining: files.len(),
    }));

    for (index, file) in files.iter().enumerate() {
        let batch = Rc::clone(&batch);
        let committer = committer.clone();
        let name = display_name(file, directory);
        let mime_type = file.mime_type.clone();
        reader.read(
            file,
            Box::new(move |result| {
                let content = match result {
                    Ok(bytes) => STANDARD.encode(bytes),
                    Err(err) => {
                        warn!(file = %name, error = %err, "file read failed; using placeholder");
                        String::new()
                    }
                };
                let finished = {
                    let mut batch = batch.borrow_mut();
                    batch.results[index] = Some(FileResult {
                        content,
                        name,
                        mime_type,
                    });
                    batch.remaining -= 1;
                    if batch.remaining == 0 {
                        let results = batch.results.drain(..).flatten().collect::<Vec<_>>();
                        Some((batch.generation, batch.listed, results))
                    } else {
                        None
                    }
                };
                if let Some((generation, listed, results)) = finished {
                    committer.commit(generation, listed, results);
                }
            }),
        );
    }
    generation
}

/// View bridging a native file picker.
pub struct FileInputView {
    caps: CapabilityProvider,
    guard: ReentrancyGuard,
    current: Rc<Cell<u64>>,
    picker: Option<Rc<dyn FilePicker>>,
}

impl FileInputView {
    #[must_use]
    pub fn new(caps: CapabilityProvider) -> Self {
        Self {
            caps,
            guard: ReentrancyGuard::new(),
            current: Rc::new(Cell::new(0)),
            picker: None,
        }
    }

    /// Generation of the most recent selection.
    #[must_use]
    pub fn selection_generation(&self) -> u64 {
        self.current.get()
    }

    fn configure(picker: &dyn FilePicker, model: &PropertyModel) -> Result<()> {
        let accept = model.get("accept")?;
        let multiple = model.get("multiple")?.as_bool().unwrap_or(false);
        let directory = model.get("directory")?.as_bool().unwrap_or(false);
        picker.configure(accept.as_str().unwrap_or_default(), multiple, directory);
        Ok(())
    }
}

impl View for FileInputView {
    fn name(&self) -> &'static str {
        "file-input"
    }

    fn render(&mut self, cx: &mut RenderContext<'_>) -> Result<RenderOutcome> {
        self.picker = None;
        let picker = self.caps.file_picker()?;
        let reader = self.caps.file_reader()?;
        Self::configure(picker.as_ref(), cx.model())?;

        let committer = Committer {
            model: cx.model().clone(),
            guard: self.guard.clone(),
            liveness: cx.liveness(),
            current: Rc::clone(&self.current),
        };
        let mut table = ListenerTable::new();
        table.on(&picker.events(), "change", move |event| {
            let files: Vec<FileHandle> = event
                .payload
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(FileHandle::from_value)
                .collect();
            let flag = |name: &str| {
                committer
                    .model
                    .get(name)
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            };
            let directory = flag("directory");
            let listed = flag("multiple") || directory;
            start_selection(&committer, &reader, files, listed, directory);
        });
        cx.scope().listen(table);
        self.picker = Some(picker);
        Ok(RenderOutcome::Ready)
    }

    fn on_field_changed(
        &mut self,
        change: &Change,
        cx: &mut RenderContext<'_>,
    ) -> Result<UpdateAction> {
        match change.field.as_str() {
            "accept" | "multiple" | "directory" => match &self.picker {
                Some(picker) => {
                    Self::configure(picker.as_ref(), cx.model())?;
                    Ok(UpdateAction::Patched)
                }
                None => Ok(UpdateAction::Ignored),
            },
            _ => Ok(UpdateAction::Ignored),
        }
    }

    fn dispose(&mut self) {
        self.picker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ReadCallback;
    use pretty_assertions::assert_eq;

    /// Reader that parks callbacks until the test resolves them.
    #[derive(Default)]
    struct ParkedReader {
        parked: RefCell<Vec<(String, ReadCallback)>>,
    }

    impl ParkedReader {
        fn resolve(&self, name: &str, result: Result<Vec<u8>>) {
            let position = self
                .parked
                .borrow()
                .iter()
                .position(|(n, _)| n == name)
                .unwrap();
            let (_, done) = self.parked.borrow_mut().remove(position);
            done(result);
        }
    }

    impl FileReader for ParkedReader {
        fn read(&self, file: &FileHandle, done: ReadCallback) {
            self.parked.borrow_mut().push((file.name.clone(), done));
        }
    }

    fn committer() -> Committer {
        Committer {
            model: PropertyModel::new("files", file_input_schema().unwrap()),
            guard: ReentrancyGuard::new(),
            liveness: Liveness::new(),
            current: Rc::new(Cell::new(0)),
        }
    }

    #[test]
    fn results_keep_selection_order() {
        let committer = committer();
        let parked = Rc::new(ParkedReader::default());
        let reader: Rc<dyn FileReader> = parked.clone();
        let files = vec![FileHandle::new("a", "text/plain"), FileHandle::new("b", "image/png")];
        start_selection(&committer, &reader, files, true, false);

        parked.resolve("b", Ok(b"BB".to_vec()));
        assert_eq!(committer.model.get("filename").unwrap(), Value::from(""));
        parked.resolve("a", Ok(b"A".to_vec()));

        assert_eq!(
            committer.model.get("value").unwrap(),
            Value::list([STANDARD.encode(b"A"), STANDARD.encode(b"BB")])
        );
        assert_eq!(committer.model.get("filename").unwrap(), Value::list(["a", "b"]));
        assert_eq!(
            committer.model.get("mime_type").unwrap(),
            Value::list(["text/plain", "image/png"])
        );
    }

    #[test]
    fn newer_selection_supersedes_older() {
        let committer = committer();
        let parked = Rc::new(ParkedReader::default());
        let reader: Rc<dyn FileReader> = parked.clone();
        start_selection(&committer, &reader, vec![FileHandle::new("old", "")], false, false);
        start_selection(&committer, &reader, vec![FileHandle::new("new", "")], false, false);

        parked.resolve("new", Ok(b"n".to_vec()));
        parked.resolve("old", Ok(b"o".to_vec()));
        assert_eq!(committer.model.get("filename").unwrap(), Value::from("new"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn unreadable_file_becomes_placeholder() {
        let committer = committer();
        let parked = Rc::new(ParkedReader::default());
        let reader: Rc<dyn FileReader> = parked.clone();
        start_selection(&committer, &reader, vec![FileHandle::new("bad", "x/y")], false, false);
        parked.resolve(
            "bad",
            Err(syncview_core::SyncError::capability("file-reader", "denied")),
        );
        assert_eq!(committer.model.get("value").unwrap(), Value::from(""));
        assert_eq!(committer.model.get("filename").unwrap(), Value::from("bad"));
        assert!(logs_contain("file read failed"));
    }

    #[test]
    fn directory_mode_uses_relative_paths() {
        let committer = committer();
        let parked = Rc::new(ParkedReader::default());
        let reader: Rc<dyn FileReader> = parked.clone();
        let file = FileHandle::new("a.csv", "text/csv").with_relative_path("data/a.csv");
        start_selection(&committer, &reader, vec![file], true, true);
        parked.resolve("a.csv", Ok(Vec::new()));
        assert_eq!(
            committer.model.get("filename").unwrap(),
            Value::list(["data/a.csv"])
        );
    }

    #[test]
    fn nothing_commits_after_detach() {
        let committer = committer();
        let parked = Rc::new(ParkedReader::default());
        let reader: Rc<dyn FileReader> = parked.clone();
        start_selection(&committer, &reader, vec![FileHandle::new("a", "")], false, false);
        committer.liveness.kill();
        parked.resolve("a", Ok(b"late".to_vec()));
        assert_eq!(committer.model.version(), 0);
    }
}
