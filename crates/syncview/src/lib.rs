#![forbid(unsafe_code)]

//! syncview public facade crate.
//!
//! Re-exports the model, runtime and widget layers and hosts the logging
//! bootstrap.

pub mod logging;

pub use logging::init_logging;
pub use syncview_core::{Origin, PropertyModel, Result, Schema, SyncError, Value};
pub use syncview_runtime::{DocumentSync, Patch, SyncConfig, ViewHost, ViewState};

pub mod prelude {
    pub use syncview_core as core;
    pub use syncview_runtime as runtime;
    #[cfg(feature = "widgets")]
    pub use syncview_widgets as widgets;
}
