#![forbid(unsafe_code)]

//! Runtime for syncview views.
//!
//! This crate provides:
//! - [`ViewHost`] / [`View`] lifecycle-managed views with contained faults
//! - [`BindingScope`] and [`ListenerTable`] deterministic resource teardown
//! - [`ReentrancyGuard`] feedback-loop protection for event bridges
//! - [`DocumentSync`] the remote document boundary and its wire codec
//! - [`SyncConfig`] serde configuration

pub mod config;
pub mod guard;
pub mod lifecycle;
pub mod listener;
pub mod scope;
pub mod sync;
pub mod view;

pub use config::{LoggingConfig, PlotEventConfig, SyncConfig, WireConfig};
pub use guard::{GuardToken, ReentrancyGuard};
pub use lifecycle::{Liveness, ReadySignal, ViewLifecycle, ViewState};
pub use listener::{EventSource, Handler, ListenerId, ListenerTable, NativeEvent};
pub use scope::BindingScope;
pub use sync::{DocumentSync, Patch, WireMessage};
pub use view::{RenderContext, RenderOutcome, UpdateAction, View, ViewHost};
