#![forbid(unsafe_code)]

//! Core data model for syncview.
//!
//! This crate provides:
//! - [`PropertyModel`] typed, origin-tagged property records
//! - [`Schema`] / [`FieldSpec`] declarative field definitions
//! - [`ChangeBus`] per-field change notification with RAII [`Subscription`]s
//! - [`SyncError`] the error taxonomy shared by every syncview crate

pub mod bus;
pub mod error;
pub mod model;
pub mod schema;
pub mod value;

pub use bus::{Callback, Change, ChangeBus, Origin, Subscription, SubscriptionId, Topic};
pub use error::{Result, SyncError};
pub use model::{ModelId, PropertyModel};
pub use schema::{FieldSpec, Mutability, Schema};
pub use value::{FieldType, INLINE_BYTES_KEY, Value, ValueKind};
