//! Error taxonomy shared by every syncview crate.
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | `TypeMismatch` | field write | rejected, caller-visible |
//! | `ReadOnlyViolation` | client write to a server-only field | rejected, caller-visible |
//! | `MissingCapability` | render without a required capability | logged, empty render, retryable |
//! | `StaleSnapshot` | patch against a superseded snapshot | dropped |
//! | `SubscriberFault` | failing change-bus callback | isolated, first fault surfaced after the round |

use thiserror::Error;

use crate::value::ValueKind;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SyncError {
    #[error("type mismatch on `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: ValueKind,
    },

    #[error("`{field}` is server-writable only and rejects client writes")]
    ReadOnlyViolation { field: String },

    #[error("unknown field `{field}` on model `{model}`")]
    UnknownField { model: String, field: String },

    #[error("no model `{model}` is registered")]
    UnknownModel { model: String },

    #[error("value for `{field}` does not match pattern `{pattern}`")]
    PatternMismatch { field: String, pattern: String },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("capability `{capability}` is not available")]
    MissingCapability { capability: &'static str },

    #[error("patch computed against snapshot {base} but current snapshot is {current}")]
    StaleSnapshot { base: u64, current: u64 },

    #[error("subscriber for `{field}` failed: {message}")]
    SubscriberFault { field: String, message: String },

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("capability `{capability}` failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    #[error("shape {shape:?} needs {expected} elements, found {found}")]
    Shape {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl SyncError {
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn capability(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: message.into(),
        }
    }

    /// Whether a render that failed with this error may succeed on retry
    /// without any code change (the host environment may gain the capability).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MissingCapability { .. } | Self::Capability { .. } | Self::SubscriberFault { .. }
        )
    }
}
