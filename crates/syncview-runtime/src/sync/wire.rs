#![forbid(unsafe_code)]

//! Wire codec for patch batches.
//!
//! A batch encodes as a JSON envelope of document events plus an optional
//! table of binary buffers:
//!
//! ```json
//! {"events": [{"kind": "ModelChanged", "model": "m1", "attr": "value", "new": {"__buffer__": 0}}]}
//! ```
//!
//! With binary buffers enabled every `Value::Bytes` leaf is moved into
//! [`WireMessage::buffers`] and replaced by a `{"__buffer__": <index>}`
//! reference. Otherwise bytes are inlined as `{"__bytes__": "<base64>"}`.
//! The decoder accepts both forms.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use syncview_core::{INLINE_BYTES_KEY, ModelId, Result, SyncError, Value};

use super::Patch;
use crate::config::WireConfig;

/// Key of a buffer reference object.
pub const BUFFER_REF_KEY: &str = "__buffer__";

/// An encoded patch batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireMessage {
    pub json: String,
    pub buffers: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
enum DocEvent {
    ModelChanged {
        model: String,
        attr: String,
        new: serde_json::Value,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    events: Vec<DocEvent>,
}

/// Encode `patches` in order.
///
/// # Errors
///
/// `Decode` if JSON serialization fails.
pub fn encode(patches: &[Patch], config: &WireConfig) -> Result<WireMessage> {
    let mut buffers: Vec<Vec<u8>> = Vec::new();
    let events = patches
        .iter()
        .map(|patch| {
            let new = if config.binary_buffers {
                patch.value.to_json_with(&mut |bytes| {
                    let mut reference = serde_json::Map::new();
                    reference.insert(BUFFER_REF_KEY.to_owned(), buffers.len().into());
                    buffers.push(bytes.to_vec());
                    serde_json::Value::Object(reference)
                })
            } else {
                patch.value.to_json()
            };
            DocEvent::ModelChanged {
                model: patch.model.to_string(),
                attr: patch.field.clone(),
                new,
            }
        })
        .collect();
    let json = serde_json::to_string(&Envelope { events })
        .map_err(|err| SyncError::decode(format!("encode failed: {err}")))?;
    Ok(WireMessage { json, buffers })
}

/// Decode a message back into patches.
///
/// # Errors
///
/// `Decode` for malformed JSON or a reference to a missing buffer.
pub fn decode(message: &WireMessage) -> Result<Vec<Patch>> {
    let envelope: Envelope = serde_json::from_str(&message.json)
        .map_err(|err| SyncError::decode(format!("malformed message: {err}")))?;

    let mut missing: Option<u64> = None;
    let mut resolve = |obj: &serde_json::Map<String, serde_json::Value>| {
        if obj.len() != 1 {
            return None;
        }
        if let Some(id) = obj.get(BUFFER_REF_KEY).and_then(serde_json::Value::as_u64) {
            let found = usize::try_from(id)
                .ok()
                .and_then(|i| message.buffers.get(i));
            return Some(match found {
                Some(bytes) => Value::Bytes(bytes.clone()),
                None => {
                    missing.get_or_insert(id);
                    Value::Null
                }
            });
        }
        obj.get(INLINE_BYTES_KEY)
            .and_then(serde_json::Value::as_str)
            .and_then(|encoded| BASE64.decode(encoded).ok())
            .map(Value::Bytes)
    };

    let patches = envelope
        .events
        .into_iter()
        .map(|event| match event {
            DocEvent::ModelChanged { model, attr, new } => Patch {
                model: ModelId::new(model),
                field: attr,
                value: Value::from_json_with(&new, &mut resolve),
            },
        })
        .collect();

    if let Some(id) = missing {
        return Err(SyncError::decode(format!("unknown buffer id {id}")));
    }
    Ok(patches)
}
