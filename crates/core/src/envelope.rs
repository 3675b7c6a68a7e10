//! The uniform message unit exchanged over a client connection.
//!
//! ```json
//! { "id": "example", "func": "Subsystem::operation", "data": ["value", 2, true] }
//! ```
//!
//! Calls carry a caller-chosen `id`; replies echo it. Server-initiated
//! broadcasts always carry an empty `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation token. Empty for broadcasts.
    #[serde(default)]
    pub id: String,

    /// Dotted `Subsystem::operation` name.
    pub func: String,

    /// Positional arguments (calls) or results (replies, events).
    #[serde(default)]
    pub data: Vec<Value>,
}

impl Envelope {
    /// Build a call envelope.
    pub fn call(id: impl Into<String>, func: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            func: func.into(),
            data,
        }
    }

    /// Build a server-initiated broadcast envelope (empty `id`).
    pub fn event(func: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            id: String::new(),
            func: func.into(),
            data,
        }
    }

    /// Build the reply to this envelope, reusing its `id` and `func`.
    pub fn reply(&self, data: Vec<Value>) -> Self {
        Self {
            id: self.id.clone(),
            func: self.func.clone(),
            data,
        }
    }

    /// Parse an envelope from a raw text or binary frame.
    ///
    /// The frame must be a JSON object with a string `func`; anything else
    /// is a protocol error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Validation(format!("frame is not valid JSON: {e}")))?;

        if !value.is_object() {
            return Err(CoreError::Validation(
                "frame is not a JSON object".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| CoreError::Validation(format!("malformed envelope: {e}")))
    }

    /// Serialize to the compact JSON text sent over the wire.
    pub fn to_json(&self) -> String {
        // Serializing a struct of strings and JSON values cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
