use serde::{Deserialize, Serialize};

use crate::constants::MessageKind;

/// Notification carried over the job status stream.
///
/// The `data` payload is opaque at this layer: its shape depends on `kind`
/// and is left to the consumer. A frame without `data` decodes to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl StatusMessage {
    /// Creates a message of the given kind.
    pub fn new(kind: MessageKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    pub fn progress(data: serde_json::Value) -> Self {
        Self::new(MessageKind::Progress, data)
    }

    pub fn status(data: serde_json::Value) -> Self {
        Self::new(MessageKind::Status, data)
    }

    pub fn error(data: serde_json::Value) -> Self {
        Self::new(MessageKind::Error, data)
    }

    /// Decodes a text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encodes the message as a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the payload into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
