use serde::{Deserialize, Serialize};

/// Payload of the `audio` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMessage {
    /// Recording session id
    pub id: u64,
    /// Base64-encoded WAV bytes; empty for the final marker
    pub data: String,
    pub is_final: bool,
    pub session_timestamp: i64,
    /// Set on the final marker only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Payload of the `file` event (one still snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMessage {
    /// Capture time, milliseconds since the Unix epoch
    pub data_timestamp: i64,
    /// `data:<mime>;base64,...` encoded still image
    pub data: String,
    pub session_timestamp: i64,
    pub user: String,
}

/// Everything the capture pipeline emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum OutboundMessage {
    Audio(AudioMessage),
    File(FileMessage),
}

impl OutboundMessage {
    pub const AUDIO: &'static str = "audio";
    pub const FILE: &'static str = "file";

    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::Audio(_) => Self::AUDIO,
            OutboundMessage::File(_) => Self::FILE,
        }
    }

    pub fn session_timestamp(&self) -> i64 {
        match self {
            OutboundMessage::Audio(msg) => msg.session_timestamp,
            OutboundMessage::File(msg) => msg.session_timestamp,
        }
    }

    /// JSON body of the event, without the event name
    pub fn payload_json(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            OutboundMessage::Audio(msg) => serde_json::to_vec(msg),
            OutboundMessage::File(msg) => serde_json::to_vec(msg),
        }
    }

    /// Rebuild a message from an event name and its JSON body
    pub fn from_event(event: &str, payload: &[u8]) -> serde_json::Result<Option<Self>> {
        Ok(match event {
            Self::AUDIO => Some(OutboundMessage::Audio(serde_json::from_slice(payload)?)),
            Self::FILE => Some(OutboundMessage::File(serde_json::from_slice(payload)?)),
            _ => None,
        })
    }
}

/// Event pushed from the backend to the capture side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
