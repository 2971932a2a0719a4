// crates/types/src/message.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::id::{self, Id};
use crate::lenient;

/// Payload kind of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Media,
    Audio,
    #[default]
    #[serde(other)]
    Text,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Media => "media",
            Self::Audio => "audio",
        }
    }

    fn lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        lenient::null_as_default(d)
    }
}

/// One entry of a ticket transcript.
///
/// For `media` and `audio` messages `message` carries the stored file name;
/// `file` carries an inline payload when the server echoes one back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "id::optional::deserialize", skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub sender_id: Option<Id>,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub receiver_id: Option<Id>,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub ticket_id: Option<Id>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient::text::deserialize", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "MessageType::lenient")]
    pub kind: MessageType,
    #[serde(default, with = "lenient::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn text(sender: impl Into<Id>, receiver: impl Into<Id>, ticket: impl Into<Id>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id: Some(sender.into()),
            receiver_id: Some(receiver.into()),
            ticket_id: Some(ticket.into()),
            message: body.into(),
            file: None,
            file_name: None,
            kind: MessageType::Text,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_kind(mut self, kind: MessageType) -> Self {
        self.kind = kind;
        self
    }

    /// No text and no file reference. Such frames are never kept.
    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.file.as_deref().map_or(true, str::is_empty)
    }

    /// Lowercased extension of the `message` field, if it has one.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.message.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}
