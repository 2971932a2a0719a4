// crates/types/src/protocol.rs
//! The helpdesk messaging protocol.
//!
//! Outgoing traffic is either a `req` event carrying `{en, data}` or a bare
//! room/presence signal. Incoming traffic arrives on the `res` event as
//! `{en, data, ticketInfo?, ticketData?}` and is decoded once, here, into
//! [`Response`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::id::Id;
use crate::message::{ChatMessage, MessageType};
use crate::ticket::{Language, TicketContact, TicketMeta};

/// Socket event carrying protocol requests.
pub const REQUEST_EVENT: &str = "req";
/// Socket event carrying protocol responses.
pub const RESPONSE_EVENT: &str = "res";
/// Socket event carrying server-side error notifications.
pub const ERROR_EVENT: &str = "error";

// ============================================================================
// Outgoing
// ============================================================================

/// Claim an unassigned ticket for the sending agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddAgentChat {
    pub sender_id: Id,
    pub ticket_id: Id,
    pub user_id: Option<Id>,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetChat {
    pub ticket_id: Id,
    pub user_id: Id,
}

/// Text message from the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub sender_id: Id,
    pub receiver_id: Id,
    pub ticket_id: Id,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// `"true"` when the text is the canned upload prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<String>,
}

/// Media or audio message from the agent, payload inlined as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMessage {
    pub sender_id: Id,
    pub receiver_id: Id,
    pub ticket_id: Id,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub file: String,
    pub file_name: String,
    pub is_bot: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRead {
    pub ticket_id: Id,
    pub reader_id: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseTicket {
    pub ticket_id: Id,
}

/// A request sent on the `req` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "en", content = "data", rename_all = "camelCase")]
pub enum Request {
    AddAgentChat(AddAgentChat),
    GetChat(GetChat),
    SendAgentMessage(TextMessage),
    AddMessage(FileMessage),
    MessageRead(MessageRead),
    CloseTicket(CloseTicket),
}

impl Request {
    /// The `en` discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddAgentChat(_) => "addAgentChat",
            Self::GetChat(_) => "getChat",
            Self::SendAgentMessage(_) => "sendAgentMessage",
            Self::AddMessage(_) => "addMessage",
            Self::MessageRead(_) => "messageRead",
            Self::CloseTicket(_) => "closeTicket",
        }
    }

    /// Ticket this request is about.
    pub fn ticket_id(&self) -> &Id {
        match self {
            Self::AddAgentChat(r) => &r.ticket_id,
            Self::GetChat(r) => &r.ticket_id,
            Self::SendAgentMessage(r) => &r.ticket_id,
            Self::AddMessage(r) => &r.ticket_id,
            Self::MessageRead(r) => &r.ticket_id,
            Self::CloseTicket(r) => &r.ticket_id,
        }
    }
}

/// Bare socket events outside the `req` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Bind this connection to an agent id.
    Register(Id),
    JoinTicketRoom(Id),
    LeaveTicketRoom(Id),
    /// Presence: the agent has the ticket's chat on screen.
    AdminOpenChat(Id),
}

impl Signal {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::JoinTicketRoom(_) => "joinTicketRoom",
            Self::LeaveTicketRoom(_) => "leaveTicketRoom",
            Self::AdminOpenChat(_) => "adminOpenChat",
        }
    }

    pub fn argument(&self) -> &Id {
        match self {
            Self::Register(id)
            | Self::JoinTicketRoom(id)
            | Self::LeaveTicketRoom(id)
            | Self::AdminOpenChat(id) => id,
        }
    }
}

/// Everything the client can put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Request(Request),
    Signal(Signal),
}

impl Outbound {
    /// Socket event name this is emitted under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Request(_) => REQUEST_EVENT,
            Self::Signal(signal) => signal.event_name(),
        }
    }

    /// Single event argument.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Request(request) => serde_json::to_value(request),
            Self::Signal(signal) => serde_json::to_value(signal.argument()),
        }
    }

    /// Ticket the emission concerns; `register` concerns none.
    pub fn ticket_id(&self) -> Option<&Id> {
        match self {
            Self::Request(request) => Some(request.ticket_id()),
            Self::Signal(Signal::Register(_)) => None,
            Self::Signal(signal) => Some(signal.argument()),
        }
    }

    /// Short name for logs and assertions: the request's `en`, or the signal's
    /// event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request(request) => request.name(),
            Self::Signal(signal) => signal.event_name(),
        }
    }
}

impl From<Request> for Outbound {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Signal> for Outbound {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

// ============================================================================
// Incoming
// ============================================================================

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Received invalid response from server")]
    MalformedEnvelope,

    #[error("Received invalid {event} payload from server: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Received non-JSON frame from server: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// The raw `res` frame, before dispatch on `en`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, rename = "ticketInfo")]
    pub ticket_info: Option<Value>,
    #[serde(default, rename = "ticketData")]
    pub ticket_data: Option<Value>,
}

/// Which request produced a new-message echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// `sendAgentMessage`: a text message from an agent.
    Agent,
    /// `addMessage`: media, audio, or a bot/user message.
    Added,
}

/// Full transcript plus ticket metadata, answer to `getChat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
    pub contact: TicketContact,
    pub meta: TicketMeta,
}

/// A decoded `res` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    NewMessage {
        origin: MessageOrigin,
        message: ChatMessage,
    },
    Chat(ChatHistory),
    /// Tail messages emitted when a ticket is closed.
    TicketClosed { messages: Vec<ChatMessage> },
    /// Read receipt acknowledgement. Informational.
    MessageRead(Value),
    /// An `en` this client does not handle.
    Unhandled { event: String },
}

impl Response {
    pub fn decode_str(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame)?;
        Self::decode(value)
    }

    pub fn decode(value: Value) -> Result<Self, ProtocolError> {
        let envelope: ResponseEnvelope =
            serde_json::from_value(value).map_err(|_| ProtocolError::MalformedEnvelope)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: ResponseEnvelope) -> Result<Self, ProtocolError> {
        let event = match envelope.en {
            Some(en) if !en.is_empty() => en,
            _ => return Err(ProtocolError::MalformedEnvelope),
        };
        let data = match envelope.data {
            Some(data) if is_present(&data) => data,
            _ => return Err(ProtocolError::MalformedEnvelope),
        };

        let invalid = |source| ProtocolError::InvalidPayload {
            event: event.clone(),
            source,
        };

        match event.as_str() {
            "sendAgentMessage" | "addMessage" => {
                let origin = if event == "sendAgentMessage" {
                    MessageOrigin::Agent
                } else {
                    MessageOrigin::Added
                };
                let message = serde_json::from_value(data).map_err(invalid)?;
                Ok(Self::NewMessage { origin, message })
            }
            "getChat" => {
                let messages = serde_json::from_value(data).map_err(invalid)?;
                let contact = decode_optional(envelope.ticket_info).map_err(invalid)?;
                let meta = decode_optional(envelope.ticket_data).map_err(invalid)?;
                Ok(Self::Chat(ChatHistory {
                    messages,
                    contact,
                    meta,
                }))
            }
            "closeTicket" => {
                let messages = match data {
                    Value::Array(_) => serde_json::from_value(data).map_err(invalid)?,
                    // Closing without tail messages is acknowledged with a flag.
                    _ => Vec::new(),
                };
                Ok(Self::TicketClosed { messages })
            }
            "messageRead" => Ok(Self::MessageRead(data)),
            _ => Ok(Self::Unhandled { event }),
        }
    }

    pub fn event_name(&self) -> &str {
        match self {
            Self::NewMessage {
                origin: MessageOrigin::Agent,
                ..
            } => "sendAgentMessage",
            Self::NewMessage {
                origin: MessageOrigin::Added,
                ..
            } => "addMessage",
            Self::Chat(_) => "getChat",
            Self::TicketClosed { .. } => "closeTicket",
            Self::MessageRead(_) => "messageRead",
            Self::Unhandled { event } => event,
        }
    }
}

/// `null`, `false`, `0` and `""` count as a missing `data` field.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn decode_optional<T>(value: Option<Value>) -> Result<T, serde_json::Error>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value),
    }
}
