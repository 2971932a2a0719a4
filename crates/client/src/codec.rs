// crates/client/src/codec.rs
//! Engine.IO v4 / Socket.IO v5 text framing, default namespace only.
//!
//! An Engine.IO packet is a one-digit type followed by its data. Socket.IO
//! packets ride inside Engine.IO `message` (`4`) packets, so a Socket.IO event
//! on the wire is `42["name", arg]`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Join the default namespace.
pub const CONNECT: &str = "40";
/// Engine.IO close.
pub const CLOSE: &str = "1";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownPacket(char),

    #[error("malformed {packet} packet: {source}")]
    Json {
        packet: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("event packet without a name")]
    MissingEventName,
}

/// Engine.IO handshake data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(OpenPacket),
    Close,
    Ping(String),
    Pong(String),
    Noop,
    /// Namespace joined.
    Connected,
    /// Namespace join refused, with the server's reason.
    ConnectError(String),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    /// A Socket.IO packet this client has no use for (acks, binary).
    Ignored(char),
}

pub fn decode(text: &str) -> Result<Frame, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(Frame::Open)
            .map_err(|source| CodecError::Json {
                packet: "open",
                source,
            }),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping(rest.to_string())),
        '3' => Ok(Frame::Pong(rest.to_string())),
        '4' => decode_socket(rest),
        '6' => Ok(Frame::Noop),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

fn decode_socket(text: &str) -> Result<Frame, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnect),
        '2' => decode_event(rest),
        '4' => Ok(Frame::ConnectError(connect_error_message(rest))),
        '3' | '5' | '6' => Ok(Frame::Ignored(kind)),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

fn decode_event(text: &str) -> Result<Frame, CodecError> {
    // Optional ack id before the array.
    let body = text.trim_start_matches(|c: char| c.is_ascii_digit());
    let mut items: Vec<Value> = serde_json::from_str(body).map_err(|source| CodecError::Json {
        packet: "event",
        source,
    })?;
    if items.is_empty() {
        return Err(CodecError::MissingEventName);
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(CodecError::MissingEventName),
    };
    Ok(Frame::Event { name, args: items })
}

fn connect_error_message(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string()),
        Ok(Value::String(s)) => s,
        _ => text.to_string(),
    }
}

/// `42["name",payload]`.
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), payload.clone()]))
}

/// Answer to a server ping, echoing its data.
pub fn pong(data: &str) -> String {
    format!("3{data}")
}
