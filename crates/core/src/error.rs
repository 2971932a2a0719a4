// crates/core/src/error.rs
use helpdesk_types::TicketStatus;
use thiserror::Error;

const MIB: usize = 1024 * 1024;

/// Failure to put a frame on the wire.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("connection closed")]
    Closed,

    #[error("failed to encode {event} payload: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the ticket session. Display text is what the agent sees.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Socket not initialized")]
    NotConnected,

    #[error("No ticket is open")]
    NoTicketOpen,

    #[error("Invalid sender or receiver ID")]
    MissingReceiver,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Ticket is read-only ({})", .status.map_or("not loaded", |s| s.as_str()))]
    ReadOnly { status: Option<TicketStatus> },

    #[error("File size exceeds {}MB limit", .limit / MIB)]
    FileTooLarge { size: usize, limit: usize },

    #[error("Audio file size exceeds {}MB limit", .limit / MIB)]
    AudioTooLarge { size: usize, limit: usize },

    #[error("Socket error: {0}")]
    Transport(#[from] EmitError),
}

impl SessionError {
    /// Precondition failures are detected before anything is sent.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

/// Errors from the ticket list store.
#[derive(Debug, Error)]
pub enum TicketListError<E> {
    #[error("Page must be at least 1, got {0}")]
    InvalidPage(usize),

    #[error("{0}")]
    Source(#[source] E),
}

/// Errors from microphone capture.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Failed to access microphone: {0}")]
    MicrophoneUnavailable(String),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Audio file size exceeds {}MB limit", .limit / MIB)]
    TooLarge { size: usize, limit: usize },
}

/// Errors building the agent context at the process boundary.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Session expired. Please log in again.")]
    NotLoggedIn,

    #[error("Agent ID not found")]
    MissingAgentId,
}
