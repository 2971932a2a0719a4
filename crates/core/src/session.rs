// crates/core/src/session.rs
//! The ticket chat session.
//!
//! Exactly one ticket can be open at a time. The session turns agent actions
//! into protocol frames and server responses into transcript state. It never
//! appends optimistically: a sent message shows up only once the server echoes
//! it back.
//!
//! Phases: `Idle` → `Opening` (history requested) → `Active` (history loaded)
//! → `Idle` (teardown).

use chrono::{DateTime, Utc};
use helpdesk_types::{
    AddAgentChat, ChatHistory, ChatMessage, CloseTicket, FileMessage, GetChat, Id, Language,
    MessageRead, MessageType, Outbound, Request, Response, Signal, TextMessage, Ticket,
    TicketContact, TicketMeta, TicketStatus,
};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::media::{self, MAX_AUDIO_BYTES, MAX_UPLOAD_BYTES};
use crate::recording::AudioClip;
use crate::transport::Transport;

pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_TEAM: &str = "Support";
pub const DEFAULT_TOPIC: &str = "Profile";

pub const CLAIM_PROMPT: &str = "Do you want to open this chat ticket?";
pub const CLOSE_PROMPT: &str = "Are you sure you want to close this ticket?";

/// Interactive yes/no confirmation.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Opening,
    Active,
}

/// Denormalized requester/ticket snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDetails {
    pub user_id: Id,
    pub display_name: String,
    pub user_email: String,
    pub user_created_at: String,
    pub user_phone_no: String,
    pub user_team_name: String,
    pub user_name: String,
    pub topic: String,
    pub update_at: DateTime<Utc>,
    pub agent_id: Option<Id>,
}

impl TicketDetails {
    /// Seed from a ticket list row, before history arrives.
    pub fn from_ticket(ticket: &Ticket, now: DateTime<Utc>) -> Self {
        let name = ticket.user_name.clone().unwrap_or_else(|| UNKNOWN.into());
        Self {
            user_id: ticket.user_id.clone().unwrap_or_else(|| Id::from(UNKNOWN)),
            display_name: name.clone(),
            user_email: String::new(),
            user_created_at: String::new(),
            user_phone_no: String::new(),
            user_team_name: ticket
                .user_team_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TEAM.into()),
            user_name: name,
            topic: ticket.topic_name.clone().unwrap_or_else(|| DEFAULT_TOPIC.into()),
            update_at: ticket.update_at.unwrap_or(now),
            agent_id: ticket.agent_id.clone(),
        }
    }

    /// Rebuild from the metadata that accompanies `getChat`.
    pub fn from_history(contact: &TicketContact, meta: &TicketMeta, now: DateTime<Utc>) -> Self {
        Self {
            user_id: contact.user_id.clone().unwrap_or_else(|| Id::from(UNKNOWN)),
            display_name: contact.display_name.clone().unwrap_or_else(|| UNKNOWN.into()),
            user_email: contact.user_email.clone().unwrap_or_default(),
            user_created_at: contact.user_created_at.clone().unwrap_or_default(),
            user_phone_no: contact.user_phone_no.clone().unwrap_or_default(),
            user_team_name: contact
                .user_team_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TEAM.into()),
            user_name: meta.user_name.clone().unwrap_or_else(|| UNKNOWN.into()),
            topic: meta.topic_name.clone().unwrap_or_else(|| DEFAULT_TOPIC.into()),
            update_at: meta.update_at.unwrap_or(now),
            agent_id: meta.agent_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The agent declined to claim the ticket; nothing changed.
    Declined,
    /// This ticket's history was already requested; only the history request
    /// was repeated.
    AlreadyOpening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyMessage,
    NoTicketOpen,
    /// Tagged with a ticket other than the one on screen.
    StaleTicket,
    Unhandled,
}

/// What a server response did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    HistoryLoaded { messages: usize },
    MessageAppended,
    /// A ticket changed status server-side; ticket lists should refetch.
    TicketsStale,
    ReadReceipt,
    Ignored(IgnoreReason),
}

/// The single ticket chat session of a console.
#[derive(Debug)]
pub struct TicketSession<T> {
    viewer: Id,
    transport: Option<T>,
    phase: SessionPhase,
    current_ticket: Option<Id>,
    messages: Vec<ChatMessage>,
    status: Option<TicketStatus>,
    details: Option<TicketDetails>,
    language: Language,
    error: Option<String>,
    ticket_closed: bool,
}

impl<T: Transport> TicketSession<T> {
    /// A session acting as `viewer`, with no connection attached yet.
    pub fn new(viewer: impl Into<Id>) -> Self {
        Self {
            viewer: viewer.into(),
            transport: None,
            phase: SessionPhase::Idle,
            current_ticket: None,
            messages: Vec::new(),
            status: None,
            details: None,
            language: Language::default(),
            error: None,
            ticket_closed: false,
        }
    }

    pub fn with_transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adopt a newly established connection. The agent is registered on it
    /// and, when a ticket is on screen, its room is rejoined and its history
    /// reloaded.
    pub fn attach(&mut self, transport: T) -> Result<(), SessionError> {
        self.transport = Some(transport);
        let result = self.announce();
        self.surface(result)
    }

    fn announce(&mut self) -> Result<(), SessionError> {
        let viewer = self.viewer.clone();
        self.emit(Signal::Register(viewer.clone()))?;
        let Some(ticket_id) = self.current_ticket.clone() else {
            return Ok(());
        };
        info!(ticket_id = %ticket_id, "rejoining ticket chat");
        self.phase = SessionPhase::Opening;
        self.emit(Signal::JoinTicketRoom(ticket_id.clone()))?;
        self.emit(Request::GetChat(GetChat {
            ticket_id,
            user_id: viewer,
        }))
    }

    /// Drop the connection handle. History stays; later emits fail with
    /// `NotConnected`.
    pub fn detach(&mut self) -> Option<T> {
        self.transport.take()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn viewer(&self) -> &Id {
        &self.viewer
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_ticket(&self) -> Option<&Id> {
        self.current_ticket.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn status(&self) -> Option<TicketStatus> {
        self.status
    }

    pub fn details(&self) -> Option<&TicketDetails> {
        self.details.as_ref()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// The error banner, if one is showing.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Record a transport-level failure on the banner.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "chat error");
        self.error = Some(message);
    }

    /// Whether a ticket was closed since the last call. Clears the flag.
    pub fn take_ticket_closed(&mut self) -> bool {
        std::mem::take(&mut self.ticket_closed)
    }

    /// The requester: sender of the first transcript message.
    pub fn receiver(&self) -> Option<&Id> {
        self.messages.first().and_then(|m| m.sender_id.as_ref())
    }

    /// Viewer is the assigned agent of an in-progress ticket. The user id
    /// counts too, for tickets where the backend did not record an assignee.
    pub fn is_assigned_agent(&self) -> bool {
        self.status == Some(TicketStatus::InProgress)
            && self.details.as_ref().is_some_and(|d| {
                d.agent_id.as_ref() == Some(&self.viewer) || d.user_id == self.viewer
            })
    }

    /// Whether input controls are enabled.
    pub fn can_compose(&self) -> bool {
        match self.status {
            Some(TicketStatus::Open) => true,
            Some(TicketStatus::InProgress) => self.is_assigned_agent(),
            Some(TicketStatus::Closed) | None => false,
        }
    }

    // ------------------------------------------------------------------
    // Agent actions
    // ------------------------------------------------------------------

    /// Open `ticket`'s chat, claiming it first if it is unassigned.
    pub fn open(
        &mut self,
        ticket: &Ticket,
        confirm: &mut impl Confirm,
    ) -> Result<OpenOutcome, SessionError> {
        let result = self.try_open(ticket, confirm);
        self.surface(result)
    }

    fn try_open(
        &mut self,
        ticket: &Ticket,
        confirm: &mut impl Confirm,
    ) -> Result<OpenOutcome, SessionError> {
        self.require_connection()?;

        if self.phase == SessionPhase::Opening && self.current_ticket.as_ref() == Some(&ticket.id) {
            debug!(ticket_id = %ticket.id, "ticket history still pending, requesting again");
            self.emit(Request::GetChat(GetChat {
                ticket_id: ticket.id.clone(),
                user_id: self.viewer.clone(),
            }))?;
            return Ok(OpenOutcome::AlreadyOpening);
        }

        let claiming = ticket.status == TicketStatus::Open;
        if claiming && !confirm.confirm(CLAIM_PROMPT) {
            info!(ticket_id = %ticket.id, "claim declined");
            return Ok(OpenOutcome::Declined);
        }

        if self.current_ticket.is_some() {
            self.teardown();
        }

        let viewer = self.viewer.clone();
        let ticket_id = ticket.id.clone();

        if claiming {
            self.emit(Request::AddAgentChat(AddAgentChat {
                sender_id: viewer.clone(),
                ticket_id: ticket_id.clone(),
                user_id: ticket.user_id.clone(),
                language: ticket.language,
            }))?;
        }

        self.current_ticket = Some(ticket_id.clone());
        self.messages.clear();
        self.status = None;
        self.language = ticket.language;
        self.details = Some(TicketDetails::from_ticket(ticket, Utc::now()));
        self.phase = SessionPhase::Opening;
        info!(ticket_id = %ticket_id, status = %ticket.status, claiming, "opening ticket chat");

        self.emit(Signal::Register(viewer.clone()))?;
        self.emit(Signal::JoinTicketRoom(ticket_id.clone()))?;
        self.emit(Signal::AdminOpenChat(ticket_id.clone()))?;
        self.emit(Request::GetChat(GetChat {
            ticket_id,
            user_id: viewer,
        }))?;
        Ok(OpenOutcome::Opened)
    }

    /// Send a text message to the requester. The caller clears its input on
    /// `Ok`; the message appears once the server echoes it.
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        let result = self.try_send_text(text, None);
        self.surface(result)
    }

    /// Ask the requester to attach an image or video, in their language.
    pub fn request_upload(&mut self) -> Result<(), SessionError> {
        let prompt = self.language.upload_prompt();
        let result = self.try_send_text(prompt, Some("true".into()));
        self.surface(result)
    }

    fn try_send_text(&mut self, text: &str, upload: Option<String>) -> Result<(), SessionError> {
        let ticket_id = self.require_composable()?;
        let body = text.trim();
        if body.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let receiver_id = self.require_route()?;
        self.emit(Request::SendAgentMessage(TextMessage {
            sender_id: self.viewer.clone(),
            receiver_id,
            ticket_id,
            message: body.to_string(),
            kind: MessageType::Text,
            upload,
        }))
    }

    /// Send a file picked from disk. Rejected locally above 10 MiB.
    pub fn send_media(&mut self, file_name: &str, bytes: &[u8]) -> Result<(), SessionError> {
        let result = self.try_send_media(file_name, bytes);
        self.surface(result)
    }

    fn try_send_media(&mut self, file_name: &str, bytes: &[u8]) -> Result<(), SessionError> {
        let ticket_id = self.require_composable()?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(SessionError::FileTooLarge {
                size: bytes.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        let receiver_id = self.require_route()?;
        let file = media::data_url(media::mime_for(file_name), bytes);
        debug!(ticket_id = %ticket_id, file_name, size = bytes.len(), "sending media");
        self.emit(Request::AddMessage(FileMessage {
            sender_id: self.viewer.clone(),
            receiver_id,
            ticket_id,
            kind: MessageType::Media,
            file,
            file_name: file_name.to_string(),
            is_bot: 1,
            message: None,
            language: None,
        }))
    }

    /// Send a recorded voice note. Rejected locally above 5 MiB.
    pub fn send_audio(&mut self, clip: AudioClip) -> Result<(), SessionError> {
        let result = self.try_send_audio(clip);
        self.surface(result)
    }

    fn try_send_audio(&mut self, clip: AudioClip) -> Result<(), SessionError> {
        let ticket_id = self.require_composable()?;
        if clip.bytes.len() > MAX_AUDIO_BYTES {
            return Err(SessionError::AudioTooLarge {
                size: clip.bytes.len(),
                limit: MAX_AUDIO_BYTES,
            });
        }
        let receiver_id = self.require_route()?;
        let file = media::data_url(media::AUDIO_MIME, &clip.bytes);
        debug!(ticket_id = %ticket_id, file_name = %clip.file_name, size = clip.bytes.len(), "sending audio");
        self.emit(Request::AddMessage(FileMessage {
            sender_id: self.viewer.clone(),
            receiver_id,
            ticket_id,
            kind: MessageType::Audio,
            file,
            file_name: clip.file_name,
            is_bot: 0,
            message: Some(String::new()),
            language: Some(self.language),
        }))
    }

    /// Check everything a send needs without sending. Front ends call this
    /// before starting a recording.
    pub fn ensure_can_send(&mut self) -> Result<(), SessionError> {
        let result = self
            .require_composable()
            .and_then(|_| self.require_route())
            .map(|_| ());
        self.surface(result)
    }

    /// Close the open ticket after confirmation, then tear the session down.
    pub fn close_ticket(&mut self, confirm: &mut impl Confirm) -> Result<CloseOutcome, SessionError> {
        let result = self.try_close(confirm);
        self.surface(result)
    }

    fn try_close(&mut self, confirm: &mut impl Confirm) -> Result<CloseOutcome, SessionError> {
        let ticket_id = self.current_ticket.clone().ok_or(SessionError::NoTicketOpen)?;
        self.require_connection()?;
        if !confirm.confirm(CLOSE_PROMPT) {
            return Ok(CloseOutcome::Declined);
        }
        self.emit(Request::CloseTicket(CloseTicket {
            ticket_id: ticket_id.clone(),
        }))?;
        info!(ticket_id = %ticket_id, "ticket closed by agent");
        self.ticket_closed = true;
        self.teardown();
        Ok(CloseOutcome::Closed)
    }

    /// Leave the current ticket's room and reset to `Idle`. The only path
    /// that clears the transcript.
    pub fn teardown(&mut self) {
        if let Some(ticket_id) = self.current_ticket.take() {
            if let Some(transport) = &self.transport {
                if let Err(e) = transport.emit(Signal::LeaveTicketRoom(ticket_id.clone()).into()) {
                    warn!(ticket_id = %ticket_id, error = %e, "failed to leave ticket room");
                }
            }
            info!(ticket_id = %ticket_id, "left ticket chat");
        }
        self.messages.clear();
        self.status = None;
        self.details = None;
        self.phase = SessionPhase::Idle;
    }

    // ------------------------------------------------------------------
    // Server responses
    // ------------------------------------------------------------------

    pub fn handle(&mut self, response: Response) -> SessionUpdate {
        match response {
            Response::NewMessage { message, .. } => self.on_message(message),
            Response::Chat(history) => self.on_history(history),
            Response::TicketClosed { messages } => self.on_ticket_closed(messages),
            Response::MessageRead(data) => {
                debug!(%data, "message marked as read");
                SessionUpdate::ReadReceipt
            }
            Response::Unhandled { event } => {
                warn!(%event, "unhandled socket event");
                self.error = Some("Received unsupported response from server".into());
                SessionUpdate::Ignored(IgnoreReason::Unhandled)
            }
        }
    }

    fn on_history(&mut self, history: ChatHistory) -> SessionUpdate {
        let Some(current) = self.current_ticket.clone() else {
            debug!("chat history arrived with no ticket open");
            return SessionUpdate::Ignored(IgnoreReason::NoTicketOpen);
        };
        if let Some(id) = &history.meta.id {
            if *id != current {
                warn!(ticket_id = %id, current = %current, "discarding stale chat history");
                return SessionUpdate::Ignored(IgnoreReason::StaleTicket);
            }
        }

        let ChatHistory {
            messages,
            contact,
            meta,
        } = history;
        self.messages = messages.into_iter().filter(|m| !m.is_empty()).collect();
        self.status = Some(meta.status.unwrap_or_default());
        self.language = meta.language.unwrap_or_default();
        self.details = Some(TicketDetails::from_history(&contact, &meta, Utc::now()));
        self.phase = SessionPhase::Active;
        info!(ticket_id = %current, messages = self.messages.len(), status = ?self.status, "chat history loaded");

        if let Some(id) = meta.id {
            self.mark_read(id);
        }
        SessionUpdate::HistoryLoaded {
            messages: self.messages.len(),
        }
    }

    fn on_message(&mut self, message: ChatMessage) -> SessionUpdate {
        if message.is_empty() {
            return SessionUpdate::Ignored(IgnoreReason::EmptyMessage);
        }
        let Some(current) = self.current_ticket.clone() else {
            return SessionUpdate::Ignored(IgnoreReason::NoTicketOpen);
        };
        if message.ticket_id.as_ref().is_some_and(|t| *t != current) {
            debug!(ticket_id = ?message.ticket_id, current = %current, "message for another ticket");
            return SessionUpdate::Ignored(IgnoreReason::StaleTicket);
        }

        let read_now =
            message.ticket_id.as_ref() == Some(&current) && message.receiver_id.as_ref() == Some(&self.viewer);
        self.messages.push(message);
        if read_now {
            self.mark_read(current);
        }
        SessionUpdate::MessageAppended
    }

    fn on_ticket_closed(&mut self, messages: Vec<ChatMessage>) -> SessionUpdate {
        if let Some(current) = self.current_ticket.clone() {
            let mut closes_current = false;
            for message in messages.into_iter().filter(|m| !m.is_empty()) {
                match &message.ticket_id {
                    Some(t) if *t != current => continue,
                    Some(_) => closes_current = true,
                    None => {}
                }
                self.messages.push(message);
            }
            if closes_current {
                info!(ticket_id = %current, "open ticket was closed");
                self.status = Some(TicketStatus::Closed);
            }
        }
        SessionUpdate::TicketsStale
    }

    fn mark_read(&mut self, ticket_id: Id) {
        let reader_id = self.viewer.clone();
        if let Err(e) = self.emit(Request::MessageRead(MessageRead {
            ticket_id,
            reader_id,
        })) {
            self.report_error(e.to_string());
        }
    }

    // ------------------------------------------------------------------
    // Preconditions
    // ------------------------------------------------------------------

    fn require_connection(&self) -> Result<&T, SessionError> {
        match &self.transport {
            Some(t) if t.is_connected() => Ok(t),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn require_composable(&self) -> Result<Id, SessionError> {
        let ticket_id = self.current_ticket.clone().ok_or(SessionError::NoTicketOpen)?;
        if !self.can_compose() {
            return Err(SessionError::ReadOnly {
                status: self.status,
            });
        }
        Ok(ticket_id)
    }

    fn require_route(&self) -> Result<Id, SessionError> {
        self.require_connection()?;
        self.receiver().cloned().ok_or(SessionError::MissingReceiver)
    }

    fn emit(&self, outbound: impl Into<Outbound>) -> Result<(), SessionError> {
        let outbound = outbound.into();
        let transport = self.require_connection()?;
        debug!(event = outbound.name(), ticket_id = ?outbound.ticket_id(), "emit");
        transport.emit(outbound)?;
        Ok(())
    }

    fn surface<R>(&mut self, result: Result<R, SessionError>) -> Result<R, SessionError> {
        if let Err(e) = &result {
            if e.is_precondition() {
                info!(error = %e, ticket_id = ?self.current_ticket, "chat action rejected");
            } else {
                warn!(error = %e, ticket_id = ?self.current_ticket, "chat action failed");
            }
            self.error = Some(e.to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_details_from_bare_ticket_use_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let details = TicketDetails::from_ticket(&Ticket::new("42", TicketStatus::Open), now);
        assert_eq!(details.user_id, Id::from("Unknown"));
        assert_eq!(details.display_name, "Unknown");
        assert_eq!(details.user_team_name, "Support");
        assert_eq!(details.topic, "Profile");
        assert_eq!(details.update_at, now);
        assert_eq!(details.agent_id, None);
    }

    #[test]
    fn test_details_from_history_prefers_server_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let updated = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        let contact = TicketContact {
            user_id: Some(Id::from("501")),
            display_name: Some("Ravi".into()),
            user_email: Some("ravi@example.com".into()),
            ..Default::default()
        };
        let meta = TicketMeta {
            user_name: Some("ravi_k".into()),
            topic_name: Some("Withdrawal".into()),
            update_at: Some(updated),
            agent_id: Some(Id::from("7")),
            ..Default::default()
        };
        let details = TicketDetails::from_history(&contact, &meta, now);
        assert_eq!(details.display_name, "Ravi");
        assert_eq!(details.user_email, "ravi@example.com");
        assert_eq!(details.user_phone_no, "");
        assert_eq!(details.user_team_name, "Support");
        assert_eq!(details.user_name, "ravi_k");
        assert_eq!(details.topic, "Withdrawal");
        assert_eq!(details.update_at, updated);
        assert_eq!(details.agent_id, Some(Id::from("7")));
    }

    #[test]
    fn test_closure_confirm() {
        let mut asked = Vec::new();
        let mut confirm = |prompt: &str| {
            asked.push(prompt.to_string());
            false
        };
        assert!(!Confirm::confirm(&mut confirm, CLOSE_PROMPT));
        assert_eq!(asked, vec![CLOSE_PROMPT.to_string()]);
    }
}
