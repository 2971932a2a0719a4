// crates/client/src/console.rs
//! Line-oriented terminal front end: one `tokio::select!` loop over stdin and
//! the socket's events.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Local, Utc};
use helpdesk_core::{
    AgentContext, AudioClip, AutoConfirm, Body, CloseOutcome, ContextError, CookieJar, Microphone, OpenOutcome,
    Recorder, RecordingError, RenderedMessage, Renderer, SessionUpdate, TicketListError, TicketListStore,
    TicketSession, CLAIM_PROMPT, CLOSE_PROMPT,
};
use helpdesk_types::{Id, Ticket, TicketStatus};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::ConsoleConfig;
use crate::connection::{ConnectionManager, SocketEvent, SocketHandle, TransportError};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tickets(TicketStatus),
    Page(usize),
    Search(String),
    Open(Id),
    Close,
    Leave,
    RequestUpload,
    File(PathBuf),
    Voice(PathBuf),
    Refresh,
    Reconnect,
    DismissError,
    Help,
    Quit,
    Send(String),
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let arg = arg.trim();
        match name {
            "tickets" | "status" => {
                let status = if arg.is_empty() { "open" } else { arg };
                status.parse().map_or_else(Self::Invalid, Self::Tickets)
            }
            "page" => arg
                .parse()
                .map_or_else(|_| Self::Invalid(format!("not a page number: {arg}")), Self::Page),
            "search" => Self::Search(arg.to_string()),
            "open" if !arg.is_empty() => Self::Open(Id::new(arg)),
            "close" => Self::Close,
            "leave" => Self::Leave,
            "ask-upload" => Self::RequestUpload,
            "file" if !arg.is_empty() => Self::File(PathBuf::from(arg)),
            "voice" if !arg.is_empty() => Self::Voice(PathBuf::from(arg)),
            "refresh" => Self::Refresh,
            "reconnect" => Self::Reconnect,
            "dismiss" => Self::DismissError,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Invalid(format!("unknown command: /{name} (try /help)")),
        }
    }
}

const HELP: &str = "\
/tickets [open|in_progress|closed]  switch status tab
/page N                             show page N
/search TEXT                        filter the current page
/open ID                            open a ticket's chat
/close                              close the open ticket
/leave                              leave the open ticket
/ask-upload                         ask the requester for an image or video
/file PATH                          send a file (10MB max)
/voice PATH                         send a recorded voice note (5MB max)
/refresh  /reconnect  /dismiss  /quit
anything else is sent as a message";

/// A yes/no question waiting for the next input line.
enum Pending {
    Claim(Ticket),
    Close,
}

/// Plays back a recorded webm file as if it came from a capture device.
pub struct FileMicrophone {
    path: PathBuf,
    captured: Option<Vec<u8>>,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            captured: None,
        }
    }

    /// Hand over what was captured, in device-sized chunks.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.captured
            .take()
            .map(|bytes| bytes.chunks(64 * 1024).map(<[u8]>::to_vec).collect())
            .unwrap_or_default()
    }
}

impl Microphone for FileMicrophone {
    fn acquire(&mut self) -> Result<(), RecordingError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| RecordingError::MicrophoneUnavailable(format!("{}: {e}", self.path.display())))?;
        self.captured = Some(bytes);
        Ok(())
    }

    fn release(&mut self) {
        self.captured = None;
    }
}

pub struct Console {
    context: AgentContext,
    cookies: CookieJar,
    socket_url: String,
    connection: ConnectionManager,
    events: Option<UnboundedReceiver<SocketEvent>>,
    session: TicketSession<SocketHandle>,
    store: TicketListStore<ApiClient>,
    pending: Option<Pending>,
}

impl Console {
    pub fn new(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let cookies = config.cookies();
        let context = AgentContext::from_cookies(&cookies, config.endpoints())?;
        let api = ApiClient::new(&context)?;
        let tz = local_offset();
        Ok(Self {
            cookies,
            socket_url: context.endpoints.socket_url.clone(),
            session: TicketSession::new(context.agent_id.clone()),
            store: TicketListStore::new(api, tz),
            connection: ConnectionManager::new().with_handshake_timeout(config.handshake_timeout),
            events: None,
            pending: None,
            context,
        })
    }

    /// The login cookies, as left by the last API call.
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Print one page of tickets and return.
    pub async fn list(&mut self, status: TicketStatus, page: usize) -> Result<(), ConsoleError> {
        self.fetch(status, page).await?;
        Ok(())
    }

    /// Interactive chat loop. Returns on `/quit`, end of input, or an
    /// expired login.
    pub async fn run(&mut self, status: TicketStatus) -> Result<(), ConsoleError> {
        self.connect().await?;
        self.fetch(status, 1).await?;
        println!("Type /help for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.on_line(&line).await? {
                        break;
                    }
                }
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.on_socket_event(event).await?,
                    None => self.events = None,
                },
            }
        }

        self.session.teardown();
        self.connection.disconnect();
        Ok(())
    }

    /// Connect if not connected. A new connection registers the agent and
    /// rejoins the open ticket, if any.
    async fn connect(&mut self) -> Result<(), ConsoleError> {
        let Some(events) = self.connection.connect(&self.socket_url).await? else {
            return Ok(());
        };
        self.events = Some(events);
        if let Some(handle) = self.connection.current() {
            if self.session.attach(handle).is_err() {
                self.print_error();
            }
        }
        info!(agent_id = %self.context.agent_id, "chat ready");
        Ok(())
    }

    /// Returns `false` to stop the loop.
    async fn on_line(&mut self, line: &str) -> Result<bool, ConsoleError> {
        if let Some(pending) = self.pending.take() {
            let answer = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
            self.answer(pending, answer);
            return Ok(true);
        }

        match Command::parse(line) {
            Command::Tickets(status) => {
                let result = self.store.change_status(status, &mut self.session).await;
                self.after_fetch(result)?;
            }
            Command::Page(page) => {
                let result = self.store.goto_page(page).await;
                self.after_fetch(result)?;
            }
            Command::Search(query) => {
                self.store.search(&query);
                self.print_tickets();
            }
            Command::Open(id) => self.open(&id),
            Command::Close => {
                if self.session.current_ticket().is_none() {
                    println!("! No ticket is open");
                } else {
                    println!("{CLOSE_PROMPT} [y/N]");
                    self.pending = Some(Pending::Close);
                }
            }
            Command::Leave => self.session.teardown(),
            Command::RequestUpload => {
                let result = self.session.request_upload();
                self.report(result);
            }
            Command::File(path) => self.send_file(&path),
            Command::Voice(path) => self.send_voice(&path),
            Command::Refresh => {
                let result = self.store.refresh().await;
                self.after_fetch(result)?;
            }
            Command::Reconnect => {
                if let Err(e) = self.connect().await {
                    self.session.report_error(e.to_string());
                    self.print_error();
                }
            }
            Command::DismissError => self.session.dismiss_error(),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(false),
            Command::Send(text) if text.is_empty() => {}
            Command::Send(text) => {
                let result = self.session.send_message(&text);
                self.report(result);
            }
            Command::Invalid(message) => println!("! {message}"),
        }
        Ok(true)
    }

    fn answer(&mut self, pending: Pending, yes: bool) {
        match pending {
            Pending::Claim(ticket) => {
                match self.session.open(&ticket, &mut AutoConfirm(yes)) {
                    Ok(OpenOutcome::Opened) => println!("Opening ticket #{}...", ticket.id),
                    Ok(OpenOutcome::Declined) => println!("Not claimed."),
                    Ok(OpenOutcome::AlreadyOpening) => print_still_loading(&ticket.id),
                    Err(_) => self.print_error(),
                }
            }
            Pending::Close => match self.session.close_ticket(&mut AutoConfirm(yes)) {
                // The list refreshes when the server confirms the close.
                Ok(CloseOutcome::Closed) => {
                    if self.session.take_ticket_closed() {
                        println!("Ticket closed.");
                    }
                }
                Ok(CloseOutcome::Declined) => {}
                Err(_) => self.print_error(),
            },
        }
    }

    fn open(&mut self, id: &Id) {
        let Some(ticket) = self.store.tickets().iter().find(|t| t.id == *id).cloned() else {
            println!("! Ticket #{id} is not on this page");
            return;
        };
        if ticket.status == TicketStatus::Open {
            println!("{CLAIM_PROMPT} [y/N]");
            self.pending = Some(Pending::Claim(ticket));
            return;
        }
        // Only unclaimed tickets ask for confirmation.
        match self.session.open(&ticket, &mut AutoConfirm(true)) {
            Ok(OpenOutcome::Opened) => println!("Opening ticket #{}...", ticket.id),
            Ok(OpenOutcome::AlreadyOpening) => print_still_loading(&ticket.id),
            Ok(OpenOutcome::Declined) => {}
            Err(_) => self.print_error(),
        }
    }

    fn send_file(&mut self, path: &Path) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("! {}: {e}", path.display());
                return;
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        let result = self.session.send_media(&name, &bytes);
        self.report(result);
    }

    fn send_voice(&mut self, path: &Path) {
        if self.session.ensure_can_send().is_err() {
            self.print_error();
            return;
        }
        match record_file(path) {
            Ok(clip) => {
                let result = self.session.send_audio(clip);
                self.report(result);
            }
            Err(e) => {
                self.session.report_error(e.to_string());
                self.print_error();
            }
        }
    }

    async fn on_socket_event(&mut self, event: SocketEvent) -> Result<(), ConsoleError> {
        match event {
            SocketEvent::Response(Ok(response)) => match self.session.handle(response) {
                SessionUpdate::HistoryLoaded { .. } => self.print_transcript(),
                SessionUpdate::MessageAppended => self.print_last_message(),
                SessionUpdate::TicketsStale => {
                    let result = self.store.refresh().await;
                    self.after_fetch(result)?;
                }
                SessionUpdate::ReadReceipt => {}
                SessionUpdate::Ignored(reason) => {
                    debug!(?reason, "response ignored");
                    if self.session.error().is_some() {
                        self.print_error();
                    }
                }
            },
            SocketEvent::Response(Err(e)) => {
                self.session.report_error(e.to_string());
                self.print_error();
            }
            SocketEvent::ServerError(message) => {
                self.session.report_error(message);
                self.print_error();
            }
            SocketEvent::Disconnected => {
                self.session.detach();
                self.events = None;
                self.session.report_error("Socket disconnected. Use /reconnect.");
                self.print_error();
            }
        }
        Ok(())
    }

    async fn fetch(&mut self, status: TicketStatus, page: usize) -> Result<(), ConsoleError> {
        let result = self.store.fetch(status, page).await;
        self.after_fetch(result)
    }

    /// An expired login clears the auth cookies and ends the console; other
    /// failures are shown and kept.
    fn after_fetch(&mut self, result: Result<usize, TicketListError<ApiError>>) -> Result<(), ConsoleError> {
        match result {
            Ok(_) => self.print_tickets(),
            Err(TicketListError::Source(e)) if e.is_session_fatal() => {
                println!("! {e}");
                println!("{}", log_out(&mut self.cookies));
                return Err(e.into());
            }
            Err(TicketListError::Source(e)) => {
                warn!(status = ?e.status(), error = %e, "ticket fetch failed");
                println!("! {e}");
            }
            Err(e) => println!("! {e}"),
        }
        Ok(())
    }

    fn report<T>(&self, result: Result<T, helpdesk_core::SessionError>) {
        if result.is_err() {
            self.print_error();
        }
    }

    fn print_error(&self) {
        if let Some(error) = self.session.error() {
            println!("! {error}");
        }
    }

    fn print_tickets(&self) {
        println!(
            "== {} tickets, page {} ==",
            self.store.status().label(),
            self.store.page()
        );
        if let Some(error) = self.store.error() {
            println!("  {error}");
        }
        for ticket in self.store.filtered() {
            println!("{}", ticket_line(ticket, self.store.format_update(ticket)));
        }
    }

    fn renderer(&self) -> Renderer {
        Renderer::new(
            self.context.agent_id.clone(),
            self.context.endpoints.media_base_url.clone(),
            Local::now().fixed_offset(),
        )
    }

    fn print_transcript(&self) {
        if let Some(details) = self.session.details() {
            println!(
                "== #{} {} ({}) | {} | {} ==",
                self.session.current_ticket().map(Id::as_str).unwrap_or_default(),
                details.display_name,
                details.user_team_name,
                details.topic,
                self.session.status().map_or("loading", |s| s.label()),
            );
        }
        for line in self.renderer().render(self.session.messages()).iter().flat_map(message_lines) {
            println!("{line}");
        }
        if !self.session.can_compose() {
            println!("(read-only)");
        }
    }

    fn print_last_message(&self) {
        if let Some(last) = self.renderer().render(self.session.messages()).last() {
            for line in message_lines(last) {
                println!("{line}");
            }
        }
    }
}

async fn next_event(events: &mut Option<UnboundedReceiver<SocketEvent>>) -> Option<SocketEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run a file through the recorder, as the capture path would.
fn record_file(path: &Path) -> Result<AudioClip, RecordingError> {
    let mut recorder = Recorder::new(FileMicrophone::new(path));
    recorder.start()?;
    for chunk in recorder.microphone_mut().drain() {
        recorder.push_chunk(chunk)?;
    }
    recorder.stop(Utc::now())
}

fn print_still_loading(id: &Id) {
    println!("Still loading ticket #{id}, history requested again.");
}

/// Forget the login and describe what is left.
pub fn log_out(cookies: &mut CookieJar) -> String {
    cookies.clear_auth();
    format!("Logged out. Remaining cookies: {}", cookies.to_header())
}

fn local_offset() -> FixedOffset {
    *Local::now().offset()
}

pub fn ticket_line(ticket: &Ticket, updated: Option<String>) -> String {
    format!(
        "#{:<6} {:<8} {:<20} {:<12} {:<16} {}",
        ticket.id.as_str(),
        ticket.status.label(),
        ticket.user_name.as_deref().unwrap_or("Unknown"),
        ticket.user_team_name.as_deref().unwrap_or("Support"),
        ticket.topic_name.as_deref().unwrap_or("Profile"),
        updated.unwrap_or_default(),
    )
}

/// Terminal lines for one rendered message; sent messages are indented.
pub fn message_lines(message: &RenderedMessage) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(separator) = &message.separator {
        out.push(format!("---- {separator} ----"));
    }
    let indent = match message.alignment {
        helpdesk_core::Alignment::Sent => "            ",
        helpdesk_core::Alignment::Received => "",
    };
    let body = match &message.body {
        Body::Image { url } => vec![format!("[image] {url}")],
        Body::Video {
            url,
            download_url,
            file_name,
        } => vec![format!("[video] {url}"), format!("[download {file_name}] {download_url}")],
        Body::Audio { url } => vec![format!("[audio] {url}")],
        Body::Text { lines } => lines.clone(),
    };
    for (i, line) in body.iter().enumerate() {
        if i == 0 {
            out.push(format!("{indent}[{}] {line}", message.time));
        } else {
            out.push(format!("{indent}{:>11}{line}", ""));
        }
    }
    out
}
