// crates/client/src/connection.rs
//! The one persistent Socket.IO connection of a console.
//!
//! A reader task decodes frames into [`SocketEvent`]s and answers heartbeats;
//! a writer task drains an unbounded channel onto the socket. Emitting through
//! a [`SocketHandle`] never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use helpdesk_core::{EmitError, Transport};
use helpdesk_types::{Outbound, ProtocolError, Response, ERROR_EVENT, RESPONSE_EVENT};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::codec::{self, Frame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// What the connection reports to its owner.
#[derive(Debug)]
pub enum SocketEvent {
    /// A `res` frame, decoded or not.
    Response(Result<Response, ProtocolError>),
    /// The server's `error` event.
    ServerError(String),
    Disconnected,
}

/// Cheap clonable emitter for the live connection.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    outgoing: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl Transport for SocketHandle {
    fn emit(&self, outbound: Outbound) -> Result<(), EmitError> {
        if !self.is_connected() {
            return Err(EmitError::Closed);
        }
        let payload = outbound.payload().map_err(|source| EmitError::Encode {
            event: outbound.name(),
            source,
        })?;
        let frame = codec::encode_event(outbound.event_name(), &payload);
        debug!(event = outbound.name(), ticket_id = ?outbound.ticket_id(), "socket emit");
        self.outgoing.send(frame).map_err(|_| EmitError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }
}

struct Connection {
    handle: SocketHandle,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Owns at most one connection. Dropping it disconnects.
pub struct ConnectionManager {
    connection: Option<Connection>,
    handshake_timeout: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connection: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect unless already connected. Returns the event stream for a new
    /// connection and `None` when one is already live.
    pub async fn connect(
        &mut self,
        endpoint: &str,
    ) -> Result<Option<mpsc::UnboundedReceiver<SocketEvent>>, TransportError> {
        if self.current().is_some() {
            debug!("connect called while connected");
            return Ok(None);
        }
        // A dead connection is cleaned up before replacing it.
        self.disconnect();

        let url = socket_url(endpoint);
        info!(%url, "connecting");
        let (mut socket, _) = connect_async(url.as_str()).await?;
        let sid = tokio::time::timeout(self.handshake_timeout, handshake(&mut socket))
            .await
            .map_err(|_| TransportError::Timeout(self.handshake_timeout))??;
        info!(%sid, "socket connected");

        let (sink, stream) = socket.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(read_loop(stream, out_tx.clone(), event_tx, connected.clone()));

        self.connection = Some(Connection {
            handle: SocketHandle {
                outgoing: out_tx,
                connected,
            },
            reader,
            writer,
        });
        Ok(Some(event_rx))
    }

    /// The live handle, or `None` when not connected.
    pub fn current(&self) -> Option<SocketHandle> {
        self.connection
            .as_ref()
            .map(|c| c.handle.clone())
            .filter(SocketHandle::is_connected)
    }

    /// Close the connection and stop its tasks. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let was_connected = connection.handle.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            // The writer sends the close packet and then exits on its own.
            let _ = connection.handle.outgoing.send(codec::CLOSE.to_string());
            info!("socket disconnected");
        } else {
            connection.writer.abort();
        }
        connection.reader.abort();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// `<endpoint>/socket.io/?EIO=4&transport=websocket`, with http(s) mapped to
/// ws(s).
pub fn socket_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    };
    format!("{base}/socket.io/?EIO=4&transport=websocket")
}

/// Wait for the Engine.IO open packet, join the default namespace and wait
/// for the acknowledgement. Returns the session id.
async fn handshake(socket: &mut Socket) -> Result<String, TransportError> {
    let mut sid = None;
    while let Some(message) = socket.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match codec::decode(text.as_str()).map_err(|e| TransportError::Handshake(e.to_string()))? {
            Frame::Open(open) => {
                debug!(sid = %open.sid, ping_interval = open.ping_interval, "engine.io open");
                sid = Some(open.sid);
                socket.send(Message::Text(codec::CONNECT.into())).await?;
            }
            Frame::Ping(data) => {
                socket.send(Message::Text(codec::pong(&data).into())).await?;
            }
            Frame::Connected => {
                return sid.ok_or_else(|| TransportError::Handshake("namespace ack before open".into()));
            }
            Frame::ConnectError(reason) => return Err(TransportError::Rejected(reason)),
            Frame::Close | Frame::Disconnect => break,
            other => debug!(?other, "frame before connect"),
        }
    }
    Err(TransportError::Handshake("connection closed during handshake".into()))
}

async fn write_loop(mut sink: SplitSink<Socket, Message>, mut outgoing: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = outgoing.recv().await {
        let closing = frame == codec::CLOSE;
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            warn!("socket write failed: {e}");
            break;
        }
        if closing {
            let _ = sink.close().await;
            break;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<Socket>,
    outgoing: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("socket read failed: {e}");
                let _ = events.send(SocketEvent::ServerError(format!("Socket error: {e}")));
                break;
            }
        };
        let frame = match codec::decode(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable frame");
                continue;
            }
        };
        match frame {
            Frame::Ping(data) => {
                if outgoing.send(codec::pong(&data)).is_err() {
                    break;
                }
            }
            Frame::Event { name, args } => {
                if let Some(event) = dispatch(&name, args) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            Frame::Close | Frame::Disconnect => break,
            Frame::ConnectError(reason) => {
                let _ = events.send(SocketEvent::ServerError(reason));
                break;
            }
            _ => {}
        }
    }
    connected.store(false, Ordering::SeqCst);
    info!("socket closed");
    let _ = events.send(SocketEvent::Disconnected);
}

fn dispatch(name: &str, mut args: Vec<Value>) -> Option<SocketEvent> {
    let first = if args.is_empty() {
        Value::Null
    } else {
        args.swap_remove(0)
    };
    match name {
        RESPONSE_EVENT => {
            let response = Response::decode(first);
            match &response {
                Ok(r) => debug!(event = r.event_name(), "socket response"),
                Err(e) => warn!(error = %e, "malformed socket response"),
            }
            Some(SocketEvent::Response(response))
        }
        ERROR_EVENT => {
            let message = match first {
                Value::String(s) => s,
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_string),
                other => other.to_string(),
            };
            warn!(%message, "server error event");
            Some(SocketEvent::ServerError(message))
        }
        other => {
            debug!(event = other, "ignoring socket event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_socket_url() {
        assert_eq!(
            socket_url("https://api.test/"),
            "wss://api.test/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("ws://127.0.0.1:9000"),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_dispatch_response_and_error() {
        let event = dispatch("res", vec![json!({"en": "messageRead", "data": {"ok": true}})]);
        assert!(matches!(event, Some(SocketEvent::Response(Ok(Response::MessageRead(_))))));

        let event = dispatch("res", vec![json!({"data": []})]);
        assert!(matches!(
            event,
            Some(SocketEvent::Response(Err(ProtocolError::MalformedEnvelope)))
        ));

        let event = dispatch("error", vec![json!({"message": "Ticket not found"})]);
        assert!(matches!(event, Some(SocketEvent::ServerError(m)) if m == "Ticket not found"));

        assert!(dispatch("typing", vec![]).is_none());
    }

    #[test]
    fn test_handle_rejects_after_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle {
            outgoing: tx,
            connected: Arc::new(AtomicBool::new(true)),
        };
        drop(rx);
        let err = handle
            .emit(helpdesk_types::Signal::Register("7".into()).into())
            .unwrap_err();
        assert!(matches!(err, EmitError::Closed));
    }
}
