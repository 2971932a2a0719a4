// crates/core/src/transport.rs
//! The seam between the ticket session and whatever carries its frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use helpdesk_types::Outbound;

use crate::error::EmitError;

/// A live connection handle the session emits through.
///
/// Emission is fire-and-forget: `Ok` means the frame was queued, not that the
/// server acknowledged it.
pub trait Transport {
    fn emit(&self, outbound: Outbound) -> Result<(), EmitError>;

    fn is_connected(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn emit(&self, outbound: Outbound) -> Result<(), EmitError> {
        (**self).emit(outbound)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// In-memory transport that records every emission. Clones share the log.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<Outbound>>>,
    connected: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Everything emitted so far, in order.
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Request `en` names and signal event names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.sent().iter().map(Outbound::name).collect()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Outbound> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    /// Simulate the connection dropping: later emits fail with `Closed`.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn emit(&self, outbound: Outbound) -> Result<(), EmitError> {
        if !self.is_connected() {
            return Err(EmitError::Closed);
        }
        let mut sent = self.sent.lock().map_err(|_| EmitError::Closed)?;
        sent.push(outbound);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_types::{Id, Signal};

    #[test]
    fn test_memory_transport_records_in_order() {
        let transport = MemoryTransport::new();
        let view = transport.clone();
        transport.emit(Signal::Register(Id::from("7")).into()).unwrap();
        transport.emit(Signal::JoinTicketRoom(Id::from("42")).into()).unwrap();
        assert_eq!(view.names(), vec!["register", "joinTicketRoom"]);
        assert_eq!(view.take().len(), 2);
        assert!(view.sent().is_empty());
    }

    #[test]
    fn test_disconnected_memory_transport_rejects() {
        let transport = MemoryTransport::new();
        transport.set_connected(false);
        let err = transport.emit(Signal::Register(Id::from("7")).into()).unwrap_err();
        assert!(matches!(err, EmitError::Closed));
        assert!(transport.sent().is_empty());
    }
}
