//! Per-connection send queues and fan-out primitives.
//!
//! Every live connection owns one unbounded outbound queue; the transport
//! task on the other end drains it into the socket (or the long-poll
//! response). A single queue per destination preserves the order in which
//! the router issued emits. Fan-outs serialize the frame once and clone the
//! string per destination; they are pointwise, not atomic.

use crate::events::ServerEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A frame queued for one connection.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// A serialized event envelope.
    Event(String),
    /// Instruction to close the underlying transport.
    Close,
}

/// Registry of live connection send-queues.
#[derive(Debug, Default)]
pub struct Emitter {
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<OutboundFrame>>>,
}

impl Emitter {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<OutboundFrame>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a connection's send-queue.
    pub fn register(&self, connection_id: &str, sender: mpsc::UnboundedSender<OutboundFrame>) {
        self.table().insert(connection_id.to_string(), sender);
    }

    /// Detach a connection. Safe to call more than once.
    pub fn unregister(&self, connection_id: &str) {
        self.table().remove(connection_id);
    }

    /// Whether the transport still holds a live queue for this connection.
    #[must_use]
    pub fn is_live(&self, connection_id: &str) -> bool {
        self.table()
            .get(connection_id)
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.table().len()
    }

    /// Emit to a single connection. Returns `false` when the connection is
    /// gone; dead destinations are simply skipped.
    pub fn emit(&self, connection_id: &str, event: &ServerEvent) -> bool {
        let frame = event.frame();
        self.table()
            .get(connection_id)
            .is_some_and(|sender| sender.send(OutboundFrame::Event(frame)).is_ok())
    }

    /// Relay from one connection to another. The sender id is carried in
    /// the payload, stamped by the router; the transport only needs the
    /// destination.
    pub fn emit_to_peer(&self, _from: &str, to: &str, event: &ServerEvent) -> bool {
        self.emit(to, event)
    }

    /// Emit to every member of a room.
    pub fn emit_to_room<'a, I>(&self, members: I, event: &ServerEvent)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let frame = event.frame();
        let table = self.table();
        for member in members {
            if let Some(sender) = table.get(member) {
                let _ = sender.send(OutboundFrame::Event(frame.clone()));
            }
        }
    }

    /// Emit to every member of a room except the sender.
    pub fn emit_to_room_except<'a, I>(&self, members: I, sender_id: &str, event: &ServerEvent)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.emit_to_room(
            members.into_iter().filter(|id| id.as_str() != sender_id),
            event,
        );
    }

    /// Emit to every live connection, joined or not.
    pub fn broadcast(&self, event: &ServerEvent) {
        let frame = event.frame();
        for sender in self.table().values() {
            let _ = sender.send(OutboundFrame::Event(frame.clone()));
        }
    }

    /// Instruct the transport to close one connection after draining its
    /// already-queued frames.
    pub fn force_close(&self, connection_id: &str) {
        if let Some(sender) = self.table().get(connection_id) {
            let _ = sender.send(OutboundFrame::Close);
        }
    }

    /// Close every connection (shutdown path).
    pub fn close_all(&self) {
        for sender in self.table().values() {
            let _ = sender.send(OutboundFrame::Close);
        }
    }
}
