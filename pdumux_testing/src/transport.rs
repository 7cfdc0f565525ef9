//! Recording transport.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use pdumux::{ConnectionEvent, SocketId, Transport};

/// Transport totalling credit per socket and keeping every event.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    acks: Mutex<HashMap<SocketId, usize>>,
    events: Mutex<Vec<ConnectionEvent>>,
}

impl RecordingTransport {
    /// Credit returned for `socket` so far.
    #[must_use]
    pub fn acked(&self, socket: SocketId) -> usize {
        self.acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&socket)
            .copied()
            .unwrap_or(0)
    }

    /// Credit returned across every socket.
    #[must_use]
    pub fn total_acked(&self) -> usize {
        self.acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn ack_consumed(&self, socket: SocketId, len: usize) {
        *self
            .acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(socket)
            .or_default() += len;
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
