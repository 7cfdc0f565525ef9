//! Seam between the engine and the transport stack.
//!
//! The transport delivers bytes through [`RxEngine`](crate::RxEngine) entry
//! points and receives flow-control credit and connection events through
//! [`Transport`].

use std::fmt;

use crate::socket_map::{ConnectionId, SocketId};

/// Why the engine asked for a connection to be re-established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectReason {
    /// A frame header declared a length above the permitted ceiling.
    InvalidLength,
    /// The ring buffer had no room for data awaiting the consumer.
    BufferOverflow,
    /// The consumer refused data on a stream that cannot skip it.
    ConsumerRefused,
    /// A receive cancellation dropped data mid-stream.
    Cancelled,
}

impl ReconnectReason {
    /// Static label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidLength => "invalid_length",
            Self::BufferOverflow => "buffer_overflow",
            Self::ConsumerRefused => "consumer_refused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Connection-level events raised by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Framing can no longer be trusted; the lifecycle owner should close
    /// and reopen the connection.
    ReconnectRequested {
        connection: ConnectionId,
        reason: ReconnectReason,
    },
}

/// Interface the engine uses to talk back to the transport stack.
pub trait Transport: Send + Sync {
    /// Return `len` bytes of receive credit for `socket`.
    ///
    /// Called with every byte the engine takes ownership of, whether it was
    /// delivered or discarded.
    fn ack_consumed(&self, socket: SocketId, len: usize);

    /// Observe a connection-level event.
    fn on_connection_event(&self, _event: ConnectionEvent) {}
}

/// Transport that ignores credit and events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn ack_consumed(&self, _socket: SocketId, _len: usize) {}
}
