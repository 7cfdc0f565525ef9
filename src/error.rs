//! Canonical error and result types for the crate.
//!
//! [`RxError`] covers both the per-frame conditions the receive path handles
//! internally (they are logged, counted and discarded with credit) and the
//! handful of misuse errors returned from engine entry points.

use std::net::SocketAddr;

use thiserror::Error;

use crate::socket_map::{ConnectionId, GroupId, SocketId};

/// Receive-path error.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RxError {
    /// The frame identifier is absent, disabled, or has no destination for
    /// this connection.
    #[error("no enabled route for frame id {frame_id:#010x}")]
    UnknownRoute { frame_id: u32, len: usize },
    /// The declared length breaks the transport or absolute ceiling.
    #[error("frame id {frame_id:#010x} declares an invalid length (clamped to {clamped})")]
    InvalidLength { frame_id: u32, clamped: usize },
    /// Fewer bytes than a full header were available.
    #[error("incomplete frame header: {available} bytes available")]
    IncompleteHeader { available: usize },
    /// The consumer declined the PDU or failed a copy.
    #[error("consumer refused frame id {frame_id:#010x}")]
    ConsumerRefused { frame_id: u32 },
    /// No room to stage data the consumer could not take yet.
    #[error("no buffer space for {len} bytes")]
    BufferOverflow { len: usize },
    /// The socket handle is not registered with the engine.
    #[error("{0} is not attached")]
    UnknownSocket(SocketId),
    /// The connection handle is outside the arena.
    #[error("{0} does not exist")]
    UnknownConnection(ConnectionId),
    /// The group handle is outside the engine.
    #[error("{0} does not exist")]
    UnknownGroup(GroupId),
    /// No connection of the group accepts the peer.
    #[error("no connection of {group} accepts peer {peer}")]
    NoMatchingConnection { group: GroupId, peer: SocketAddr },
}

impl RxError {
    /// Static label used in logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownRoute { .. } => "unknown_route",
            Self::InvalidLength { .. } => "invalid_length",
            Self::IncompleteHeader { .. } => "incomplete_header",
            Self::ConsumerRefused { .. } => "consumer_refused",
            Self::BufferOverflow { .. } => "buffer_overflow",
            Self::UnknownSocket(_) => "unknown_socket",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::UnknownGroup(_) => "unknown_group",
            Self::NoMatchingConnection { .. } => "no_matching_connection",
        }
    }
}

/// Canonical result alias used by `pdumux` entry points.
pub type Result<T> = std::result::Result<T, RxError>;
