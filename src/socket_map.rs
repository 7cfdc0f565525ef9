//! Identifiers and the socket registry.
//!
//! `SocketMap` resolves the transport's socket handles to the group or
//! connection that owns them. Datagram sockets are shared by a whole group;
//! stream sockets belong to a single connection once accepted or connected.
use std::fmt;

use dashmap::DashMap;

/// Index of a connection inside the engine arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl From<usize> for ConnectionId {
    fn from(value: usize) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided index.
    #[must_use]
    pub const fn new(index: usize) -> Self { Self(index) }

    /// Return the arena index.
    #[must_use]
    pub const fn index(self) -> usize { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Index of a socket group inside the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

impl From<usize> for GroupId {
    fn from(value: usize) -> Self { Self(value) }
}

impl GroupId {
    /// Create a new [`GroupId`] with the provided index.
    #[must_use]
    pub const fn new(index: usize) -> Self { Self(index) }

    /// Return the group index.
    #[must_use]
    pub const fn index(self) -> usize { self.0 }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "GroupId({})", self.0) }
}

/// Opaque socket handle issued by the transport stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl From<u64> for SocketId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SocketId {
    /// Create a new [`SocketId`].
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the raw handle.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SocketId({})", self.0) }
}

/// Owner of a socket handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketOwner {
    /// A datagram socket shared by every connection of a group.
    Group(GroupId),
    /// A stream socket bound to one connection.
    Connection(ConnectionId),
}

/// Concurrent registry of socket owners keyed by [`SocketId`].
#[derive(Default)]
pub struct SocketMap(DashMap<SocketId, SocketOwner>);

impl SocketMap {
    /// Look up the owner of `socket`.
    #[must_use]
    pub fn get(&self, socket: SocketId) -> Option<SocketOwner> { self.0.get(&socket).map(|e| *e) }

    /// Record `owner` for `socket`, returning the previous owner.
    pub fn insert(&self, socket: SocketId, owner: SocketOwner) -> Option<SocketOwner> {
        self.0.insert(socket, owner)
    }

    /// Forget `socket`, typically on connection teardown.
    pub fn remove(&self, socket: SocketId) { self.0.remove(&socket); }

    /// Number of registered sockets.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no sockets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
