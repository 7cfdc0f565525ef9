//! Remote-address matching for sockets shared by several connections.
//!
//! Every connection of a socket group carries a remote address that may be
//! partially wildcarded. [`resolve`] scores an observed peer against each
//! member and selects the owner of the data; [`accept`] applies the
//! message acceptance filter, binding wildcard remotes to the peer.

use std::net::{IpAddr, SocketAddr};

use crate::{config::RemotePattern, socket_map::SocketId};

/// Quality of a remote-address match, weakest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressMatch {
    None,
    /// Neither address nor port is bound.
    Wildcard,
    /// Only the port is bound and it matches.
    Port,
    /// Only the address is bound and it matches.
    IpAddr,
    /// Address and port are bound and both match.
    Exact,
}

/// Link phase of a connection, as driven by the lifecycle owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkPhase {
    #[default]
    Closed,
    /// Opened and waiting for a peer.
    Connecting,
    Online,
}

/// Runtime remote address of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteAddr {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

impl From<RemotePattern> for RemoteAddr {
    fn from(pattern: RemotePattern) -> Self {
        Self {
            ip: pattern.ip,
            port: pattern.port,
        }
    }
}

impl RemoteAddr {
    /// Whether both address and port are bound.
    #[must_use]
    pub fn is_set(&self) -> bool { self.ip.is_some() && self.port.is_some() }

    /// Bind both fields to `peer`.
    pub fn bind(&mut self, peer: SocketAddr) {
        self.ip = Some(peer.ip());
        self.port = Some(peer.port());
    }

    /// Score `peer` against this address.
    #[must_use]
    pub fn match_peer(&self, peer: SocketAddr) -> AddressMatch {
        match (self.ip, self.port) {
            (None, None) => AddressMatch::Wildcard,
            (None, Some(port)) if port == peer.port() => AddressMatch::Port,
            (Some(ip), None) if ip == peer.ip() => AddressMatch::IpAddr,
            (Some(ip), Some(port)) if ip == peer.ip() && port == peer.port() => AddressMatch::Exact,
            _ => AddressMatch::None,
        }
    }
}

/// Mutable link state of one connection.
#[derive(Clone, Debug, Default)]
pub struct LinkState {
    pub pattern: RemoteAddr,
    pub remote: RemoteAddr,
    pub phase: LinkPhase,
    pub socket: Option<SocketId>,
    /// Whether the connection owns receive routes of its own.
    pub has_routes: bool,
    /// Whether the acceptance filter may bind the remote.
    pub bind_remote: bool,
}

impl LinkState {
    /// Fresh closed link for `pattern`.
    #[must_use]
    pub fn new(pattern: RemotePattern, has_routes: bool, bind_remote: bool) -> Self {
        Self {
            pattern: pattern.into(),
            remote: pattern.into(),
            phase: LinkPhase::Closed,
            socket: None,
            has_routes,
            bind_remote,
        }
    }

    /// Return to the configured pattern with no socket.
    pub fn reset(&mut self) {
        self.remote = self.pattern;
        self.phase = LinkPhase::Closed;
        self.socket = None;
    }
}

/// Knobs for [`resolve`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions {
    /// Only select connections owning routes, unless the group has routes
    /// shared by every member.
    pub require_route: bool,
    /// Also consider closed connections whose remote is fully bound.
    pub include_closed: bool,
    pub group_has_routes: bool,
}

/// Outcome of [`resolve`]: the offset of the chosen connection in its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub offset: usize,
    pub quality: AddressMatch,
}

/// Select the member of `links` that owns data from `peer`.
///
/// Keeps the best candidate seen, with the first one winning ties, and stops
/// at the first exact match. Falls back to offset zero with
/// [`AddressMatch::None`] when nothing qualifies.
#[must_use]
pub fn resolve(links: &[LinkState], peer: SocketAddr, options: ResolveOptions) -> Resolution {
    let any_member = !options.require_route || options.group_has_routes;
    let mut best = Resolution {
        offset: 0,
        quality: AddressMatch::None,
    };
    for (offset, link) in links.iter().enumerate() {
        let open = link.phase != LinkPhase::Closed;
        if !(open || (options.include_closed && link.remote.is_set())) {
            continue;
        }
        if !(any_member || link.has_routes) {
            continue;
        }
        let quality = link.remote.match_peer(peer);
        if quality > best.quality {
            best = Resolution { offset, quality };
            if quality == AddressMatch::Exact {
                break;
            }
        }
    }
    best
}

/// Message acceptance filter.
///
/// Exact matches pass untouched. Weaker matches pass and, when the link
/// allows it, bind the remote to `peer`. Returns whether the data is
/// accepted.
pub fn accept(link: &mut LinkState, peer: SocketAddr, quality: AddressMatch) -> bool {
    match quality {
        AddressMatch::None => false,
        AddressMatch::Exact => true,
        AddressMatch::Wildcard | AddressMatch::Port | AddressMatch::IpAddr => {
            if link.bind_remote {
                link.remote.bind(peer);
            }
            true
        }
    }
}
