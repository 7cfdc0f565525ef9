//! The receive engine.
//!
//! [`RxEngine`] owns one slot per configured connection and one entry per
//! socket group. Transport deliveries enter through
//! [`RxEngine::on_stream_data`] and [`RxEngine::on_datagram`]; buffered data
//! is resumed by the continuation driver. Both paths lock the connection's
//! receive state, so they never interleave for the same connection. Credit
//! and connection events are reported after the lock is released.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info, warn};

use crate::{
    address::{self, AddressMatch, LinkPhase, LinkState, Resolution, ResolveOptions},
    config::{TrailingPolicy, TransportKind},
    consumer::ReceptionOutcome,
    datagram::{self, DatagramReport},
    error::{Result, RxError},
    frame::{FrameFormat, RouteScope, RouteTable},
    metrics,
    reassembly::{OpenReception, Progress, ReassemblyPhase, RxContext, RxView},
    socket_map::{ConnectionId, GroupId, SocketId, SocketMap, SocketOwner},
    transport::{ConnectionEvent, ReconnectReason, Transport},
};

mod builder;

pub use builder::RxEngineBuilder;

/// Connections sharing one local socket.
pub(crate) struct Group {
    pub(crate) name: String,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) transport: TransportKind,
    pub(crate) header_mode: bool,
    pub(crate) format: FrameFormat,
    pub(crate) routes: RouteTable,
    /// Arena index of the first member.
    pub(crate) first: usize,
    pub(crate) links: Mutex<Vec<LinkState>>,
}

/// Arena slot of one connection.
pub(crate) struct ConnectionSlot {
    pub(crate) id: ConnectionId,
    pub(crate) name: String,
    pub(crate) group: GroupId,
    pub(crate) offset: usize,
    pub(crate) trailing: TrailingPolicy,
    pub(crate) routes: RouteTable,
    pub(crate) rx: Mutex<RxContext>,
    pub(crate) has_buffered: AtomicBool,
    pub(crate) cancel_requested: AtomicBool,
    pub(crate) reconnect_pending: AtomicBool,
}

/// Receive-side demultiplexing and reassembly engine.
pub struct RxEngine {
    pub(crate) groups: Vec<Group>,
    pub(crate) slots: Vec<ConnectionSlot>,
    pub(crate) sockets: SocketMap,
    pub(crate) transport: Arc<dyn Transport>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RxEngine {
    /// Deliver bytes received on a stream socket.
    ///
    /// Data is only processed when the peer exactly matches the owning
    /// connection's remote and the connection is online. Everything else is
    /// credited and discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownSocket`] if `socket` is not attached to a
    /// connection. The bytes are credited regardless.
    pub fn on_stream_data(&self, socket: SocketId, peer: SocketAddr, data: &[u8]) -> Result<()> {
        let Some(SocketOwner::Connection(id)) = self.sockets.get(socket) else {
            self.credit(socket, data.len());
            return Err(RxError::UnknownSocket(socket));
        };
        let slot = self.slot(id)?;
        let group = self.group_of(slot);
        let accepted = {
            let links = lock(&group.links);
            let link = &links[slot.offset];
            link.phase == LinkPhase::Online && link.remote.match_peer(peer) == AddressMatch::Exact
        };
        if !accepted {
            debug!("{id}: dropping {} bytes from unexpected peer {peer}", data.len());
            metrics::inc_dropped("peer_mismatch");
            self.credit(socket, data.len());
            return Ok(());
        }

        let (progress, event) = {
            let mut rx = lock(&slot.rx);
            let mut progress = observe_cancel(group, slot, &mut rx);
            let mut event = mark_reconnect(slot, progress.reconnect);
            if slot.reconnect_pending.load(Ordering::Acquire) {
                progress.consumed += data.len();
            } else {
                let step = rx.receive_stream(&self.view(slot), data);
                event = event.or(mark_reconnect(slot, step.reconnect));
                progress.consumed += step.consumed;
            }
            slot.has_buffered
                .store(rx.buffered() > 0, Ordering::Release);
            (progress, event)
        };
        self.settle(slot, Some(socket), progress.consumed, event);
        Ok(())
    }

    /// Deliver one datagram received on a group socket.
    ///
    /// The owning connection is chosen by remote-address matching. The full
    /// datagram length is credited exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownSocket`] if `socket` is not a group socket.
    pub fn on_datagram(
        &self,
        socket: SocketId,
        peer: SocketAddr,
        data: &[u8],
    ) -> Result<DatagramReport> {
        let Some(SocketOwner::Group(group_id)) = self.sockets.get(socket) else {
            self.credit(socket, data.len());
            return Err(RxError::UnknownSocket(socket));
        };
        let group = self.group(group_id)?;
        let Some(offset) = self.resolve_and_accept(group, peer, true) else {
            debug!("{group_id}: no connection accepts datagram from {peer}");
            metrics::inc_dropped("no_matching_connection");
            self.credit(socket, data.len());
            return Ok(DatagramReport::default());
        };
        let slot = &self.slots[group.first + offset];

        let (report, flushed, event) = {
            let mut rx = lock(&slot.rx);
            let progress = observe_cancel(group, slot, &mut rx);
            let event = mark_reconnect(slot, progress.reconnect);
            let report = if slot.reconnect_pending.load(Ordering::Acquire) {
                DatagramReport::default()
            } else {
                datagram::receive(&self.view(slot), data)
            };
            (report, progress.consumed, event)
        };
        self.settle(slot, Some(socket), data.len() + flushed, event);
        Ok(report)
    }

    /// Select the connection of `group` owning data from `peer`.
    ///
    /// Applies the acceptance filter: a wildcard, port or address match binds
    /// the chosen connection's remote to `peer` when the connection allows
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownGroup`] for an unknown group.
    pub fn resolve(
        &self,
        group: GroupId,
        peer: SocketAddr,
        require_route: bool,
    ) -> Result<(ConnectionId, AddressMatch)> {
        let entry = self.group(group)?;
        let mut links = lock(&entry.links);
        let resolution = resolve_links(entry, &links, peer, require_route, false);
        address::accept(&mut links[resolution.offset], peer, resolution.quality);
        Ok((
            ConnectionId::new(entry.first + resolution.offset),
            resolution.quality,
        ))
    }

    /// Request that the reception in flight on `connection` be abandoned.
    ///
    /// The request is observed by the next delivery or drive of the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn cancel_receive(&self, connection: ConnectionId) -> Result<()> {
        let slot = self.slot(connection)?;
        slot.cancel_requested.store(true, Ordering::Release);
        Ok(())
    }

    /// Toggle the routing-control bit of `frame_id` as seen by `connection`.
    ///
    /// Group routes are shared, so toggling one affects every member.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownRoute`] if the connection has no such
    /// route.
    pub fn set_route_enabled(&self, connection: ConnectionId, frame_id: u32, enabled: bool) -> Result<()> {
        let slot = self.slot(connection)?;
        let route = slot
            .routes
            .lookup(frame_id)
            .or_else(|| self.group_of(slot).routes.lookup(frame_id))
            .ok_or(RxError::UnknownRoute { frame_id, len: 0 })?;
        route.set_enabled(enabled);
        info!("{connection}: route {frame_id:#010x} enabled={enabled}");
        Ok(())
    }

    /// Register the datagram socket shared by `group`.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownGroup`] for an unknown group.
    pub fn bind_datagram_socket(&self, group: GroupId, socket: SocketId) -> Result<()> {
        let entry = self.group(group)?;
        for link in lock(&entry.links).iter_mut() {
            link.socket = Some(socket);
        }
        self.sockets.insert(socket, SocketOwner::Group(group));
        Ok(())
    }

    /// Open `connection` for traffic.
    ///
    /// Datagram connections with a fully bound remote go online at once;
    /// everything else waits for a peer.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn open_connection(&self, connection: ConnectionId) -> Result<()> {
        let slot = self.slot(connection)?;
        let group = self.group_of(slot);
        let mut links = lock(&group.links);
        let link = &mut links[slot.offset];
        link.phase = if group.transport == TransportKind::Datagram && link.remote.is_set() {
            LinkPhase::Online
        } else {
            LinkPhase::Connecting
        };
        Ok(())
    }

    /// Attach a stream accepted on `group`'s listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::NoMatchingConnection`] when no connecting member
    /// accepts `peer`.
    pub fn accept_stream(&self, group: GroupId, socket: SocketId, peer: SocketAddr) -> Result<ConnectionId> {
        let entry = self.group(group)?;
        let offset = {
            let mut links = lock(&entry.links);
            let resolution = resolve_links(entry, &links, peer, false, false);
            let link = &mut links[resolution.offset];
            if link.phase != LinkPhase::Connecting || !address::accept(link, peer, resolution.quality) {
                return Err(RxError::NoMatchingConnection { group, peer });
            }
            link.remote.bind(peer);
            link.socket = Some(socket);
            link.phase = LinkPhase::Online;
            resolution.offset
        };
        let id = ConnectionId::new(entry.first + offset);
        self.sockets.insert(socket, SocketOwner::Connection(id));
        info!("{id}: accepted stream from {peer}");
        Ok(id)
    }

    /// Attach a stream the transport connected to `peer` for `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn connect_stream(&self, connection: ConnectionId, socket: SocketId, peer: SocketAddr) -> Result<()> {
        let slot = self.slot(connection)?;
        let previous = {
            let mut links = lock(&self.group_of(slot).links);
            let link = &mut links[slot.offset];
            link.remote.bind(peer);
            link.phase = LinkPhase::Online;
            link.socket.replace(socket)
        };
        if let Some(previous) = previous.filter(|&previous| previous != socket) {
            self.sockets.remove(previous);
        }
        self.sockets
            .insert(socket, SocketOwner::Connection(connection));
        Ok(())
    }

    /// Bind `peer` to the best-matching member of `connection`'s group.
    ///
    /// Closed members whose remote is already bound are considered too.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::NoMatchingConnection`] when no member matches.
    pub fn assign_unique_remote(&self, connection: ConnectionId, peer: SocketAddr) -> Result<ConnectionId> {
        let slot = self.slot(connection)?;
        let group = self.group_of(slot);
        let mut links = lock(&group.links);
        let resolution = resolve_links(group, &links, peer, false, true);
        if resolution.quality == AddressMatch::None {
            return Err(RxError::NoMatchingConnection {
                group: slot.group,
                peer,
            });
        }
        links[resolution.offset].remote.bind(peer);
        Ok(ConnectionId::new(group.first + resolution.offset))
    }

    /// Tear down `connection` after the transport closed it.
    ///
    /// An accepted header-less reception completes successfully; a bounded
    /// one fails. Buffered bytes are credited to the old socket, pending
    /// cancel and reconnect flags are cleared, and the remote returns to its
    /// configured pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn release_connection(&self, connection: ConnectionId) -> Result<()> {
        let slot = self.slot(connection)?;
        let group = self.group_of(slot);
        let socket = {
            let mut links = lock(&group.links);
            let link = &mut links[slot.offset];
            let socket = link.socket;
            link.reset();
            if group.transport == TransportKind::Datagram {
                link.socket = socket;
            }
            socket
        };
        let flushed = {
            let mut rx = lock(&slot.rx);
            let flushed = rx.reset(ReceptionOutcome::Ok);
            slot.has_buffered.store(false, Ordering::Release);
            slot.cancel_requested.store(false, Ordering::Release);
            slot.reconnect_pending.store(false, Ordering::Release);
            flushed
        };
        if let Some(socket) = socket {
            self.credit(socket, flushed);
        }
        if group.transport == TransportKind::Stream
            && let Some(socket) = socket
        {
            self.sockets.remove(socket);
        }
        info!("{connection}: released");
        Ok(())
    }

    /// Current reassembly phase of `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn reassembly_phase(&self, connection: ConnectionId) -> Result<ReassemblyPhase> {
        Ok(lock(&self.slot(connection)?.rx).phase())
    }

    /// The streaming reception in flight on `connection`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn open_reception(&self, connection: ConnectionId) -> Result<Option<OpenReception>> {
        Ok(lock(&self.slot(connection)?.rx).open_reception())
    }

    /// Bytes held in `connection`'s ring buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn buffered_len(&self, connection: ConnectionId) -> Result<usize> {
        Ok(lock(&self.slot(connection)?.rx).buffered())
    }

    /// Whether the continuation driver has work for `connection`.
    #[must_use]
    pub fn has_buffered_data(&self, connection: ConnectionId) -> bool {
        self.slots
            .get(connection.index())
            .is_some_and(|slot| slot.has_buffered.load(Ordering::Acquire))
    }

    /// Whether a forced reconnect is outstanding for `connection`.
    #[must_use]
    pub fn reconnect_pending(&self, connection: ConnectionId) -> bool {
        self.slots
            .get(connection.index())
            .is_some_and(|slot| slot.reconnect_pending.load(Ordering::Acquire))
    }

    /// Link phase of `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`] for an unknown connection.
    pub fn link_phase(&self, connection: ConnectionId) -> Result<LinkPhase> {
        let slot = self.slot(connection)?;
        Ok(lock(&self.group_of(slot).links)[slot.offset].phase)
    }

    /// Find a group by name.
    #[must_use]
    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.groups
            .iter()
            .position(|g| g.name == name)
            .map(GroupId::new)
    }

    /// Identifiers of every group.
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ { (0..self.groups.len()).map(GroupId::new) }

    /// Transport kind and configured local address of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownGroup`] for an unknown group.
    pub fn group_endpoint(&self, group: GroupId) -> Result<(TransportKind, Option<SocketAddr>)> {
        let entry = self.group(group)?;
        Ok((entry.transport, entry.local))
    }

    /// Members of `group`, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownGroup`] for an unknown group.
    pub fn group_connections(&self, group: GroupId) -> Result<Vec<ConnectionId>> {
        let entry = self.group(group)?;
        let len = lock(&entry.links).len();
        Ok((entry.first..entry.first + len)
            .map(ConnectionId::new)
            .collect())
    }

    /// Find a connection by name.
    #[must_use]
    pub fn connection_id(&self, name: &str) -> Option<ConnectionId> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub(crate) fn slot(&self, id: ConnectionId) -> Result<&ConnectionSlot> {
        self.slots
            .get(id.index())
            .ok_or(RxError::UnknownConnection(id))
    }

    fn group(&self, id: GroupId) -> Result<&Group> { self.groups.get(id.index()).ok_or(RxError::UnknownGroup(id)) }

    pub(crate) fn group_of(&self, slot: &ConnectionSlot) -> &Group { &self.groups[slot.group.index()] }

    pub(crate) fn view<'a>(&'a self, slot: &'a ConnectionSlot) -> RxView<'a> {
        let group = self.group_of(slot);
        RxView {
            connection: slot.id,
            scope: RouteScope {
                own: &slot.routes,
                group: &group.routes,
                offset: slot.offset,
            },
            format: group.format,
            header_mode: group.header_mode,
            trailing: slot.trailing,
        }
    }

    fn resolve_and_accept(&self, group: &Group, peer: SocketAddr, require_route: bool) -> Option<usize> {
        let mut links = lock(&group.links);
        let resolution = resolve_links(group, &links, peer, require_route, false);
        let link = &mut links[resolution.offset];
        if !address::accept(link, peer, resolution.quality) {
            return None;
        }
        if link.phase == LinkPhase::Connecting && link.remote.is_set() {
            link.phase = LinkPhase::Online;
        }
        Some(resolution.offset)
    }

    /// Report credit and any new reconnect once the connection is unlocked.
    pub(crate) fn settle(
        &self,
        slot: &ConnectionSlot,
        socket: Option<SocketId>,
        consumed: usize,
        event: Option<ReconnectReason>,
    ) {
        match socket {
            Some(socket) => self.credit(socket, consumed),
            None if consumed > 0 => debug!("{}: no socket to credit {consumed} bytes", slot.id),
            None => {}
        }
        if let Some(reason) = event {
            warn!("{}: requesting reconnect ({reason})", slot.id);
            metrics::inc_reconnects(reason);
            self.transport
                .on_connection_event(ConnectionEvent::ReconnectRequested {
                    connection: slot.id,
                    reason,
                });
        }
    }

    fn credit(&self, socket: SocketId, len: usize) {
        if len == 0 {
            return;
        }
        metrics::add_acknowledged(len);
        self.transport.ack_consumed(socket, len);
    }
}

fn resolve_links(
    group: &Group,
    links: &[LinkState],
    peer: SocketAddr,
    require_route: bool,
    include_closed: bool,
) -> Resolution {
    address::resolve(
        links,
        peer,
        ResolveOptions {
            require_route,
            include_closed,
            group_has_routes: !group.routes.is_empty(),
        },
    )
}

/// Latch the reconnect flag, returning `reason` only if it was newly set.
pub(crate) fn mark_reconnect(slot: &ConnectionSlot, reason: Option<ReconnectReason>) -> Option<ReconnectReason> {
    let reason = reason?;
    (!slot.reconnect_pending.swap(true, Ordering::AcqRel)).then_some(reason)
}

/// Apply a pending cancellation. Must be called with `rx` locked.
pub(crate) fn observe_cancel(group: &Group, slot: &ConnectionSlot, rx: &mut RxContext) -> Progress {
    if !slot.cancel_requested.swap(false, Ordering::AcqRel) {
        return Progress::default();
    }
    let in_flight = rx.in_flight();
    let flushed = rx.reset(ReceptionOutcome::Failed);
    slot.has_buffered.store(false, Ordering::Release);
    info!("{}: reception cancelled", slot.id);
    let realign = in_flight && group.transport == TransportKind::Stream && group.header_mode;
    Progress {
        consumed: flushed,
        reconnect: realign.then_some(ReconnectReason::Cancelled),
    }
}
