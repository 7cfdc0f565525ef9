//! Tokio socket adapter feeding an [`RxEngine`].
//!
//! Binds one socket per configured group with a local address. Datagram
//! groups share a single UDP socket between their connections; stream groups
//! listen for TCP connections and attach each accepted stream to the
//! connection selected by remote-address matching. Reconnect requests from
//! the engine close the affected stream so its peer can re-establish it.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use log::{debug, info, trace, warn};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream, UdpSocket},
    sync::mpsc,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, info_span};

use crate::{
    config::TransportKind,
    consumer::{
        CopyError,
        FireAndForgetConsumer,
        ReceptionOutcome,
        Refused,
        RxPdu,
        StreamingConsumer,
    },
    driver::run_continuation_driver,
    engine::RxEngine,
    socket_map::{ConnectionId, GroupId, SocketId},
    transport::{ConnectionEvent, Transport},
};

const READ_BUFFER: usize = 4096;
const MAX_DATAGRAM: usize = 65_535;

/// Consumer that logs every PDU it receives.
///
/// Accepts any amount of data, so it never exerts backpressure.
#[derive(Debug)]
pub struct LoggingConsumer {
    name: String,
}

impl LoggingConsumer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

impl StreamingConsumer for LoggingConsumer {
    fn start_reception(&self, pdu: RxPdu, declared_len: usize) -> Result<usize, Refused> {
        info!(
            "{}: pdu {} on {} starts ({declared_len} bytes)",
            self.name, pdu.pdu_id, pdu.connection
        );
        Ok(usize::MAX)
    }

    fn copy_data(&self, pdu: RxPdu, chunk: &[u8]) -> Result<usize, CopyError> {
        trace!("{}: pdu {} +{} bytes", self.name, pdu.pdu_id, chunk.len());
        Ok(usize::MAX)
    }

    fn reception_complete(&self, pdu: RxPdu, outcome: ReceptionOutcome) {
        info!("{}: pdu {} complete: {outcome:?}", self.name, pdu.pdu_id);
    }
}

impl FireAndForgetConsumer for LoggingConsumer {
    fn deliver(&self, pdu: RxPdu, payload: &[u8]) {
        info!(
            "{}: pdu {} on {} ({} bytes)",
            self.name,
            pdu.pdu_id,
            pdu.connection,
            payload.len()
        );
    }
}

/// Transport seam forwarding connection events to the gateway.
///
/// Socket buffers are managed by the kernel, so credit is only traced.
pub struct GatewayTransport {
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl GatewayTransport {
    /// Create the transport and the receiver for its events.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Transport for GatewayTransport {
    fn ack_consumed(&self, socket: SocketId, len: usize) {
        trace!("{socket}: {len} bytes consumed");
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!("gateway stopped; dropping {event:?}");
        }
    }
}

/// Socket adapter driving an [`RxEngine`] from tokio sockets.
pub struct Gateway {
    engine: Arc<RxEngine>,
    streams: DashMap<ConnectionId, CancellationToken>,
    next_socket: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Gateway {
    #[must_use]
    pub fn new(engine: Arc<RxEngine>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            engine,
            streams: DashMap::new(),
            next_socket: AtomicU64::new(1),
            shutdown,
            tracker: TaskTracker::new(),
        })
    }

    /// Bind every group with a local address and start its reader tasks.
    ///
    /// Returns the bound addresses, keyed by group.
    ///
    /// # Errors
    ///
    /// Returns an error if a socket cannot be bound.
    pub async fn bind(self: &Arc<Self>) -> io::Result<Vec<(GroupId, SocketAddr)>> {
        let mut bound = Vec::new();
        for group in self.engine.group_ids() {
            let (transport, local) = self.engine.group_endpoint(group).map_err(io::Error::other)?;
            let Some(local) = local else {
                warn!("{group}: no local address configured; not listening");
                continue;
            };
            for connection in self.engine.group_connections(group).map_err(io::Error::other)? {
                self.engine
                    .open_connection(connection)
                    .map_err(io::Error::other)?;
            }
            let addr = match transport {
                TransportKind::Datagram => {
                    let socket = UdpSocket::bind(local).await?;
                    let addr = socket.local_addr()?;
                    let id = self.next_socket_id();
                    self.engine
                        .bind_datagram_socket(group, id)
                        .map_err(io::Error::other)?;
                    let span = info_span!("datagrams", %group, %addr);
                    self.tracker
                        .spawn(Arc::clone(self).read_datagrams(socket, id).instrument(span));
                    addr
                }
                TransportKind::Stream => {
                    let listener = TcpListener::bind(local).await?;
                    let addr = listener.local_addr()?;
                    self.tracker
                        .spawn(Arc::clone(self).accept_streams(listener, group));
                    addr
                }
            };
            info!("{group}: listening on {addr} ({transport:?})");
            bound.push((group, addr));
        }
        Ok(bound)
    }

    /// Close streams whose connection the engine asked to re-establish.
    pub fn spawn_event_handler(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = this.shutdown.cancelled() => break,

                    event = events.recv() => match event {
                        Some(ConnectionEvent::ReconnectRequested { connection, reason }) => {
                            info!("{connection}: closing stream for reconnect ({reason})");
                            if let Some(token) = this.streams.get(&connection) {
                                token.cancel();
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }

    /// Start the continuation driver.
    pub fn spawn_driver(&self, period: Duration) {
        self.tracker.spawn(run_continuation_driver(
            Arc::clone(&self.engine),
            period,
            self.shutdown.clone(),
        ));
    }

    /// Wait for every task to finish after shutdown.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn next_socket_id(&self) -> SocketId { SocketId::new(self.next_socket.fetch_add(1, Ordering::Relaxed)) }

    async fn read_datagrams(self: Arc<Self>, socket: UdpSocket, id: SocketId) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                res = socket.recv_from(&mut buf) => match res {
                    Ok((len, peer)) => match self.engine.on_datagram(id, peer, &buf[..len]) {
                        Ok(report) => debug!("{id}: datagram from {peer}: {report:?}"),
                        Err(e) => warn!("{id}: datagram from {peer} not processed: {e}"),
                    },
                    Err(e) => warn!("{id}: receive error: {e}"),
                },
            }
        }
    }

    async fn accept_streams(self: Arc<Self>, listener: TcpListener, group: GroupId) {
        let mut delay = Duration::from_millis(10);
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                res = listener.accept() => match res {
                    Ok((stream, peer)) => {
                        let id = self.next_socket_id();
                        match self.engine.accept_stream(group, id, peer) {
                            Ok(connection) => {
                                let token = self.shutdown.child_token();
                                self.streams.insert(connection, token.clone());
                                let span = info_span!("stream", %connection, %peer);
                                self.tracker.spawn(
                                    Arc::clone(&self)
                                        .read_stream(stream, connection, id, peer, token)
                                        .instrument(span),
                                );
                            }
                            Err(e) => info!("{group}: rejecting stream from {peer}: {e}"),
                        }
                        delay = Duration::from_millis(10);
                    }
                    Err(e) => {
                        warn!("{group}: accept error: {e}");
                        sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_secs(1));
                    }
                },
            }
        }
    }

    async fn read_stream(
        self: Arc<Self>,
        mut stream: TcpStream,
        connection: ConnectionId,
        socket: SocketId,
        peer: SocketAddr,
        token: CancellationToken,
    ) {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => break,

                res = stream.read(&mut buf) => match res {
                    Ok(0) => break,
                    Ok(len) => {
                        if let Err(e) = self.engine.on_stream_data(socket, peer, &buf[..len]) {
                            warn!("{connection}: stream data not processed: {e}");
                        }
                    }
                    Err(e) => {
                        warn!("{connection}: read error: {e}");
                        break;
                    }
                },
            }
        }
        self.streams.remove(&connection);
        if let Err(e) = self.engine.release_connection(connection) {
            warn!("{connection}: release failed: {e}");
        }
        if !self.shutdown.is_cancelled()
            && let Err(e) = self.engine.open_connection(connection)
        {
            warn!("{connection}: reopen failed: {e}");
        }
    }
}
