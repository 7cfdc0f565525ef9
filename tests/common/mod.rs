//! Shared utilities for integration tests.
//!
//! Builds engines around one [`RecordingConsumer`] registered under
//! [`CONSUMER`] for both contracts and a [`RecordingTransport`], plus
//! shorthand for the configuration records the tests assemble.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use pdumux::{
    ConnectionId,
    GatewayConfig,
    RxEngine,
    SocketId,
    TransportKind,
    config::{ConnectionConfig, DestinationConfig, GroupConfig, RemotePattern, RouteConfig},
    route::Contract,
};
use pdumux_testing::{RecordingConsumer, RecordingTransport};

pub const CONSUMER: &str = "recorder";
pub const STREAMING_FRAME: u32 = 0x0000_0101;
pub const STREAMING_PDU: u32 = 11;
pub const FIRE_AND_FORGET_FRAME: u32 = 0x0000_0202;
pub const FIRE_AND_FORGET_PDU: u32 = 22;
pub const SOCKET: SocketId = SocketId::new(7);

/// Shared test result type.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Peer at `10.0.0.<last>:<port>`.
pub fn peer(last: u8, port: u16) -> SocketAddr { SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port) }

/// The peer most tests talk to.
pub fn default_peer() -> SocketAddr { peer(2, 13400) }

/// Route with one fallback destination handled by [`CONSUMER`].
pub fn route(frame_id: u32, contract: Contract, pdu_id: u32) -> RouteConfig {
    RouteConfig {
        frame_id,
        contract,
        destinations: vec![DestinationConfig {
            consumer: CONSUMER.to_owned(),
            pdu_id,
            connection_offset: None,
        }],
        enabled: true,
    }
}

/// The streaming and fire-and-forget routes used throughout the tests.
pub fn standard_routes() -> Vec<RouteConfig> {
    vec![
        route(STREAMING_FRAME, Contract::Streaming, STREAMING_PDU),
        route(
            FIRE_AND_FORGET_FRAME,
            Contract::FireAndForget,
            FIRE_AND_FORGET_PDU,
        ),
    ]
}

/// Single-connection stream group whose connection owns `routes` and
/// expects [`default_peer`].
pub fn stream_config(routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut connection = ConnectionConfig::new(RemotePattern::exact(default_peer()));
    connection.routes = routes;
    let mut group = GroupConfig::new("tcp", TransportKind::Stream);
    group.connections.push(connection);
    GatewayConfig {
        groups: vec![group],
    }
}

/// Datagram group with the given member remotes and shared `routes`.
pub fn datagram_config(remotes: &[RemotePattern], routes: Vec<RouteConfig>) -> GatewayConfig {
    let mut group = GroupConfig::new("udp", TransportKind::Datagram);
    group.routes = routes;
    group.connections = remotes
        .iter()
        .map(|remote| ConnectionConfig::new(*remote))
        .collect();
    GatewayConfig {
        groups: vec![group],
    }
}

/// Engine plus the doubles observing it.
pub struct Harness {
    pub engine: RxEngine,
    pub consumer: Arc<RecordingConsumer>,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    /// Build an engine for `config` with an unlimited consumer.
    pub fn new(config: GatewayConfig) -> TestResult<Self> { Self::with_consumer(config, RecordingConsumer::default()) }

    /// Build an engine for `config` around `consumer`.
    pub fn with_consumer(config: GatewayConfig, consumer: RecordingConsumer) -> TestResult<Self> {
        let consumer = Arc::new(consumer);
        let transport = Arc::new(RecordingTransport::default());
        let engine = RxEngine::builder(config)
            .streaming_consumer(CONSUMER, consumer.clone())
            .fire_and_forget_consumer(CONSUMER, consumer.clone())
            .transport(transport.clone())
            .build()?;
        Ok(Self {
            engine,
            consumer,
            transport,
        })
    }

    /// Open the first connection and attach [`SOCKET`] connected to
    /// [`default_peer`].
    pub fn connect_stream(&self) -> TestResult<ConnectionId> {
        let connection = ConnectionId::new(0);
        self.engine.open_connection(connection)?;
        self.engine
            .connect_stream(connection, SOCKET, default_peer())?;
        Ok(connection)
    }

    /// Open every connection of the first group and bind [`SOCKET`] to it.
    pub fn open_datagram_group(&self) -> TestResult<Vec<ConnectionId>> {
        let group = self.engine.group_id("udp").ok_or("udp group missing")?;
        let connections = self.engine.group_connections(group)?;
        for connection in &connections {
            self.engine.open_connection(*connection)?;
        }
        self.engine.bind_datagram_socket(group, SOCKET)?;
        Ok(connections)
    }
}
