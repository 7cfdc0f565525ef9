//! Gateway configuration types.
//!
//! Configuration is read once (typically from JSON) and validated by
//! [`RxEngine::builder`](crate::RxEngine::builder) into immutable runtime
//! tables. Only route enable bits change afterwards.
use std::{
    net::{IpAddr, SocketAddr},
    path::Path,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{frame::Endianness, route::Contract};

/// Default ring buffer capacity per connection, in bytes.
pub const DEFAULT_RING_CAPACITY: usize = 4096;
/// Default linear buffer capacity per connection, in bytes.
pub const DEFAULT_LINEAR_CAPACITY: usize = 4096;

/// Transport used by a socket group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Connection-oriented byte stream (TCP).
    Stream,
    /// Connectionless datagrams (UDP).
    Datagram,
}

/// Handling of datagram bytes that do not form a complete frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Ignore trailing bytes once a valid frame was found.
    #[default]
    Lenient,
    /// Reject the whole datagram.
    Strict,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("socket group `{0}` has no connections")]
    EmptyGroup(String),
    #[error("frame id {0:#010x} is configured twice in one table")]
    DuplicateFrameId(u32),
    #[error("route for frame id {0:#010x} has no destinations")]
    NoDestination(u32),
    #[error("route for frame id {0:#010x} has overlapping destination selectors")]
    AmbiguousDestination(u32),
    #[error("route for frame id {frame_id:#010x} selects offset {offset} in a group of {size}")]
    SelectorOutOfRange {
        frame_id: u32,
        offset: usize,
        size: usize,
    },
    #[error("no {contract} consumer registered as `{name}`")]
    UnknownConsumer { name: String, contract: &'static str },
    #[error("header-less connection `{connection}` needs exactly one route, found {found}")]
    HeaderlessRoutes { connection: String, found: usize },
    #[error("stream connection `{0}` carries streaming routes but has no ring buffer")]
    ZeroRingCapacity(String),
}

/// Remote address with optional wildcards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RemotePattern {
    /// `None` matches any address.
    #[serde(default)]
    pub ip: Option<IpAddr>,
    /// `None` matches any port.
    #[serde(default)]
    pub port: Option<u16>,
}

impl RemotePattern {
    /// Pattern matching any peer.
    #[must_use]
    pub const fn wildcard() -> Self { Self { ip: None, port: None } }

    /// Pattern matching exactly `addr`.
    #[must_use]
    pub const fn exact(addr: SocketAddr) -> Self {
        Self {
            ip: Some(addr.ip()),
            port: Some(addr.port()),
        }
    }
}

/// A destination of a route.
#[derive(Clone, Debug, Deserialize)]
pub struct DestinationConfig {
    /// Name the consumer is registered under.
    pub consumer: String,
    /// PDU identifier passed to the consumer.
    pub pdu_id: u32,
    /// Restrict this destination to one connection offset in the group.
    #[serde(default)]
    pub connection_offset: Option<usize>,
}

/// A receive route.
#[derive(Clone, Debug, Deserialize)]
pub struct RouteConfig {
    pub frame_id: u32,
    pub contract: Contract,
    pub destinations: Vec<DestinationConfig>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A logical connection inside a socket group.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub remote: RemotePattern,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    #[serde(default = "default_linear_capacity")]
    pub linear_capacity: usize,
    /// Bind a wildcard remote to the first accepted peer.
    #[serde(default = "default_true")]
    pub bind_remote: bool,
    /// Overrides the group's trailing-byte policy.
    #[serde(default)]
    pub trailing: Option<TrailingPolicy>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl ConnectionConfig {
    /// Connection with default buffers and the given remote pattern.
    #[must_use]
    pub fn new(remote: RemotePattern) -> Self {
        Self {
            name: None,
            remote,
            ring_capacity: DEFAULT_RING_CAPACITY,
            linear_capacity: DEFAULT_LINEAR_CAPACITY,
            bind_remote: true,
            trailing: None,
            routes: Vec::new(),
        }
    }
}

/// Connections sharing one local socket.
#[derive(Clone, Debug, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Local address used by the demonstration gateway.
    #[serde(default)]
    pub local: Option<SocketAddr>,
    pub transport: TransportKind,
    #[serde(default = "default_true")]
    pub header_mode: bool,
    #[serde(default)]
    pub trailing: TrailingPolicy,
    #[serde(default)]
    pub endianness: Endianness,
    /// Largest PDU including its header.
    #[serde(default = "default_max_pdu_len")]
    pub max_pdu_len: u32,
    /// Routes shared by every connection of the group.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    pub connections: Vec<ConnectionConfig>,
}

impl GroupConfig {
    /// Group with default framing and no routes.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            local: None,
            transport,
            header_mode: true,
            trailing: TrailingPolicy::default(),
            endianness: Endianness::default(),
            max_pdu_len: u32::MAX,
            routes: Vec::new(),
            connections: Vec::new(),
        }
    }
}

/// Complete receive-path configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayConfig {
    pub groups: Vec<GroupConfig>,
}

impl GatewayConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> { Ok(serde_json::from_str(text)?) }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Names of every consumer referenced by a route, with their contract.
    #[must_use]
    pub fn consumer_names(&self) -> Vec<(String, Contract)> {
        let mut names: Vec<(String, Contract)> = Vec::new();
        let routes = self.groups.iter().flat_map(|g| {
            g.routes
                .iter()
                .chain(g.connections.iter().flat_map(|c| c.routes.iter()))
        });
        for route in routes {
            for dest in &route.destinations {
                if !names
                    .iter()
                    .any(|(n, c)| *n == dest.consumer && *c == route.contract)
                {
                    names.push((dest.consumer.clone(), route.contract));
                }
            }
        }
        names
    }
}

fn default_true() -> bool { true }

fn default_ring_capacity() -> usize { DEFAULT_RING_CAPACITY }

fn default_linear_capacity() -> usize { DEFAULT_LINEAR_CAPACITY }

fn default_max_pdu_len() -> u32 { u32::MAX }

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "groups": [{
            "name": "diag",
            "transport": "datagram",
            "trailing": "strict",
            "endianness": "little",
            "routes": [{
                "frame_id": 16,
                "contract": "fire_and_forget",
                "destinations": [{ "consumer": "log", "pdu_id": 1 }]
            }],
            "connections": [
                { "remote": { "ip": "10.0.0.2", "port": 13400 } },
                { "ring_capacity": 128, "bind_remote": false }
            ]
        }]
    }"#;

    #[test]
    fn parses_defaults_and_overrides() {
        let config = GatewayConfig::from_json(SAMPLE).expect("valid configuration");
        let group = &config.groups[0];

        assert_eq!(group.transport, TransportKind::Datagram);
        assert_eq!(group.trailing, TrailingPolicy::Strict);
        assert_eq!(group.endianness, Endianness::Little);
        assert!(group.header_mode);
        assert_eq!(group.max_pdu_len, u32::MAX);
        assert_eq!(group.connections[0].remote.port, Some(13400));
        assert_eq!(group.connections[1].remote, RemotePattern::wildcard());
        assert_eq!(group.connections[1].ring_capacity, 128);
        assert_eq!(
            group.connections[1].linear_capacity,
            DEFAULT_LINEAR_CAPACITY
        );
        assert!(!group.connections[1].bind_remote);
        assert!(group.routes[0].enabled);
    }

    #[test]
    fn collects_consumer_names_once() {
        let config = GatewayConfig::from_json(SAMPLE).expect("valid configuration");
        assert_eq!(
            config.consumer_names(),
            vec![("log".to_owned(), Contract::FireAndForget)]
        );
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = GatewayConfig::from_json(r#"{"groups":[{"name":"x","transport":"pipe","connections":[]}]}"#)
            .expect_err("transport must be known");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
