#![doc(html_root_url = "https://docs.rs/pdumux/latest")]
//! Public API for the `pdumux` library.
//!
//! This crate implements the receive side of a socket gateway that
//! multiplexes many logical PDU streams over shared TCP and UDP sockets. It
//! decodes frame headers, routes frames to upper-layer consumers, stages data
//! those consumers cannot take yet, and returns flow-control credit to the
//! transport.

pub mod address;
pub mod config;
pub mod consumer;
pub mod datagram;
pub mod driver;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod metrics;
pub mod reassembly;
pub mod ring_buffer;
pub mod route;
pub mod socket_map;
pub mod transport;

pub use address::{AddressMatch, LinkPhase};
pub use config::{ConfigError, GatewayConfig, TransportKind};
pub use consumer::{
    CopyError,
    FireAndForgetConsumer,
    ReceptionOutcome,
    Refused,
    RxPdu,
    StreamingConsumer,
};
pub use datagram::DatagramReport;
pub use driver::run_continuation_driver;
pub use engine::{RxEngine, RxEngineBuilder};
pub use error::{Result, RxError};
pub use metrics::{BYTES_ACKNOWLEDGED, DATAGRAMS_REJECTED, FRAMES_DELIVERED, FRAMES_DROPPED, RECONNECTS_REQUESTED};
pub use reassembly::{OpenReception, ReassemblyPhase};
pub use socket_map::{ConnectionId, GroupId, SocketId};
pub use transport::{ConnectionEvent, ReconnectReason, Transport};
