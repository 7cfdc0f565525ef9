//! Upper-layer consumer contracts.
//!
//! A route hands its PDUs to exactly one consumer, using one of two
//! contracts fixed by configuration:
//!
//! - [`StreamingConsumer`] receives a PDU piecewise and may push back by
//!   reporting how much buffer space it has left.
//! - [`FireAndForgetConsumer`] receives each PDU whole, in a single call.
//!
//! Consumers are invoked while the owning connection is locked, so they must
//! not call back into the engine for the same connection.

use thiserror::Error;

use crate::socket_map::ConnectionId;

/// Identifies a PDU handed to a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RxPdu {
    /// Destination PDU identifier configured on the route.
    pub pdu_id: u32,
    /// Frame identifier seen on the wire.
    pub frame_id: u32,
    /// Connection the PDU arrived on.
    pub connection: ConnectionId,
}

/// Final status reported to a streaming consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceptionOutcome {
    /// Every declared byte was copied.
    Ok,
    /// The reception was abandoned.
    Failed,
}

/// Returned by [`StreamingConsumer::start_reception`] to decline a PDU.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("consumer refused the reception")]
pub struct Refused;

/// Errors a streaming consumer may report while copying.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CopyError {
    /// The consumer cannot take data right now.
    ///
    /// On an empty query chunk this reads as "no space available"; on a
    /// non-empty chunk it fails the reception.
    #[error("consumer busy")]
    Busy,
    /// The consumer rejects the reception.
    #[error("consumer refused data")]
    Refused,
}

/// Consumer using the backpressure-aware partial-copy contract.
pub trait StreamingConsumer: Send + Sync {
    /// Announce a new PDU of `declared_len` payload bytes.
    ///
    /// Returns the number of bytes the consumer can accept right now.
    /// Header-less streams announce a length of zero because the extent is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Refused`] to decline the PDU. No completion callback follows
    /// a refusal.
    fn start_reception(&self, pdu: RxPdu, declared_len: usize) -> Result<usize, Refused>;

    /// Copy `chunk` into the consumer.
    ///
    /// An empty `chunk` only queries the space available. Returns the space
    /// remaining after the copy.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] when the data cannot be taken.
    fn copy_data(&self, pdu: RxPdu, chunk: &[u8]) -> Result<usize, CopyError>;

    /// Close a reception previously accepted by `start_reception`.
    fn reception_complete(&self, pdu: RxPdu, outcome: ReceptionOutcome);
}

/// Consumer receiving every PDU in one piece.
pub trait FireAndForgetConsumer: Send + Sync {
    /// Deliver a complete PDU payload.
    fn deliver(&self, pdu: RxPdu, payload: &[u8]);
}
