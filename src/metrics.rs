//! Metric helpers for `pdumux`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{route::Contract, transport::ReconnectReason};

/// Name of the counter tracking PDUs handed to consumers.
pub const FRAMES_DELIVERED: &str = "pdumux_frames_delivered_total";
/// Name of the counter tracking discarded frames, labelled by reason.
pub const FRAMES_DROPPED: &str = "pdumux_frames_dropped_total";
/// Name of the counter tracking credit returned to the transport.
pub const BYTES_ACKNOWLEDGED: &str = "pdumux_bytes_acknowledged_total";
/// Name of the counter tracking forced reconnects, labelled by reason.
pub const RECONNECTS_REQUESTED: &str = "pdumux_reconnects_requested_total";
/// Name of the counter tracking datagrams rejected by validation.
pub const DATAGRAMS_REJECTED: &str = "pdumux_datagrams_rejected_total";

/// Record a PDU delivered under `contract`.
pub fn inc_delivered(contract: Contract) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DELIVERED, "contract" => contract.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = contract;
}

/// Record a dropped frame.
pub fn inc_dropped(reason: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DROPPED, "reason" => reason).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

/// Record credit returned to the transport.
pub fn add_acknowledged(bytes: usize) {
    #[cfg(feature = "metrics")]
    counter!(BYTES_ACKNOWLEDGED).increment(u64::try_from(bytes).unwrap_or(u64::MAX));
    #[cfg(not(feature = "metrics"))]
    let _ = bytes;
}

/// Record a forced reconnect.
pub fn inc_reconnects(reason: ReconnectReason) {
    #[cfg(feature = "metrics")]
    counter!(RECONNECTS_REQUESTED, "reason" => reason.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

/// Record a datagram rejected as a whole.
pub fn inc_datagrams_rejected() {
    #[cfg(feature = "metrics")]
    counter!(DATAGRAMS_REJECTED).increment(1);
}
