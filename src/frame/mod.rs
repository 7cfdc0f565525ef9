//! Frame header decoding and route lookup.
//!
//! Every PDU on the wire is prefixed by a [`HEADER_LEN`]-byte header holding
//! the frame identifier and the payload length. [`decode`] validates the
//! length against the connection's ceilings and resolves the identifier
//! through the connection's [`RouteScope`]. Decoding never allocates.

use std::sync::Arc;

use crate::{
    error::RxError,
    route::{Destination, Route},
};

mod header;
mod route_table;

pub use header::{DATAGRAM_PAYLOAD_MAX, Endianness, FrameFormat, FrameHeader, HEADER_LEN};
pub use route_table::{RouteScope, RouteTable};

/// A header resolved to an enabled route.
#[derive(Clone, Copy, Debug)]
pub struct DecodedHeader<'a> {
    pub frame_id: u32,
    /// Declared payload length.
    pub len: usize,
    pub route: &'a Arc<Route>,
    pub destination: &'a Destination,
}

/// Decode the header at the front of `bytes`.
///
/// # Errors
///
/// - [`RxError::IncompleteHeader`] when fewer than [`HEADER_LEN`] bytes are present.
/// - [`RxError::InvalidLength`] when the declared length breaks a ceiling. The error carries the
///   clamped length so callers can stay byte-aligned.
/// - [`RxError::UnknownRoute`] when the identifier has no enabled destination for this connection.
pub fn decode<'a>(
    bytes: &[u8],
    format: &FrameFormat,
    scope: &RouteScope<'a>,
) -> Result<DecodedHeader<'a>, RxError> {
    let header = FrameHeader::read(bytes, format.endianness()).ok_or(RxError::IncompleteHeader {
        available: bytes.len(),
    })?;
    let len = format
        .check_len(header.len)
        .map_err(|clamped| RxError::InvalidLength {
            frame_id: header.frame_id,
            clamped,
        })?;
    let (route, destination) = scope
        .resolve(header.frame_id)
        .ok_or(RxError::UnknownRoute {
            frame_id: header.frame_id,
            len,
        })?;
    Ok(DecodedHeader {
        frame_id: header.frame_id,
        len,
        route,
        destination,
    })
}
