//! Wire-format builders.

use bytes::BytesMut;
use pdumux::frame::{Endianness, FrameHeader};

/// Encode one big-endian frame.
#[must_use]
pub fn frame(frame_id: u32, payload: &[u8]) -> Vec<u8> { frame_with_endianness(frame_id, payload, Endianness::Big) }

/// Encode one frame using `endianness` for the header fields.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn frame_with_endianness(frame_id: u32, payload: &[u8], endianness: Endianness) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("payload length fits a frame header");
    let mut buf = BytesMut::with_capacity(payload.len() + pdumux::frame::HEADER_LEN);
    FrameHeader::new(frame_id, len).write(endianness, &mut buf);
    buf.extend_from_slice(payload);
    buf.to_vec()
}

/// Concatenate big-endian frames, as carried by one datagram.
#[must_use]
pub fn frames(parts: &[(u32, &[u8])]) -> Vec<u8> {
    parts
        .iter()
        .flat_map(|(frame_id, payload)| frame(*frame_id, payload))
        .collect()
}
