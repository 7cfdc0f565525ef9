//! Fixed PDU header layout and length ceilings.
use bytes::{Buf, BufMut};
use serde::Deserialize;

use crate::config::TransportKind;

/// Size of the on-wire header: frame identifier then payload length.
pub const HEADER_LEN: usize = 8;

/// Largest payload a datagram can carry after the header.
pub const DATAGRAM_PAYLOAD_MAX: usize = 0xFFFF - HEADER_LEN;

/// Byte order of both header fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Most significant byte first.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// Raw header fields as read from the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_id: u32,
    pub len: u32,
}

impl FrameHeader {
    #[must_use]
    pub const fn new(frame_id: u32, len: u32) -> Self { Self { frame_id, len } }

    /// Read both fields from the first [`HEADER_LEN`] bytes of `src`.
    ///
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are available.
    #[must_use]
    pub fn read(mut src: &[u8], endianness: Endianness) -> Option<Self> {
        if src.len() < HEADER_LEN {
            return None;
        }
        let header = match endianness {
            Endianness::Big => Self::new(src.get_u32(), src.get_u32()),
            Endianness::Little => Self::new(src.get_u32_le(), src.get_u32_le()),
        };
        Some(header)
    }

    /// Append the encoded header to `dst`.
    pub fn write(&self, endianness: Endianness, dst: &mut impl BufMut) {
        match endianness {
            Endianness::Big => {
                dst.put_u32(self.frame_id);
                dst.put_u32(self.len);
            }
            Endianness::Little => {
                dst.put_u32_le(self.frame_id);
                dst.put_u32_le(self.len);
            }
        }
    }
}

/// Header layout and length ceilings applied on one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFormat {
    endianness: Endianness,
    transport_ceiling: Option<usize>,
    absolute_ceiling: usize,
}

impl FrameFormat {
    /// Build the format for `transport`, with `max_pdu_len` counting the
    /// header.
    #[must_use]
    pub fn new(endianness: Endianness, transport: TransportKind, max_pdu_len: u32) -> Self {
        let transport_ceiling = match transport {
            TransportKind::Datagram => Some(DATAGRAM_PAYLOAD_MAX),
            TransportKind::Stream => None,
        };
        let max_pdu_len = usize::try_from(max_pdu_len).unwrap_or(usize::MAX);
        Self {
            endianness,
            transport_ceiling,
            absolute_ceiling: max_pdu_len.saturating_sub(HEADER_LEN),
        }
    }

    #[must_use]
    pub fn endianness(&self) -> Endianness { self.endianness }

    /// Validate a declared payload length.
    ///
    /// # Errors
    ///
    /// Returns the violated ceiling, which doubles as the clamped length.
    pub fn check_len(&self, declared: u32) -> Result<usize, usize> {
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        if let Some(limit) = self.transport_ceiling
            && declared > limit
        {
            return Err(limit);
        }
        if declared > self.absolute_ceiling {
            return Err(self.absolute_ceiling);
        }
        Ok(declared)
    }
}

impl Default for FrameFormat {
    fn default() -> Self { Self::new(Endianness::Big, TransportKind::Stream, u32::MAX) }
}
