//! Byte sources feeding the reassembly machine.
//!
//! Fresh transport data arrives as a plain slice; resumed data comes out of
//! the connection's ring buffer. Both are [`Buf`]s, and both forward payload
//! to a streaming consumer one contiguous run per copy.

use bytes::Buf;

use crate::{
    consumer::{CopyError, RxPdu, StreamingConsumer},
    ring_buffer::RingReader,
};

/// A [`Buf`] that can feed a streaming consumer directly.
pub(crate) trait RxInput: Buf {
    /// Copy up to `max_len` bytes into `consumer`, consuming what it takes.
    ///
    /// Returns the bytes forwarded and the result of the last copy.
    fn forward(
        &mut self,
        consumer: &dyn StreamingConsumer,
        pdu: RxPdu,
        max_len: usize,
    ) -> (usize, Result<usize, CopyError>);
}

impl RxInput for &[u8] {
    fn forward(
        &mut self,
        consumer: &dyn StreamingConsumer,
        pdu: RxPdu,
        max_len: usize,
    ) -> (usize, Result<usize, CopyError>) {
        let run = max_len.min(self.len());
        if run == 0 {
            return (0, Ok(0));
        }
        match consumer.copy_data(pdu, &self[..run]) {
            Ok(space) => {
                self.advance(run);
                (run, Ok(space))
            }
            Err(err) => (0, Err(err)),
        }
    }
}

impl RxInput for RingReader<'_> {
    fn forward(
        &mut self,
        consumer: &dyn StreamingConsumer,
        pdu: RxPdu,
        max_len: usize,
    ) -> (usize, Result<usize, CopyError>) {
        self.ring().deliver(consumer, pdu, max_len)
    }
}
