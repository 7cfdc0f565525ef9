//! Fixed-capacity byte queue staging data a consumer could not take yet.
//!
//! The buffer is an index pair over an owned slice. `store` appends
//! atomically; `deliver`, `discard` and `copy_out` consume from the front.
//! The logical content may wrap around the end of the backing storage, so
//! consumers are fed at most two contiguous runs per delivery.

use bytes::Buf;
use thiserror::Error;

use crate::consumer::{CopyError, RxPdu, StreamingConsumer};

/// Errors produced by [`RingBuffer::store`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    /// The data does not fit into the free space. Nothing was written.
    #[error("ring buffer overflow: {requested} bytes requested, {free} free")]
    Overflow { requested: usize, free: usize },
}

/// Circular byte queue owned by one connection.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    read: usize,
    write: usize,
    used: usize,
}

impl RingBuffer {
    /// Allocate a buffer holding up to `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            used: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize { self.storage.len() }

    /// Bytes currently queued.
    #[must_use]
    pub fn len(&self) -> usize { self.used }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.used == 0 }

    /// Bytes that can still be stored.
    #[must_use]
    pub fn free(&self) -> usize { self.capacity() - self.used }

    /// Append `header` (if any) followed by `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::Overflow`] without writing anything when
    /// the combined length exceeds the free space.
    pub fn store(&mut self, header: Option<&[u8]>, payload: &[u8]) -> Result<(), RingBufferError> {
        let header = header.unwrap_or_default();
        let requested = header.len() + payload.len();
        if requested > self.free() {
            return Err(RingBufferError::Overflow {
                requested,
                free: self.free(),
            });
        }
        self.push(header);
        self.push(payload);
        Ok(())
    }

    fn push(&mut self, mut src: &[u8]) {
        while !src.is_empty() {
            let run = src.len().min(self.capacity() - self.write);
            self.storage[self.write..self.write + run].copy_from_slice(&src[..run]);
            self.write = (self.write + run) % self.capacity();
            self.used += run;
            src = &src[run..];
        }
    }

    /// Contiguous run at the front of the queue.
    #[must_use]
    pub fn front_run(&self) -> &[u8] {
        let end = (self.read + self.used).min(self.capacity());
        &self.storage[self.read..end]
    }

    /// Feed up to `max_len` queued bytes to a streaming consumer.
    ///
    /// Each contiguous run is passed in its own `copy_data` call, so a wrap
    /// costs two calls. The second run is capped by the space the consumer
    /// reported after the first. The read cursor only advances past runs the
    /// consumer accepted.
    ///
    /// Returns the number of bytes delivered with the result of the last
    /// copy: the consumer's remaining space, or its error. When no copy is
    /// attempted the result is `Ok(0)`.
    pub fn deliver(
        &mut self,
        consumer: &dyn StreamingConsumer,
        pdu: RxPdu,
        max_len: usize,
    ) -> (usize, Result<usize, CopyError>) {
        let mut delivered = 0;
        let mut limit = max_len.min(self.used);
        let mut last = Ok(0);
        for _ in 0..2 {
            let run = self.front_run().len().min(limit);
            if run == 0 {
                break;
            }
            last = consumer.copy_data(pdu, &self.front_run()[..run]);
            let Ok(space) = last else { break };
            self.consume(run);
            delivered += run;
            limit = (limit - run).min(space);
        }
        (delivered, last)
    }

    /// Skip `len` bytes.
    ///
    /// If fewer than `len` bytes are queued the content is inconsistent with
    /// the caller's accounting; the buffer is flushed and the number of
    /// bytes actually dropped is returned.
    pub fn discard(&mut self, len: usize) -> usize {
        if len <= self.used {
            self.consume(len);
            len
        } else {
            let dropped = self.used;
            self.clear();
            dropped
        }
    }

    /// Copy queued bytes into `dst` without consuming them.
    pub fn peek_into(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.used);
        let first = n.min(self.capacity() - self.read);
        dst[..first].copy_from_slice(&self.storage[self.read..self.read + first]);
        dst[first..n].copy_from_slice(&self.storage[..n - first]);
        n
    }

    /// Copy queued bytes into `dst` and consume them.
    pub fn copy_out(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek_into(dst);
        self.consume(n);
        n
    }

    /// Drop everything and reset the cursors.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.used = 0;
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.used);
        self.used -= n;
        if self.used == 0 {
            self.clear();
        } else {
            self.read = (self.read + n) % self.capacity();
        }
    }

    /// Borrow the buffer as a [`Buf`] for the reassembly machinery.
    pub fn reader(&mut self) -> RingReader<'_> { RingReader(self) }
}

/// Consuming [`Buf`] view over a [`RingBuffer`].
#[derive(Debug)]
pub struct RingReader<'a>(&'a mut RingBuffer);

impl RingReader<'_> {
    /// Underlying buffer.
    pub fn ring(&mut self) -> &mut RingBuffer { self.0 }
}

impl Buf for RingReader<'_> {
    fn remaining(&self) -> usize { self.0.len() }

    fn chunk(&self) -> &[u8] { self.0.front_run() }

    fn advance(&mut self, cnt: usize) { self.0.discard(cnt); }
}
