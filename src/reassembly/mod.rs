//! Per-connection reassembly state.
//!
//! [`RxContext`] owns everything one connection needs to recover PDUs from a
//! byte stream: the ring buffer holding data the consumer could not take
//! yet, the header staging area, the linear buffer collecting
//! fire-and-forget payloads, and the state of the PDU in flight.
//!
//! While the ring buffer holds data, fresh deliveries are appended to it
//! rather than processed inline, so PDUs always reach consumers in wire
//! order. Transport credit is reported for every byte consumed, delivered or
//! discarded; bytes parked in the ring are credited when they leave it.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    config::TrailingPolicy,
    consumer::{FireAndForgetConsumer, ReceptionOutcome, RxPdu, StreamingConsumer},
    error::RxError,
    frame::{FrameFormat, HEADER_LEN, RouteScope},
    metrics,
    ring_buffer::{RingBuffer, RingBufferError},
    route::Contract,
    socket_map::ConnectionId,
    transport::ReconnectReason,
};

mod input;
mod stream;

use stream::{Machine, Mode, Outcome};

/// Observable reassembly phase of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblyPhase {
    /// No PDU in flight.
    Idle,
    /// Part of a frame header has been staged.
    HeaderPending,
    /// A PDU body is being forwarded, collected or skipped.
    BodyPending,
    /// The ring buffer holds data; new deliveries queue behind it.
    Draining,
}

/// Snapshot of the streaming reception in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenReception {
    pub pdu: RxPdu,
    /// `None` on header-less streams.
    pub declared: Option<usize>,
    pub forwarded: usize,
}

/// Static facts about a connection needed while processing its data.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RxView<'a> {
    pub connection: ConnectionId,
    pub scope: RouteScope<'a>,
    pub format: FrameFormat,
    pub header_mode: bool,
    pub trailing: TrailingPolicy,
}

/// Bytes to credit, plus any reconnect the data forced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Progress {
    pub consumed: usize,
    pub reconnect: Option<ReconnectReason>,
}

impl Progress {
    pub(crate) fn consumed(consumed: usize) -> Self {
        Self {
            consumed,
            reconnect: None,
        }
    }
}

/// Streaming PDU whose reception has been accepted.
pub(crate) struct OpenPdu {
    pub pdu: RxPdu,
    pub consumer: Arc<dyn StreamingConsumer>,
    pub declared: Option<usize>,
    pub forwarded: usize,
    /// Space the consumer last reported.
    pub space: usize,
}

impl OpenPdu {
    fn remaining(&self) -> usize {
        self.declared
            .map_or(usize::MAX, |declared| declared - self.forwarded)
    }

    fn is_complete(&self) -> bool { self.declared == Some(self.forwarded) }
}

/// Fire-and-forget PDU spanning several deliveries.
pub(crate) struct Collecting {
    pub pdu: RxPdu,
    pub consumer: Arc<dyn FireAndForgetConsumer>,
    pub declared: usize,
}

/// State of the PDU in flight.
#[derive(Default)]
pub(crate) enum RxState {
    #[default]
    Idle,
    Body(OpenPdu),
    Collecting(Collecting),
    /// Skipping the rest of a rejected frame.
    Discarding { frame_id: u32, remaining: usize },
}

/// Frame header bytes split across deliveries.
#[derive(Debug, Default)]
pub(crate) struct HeaderStage {
    pub bytes: [u8; HEADER_LEN],
    pub filled: usize,
}

/// Receive state owned by one connection.
pub(crate) struct RxContext {
    ring: RingBuffer,
    machine: Machine,
}

impl RxContext {
    pub(crate) fn new(ring_capacity: usize, linear_capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(ring_capacity),
            machine: Machine::new(linear_capacity),
        }
    }

    /// Bytes waiting in the ring buffer.
    pub(crate) fn buffered(&self) -> usize { self.ring.len() }

    pub(crate) fn phase(&self) -> ReassemblyPhase {
        if !self.ring.is_empty() {
            return ReassemblyPhase::Draining;
        }
        match self.machine.state {
            RxState::Idle if self.machine.header.filled > 0 => ReassemblyPhase::HeaderPending,
            RxState::Idle => ReassemblyPhase::Idle,
            _ => ReassemblyPhase::BodyPending,
        }
    }

    pub(crate) fn open_reception(&self) -> Option<OpenReception> {
        match &self.machine.state {
            RxState::Body(open) => Some(OpenReception {
                pdu: open.pdu,
                declared: open.declared,
                forwarded: open.forwarded,
            }),
            _ => None,
        }
    }

    /// Whether any data or partial PDU is held.
    pub(crate) fn in_flight(&self) -> bool { self.phase() != ReassemblyPhase::Idle }

    /// Process fresh stream data.
    pub(crate) fn receive_stream(&mut self, view: &RxView<'_>, data: &[u8]) -> Progress {
        if !self.ring.is_empty() {
            return match self.ring.store(None, data) {
                Ok(()) => Progress::default(),
                Err(err) => self.overflow(view, data.len(), err),
            };
        }
        let mut input = data;
        let outcome = self.machine.run(view, &mut input, Mode::Inline);
        let consumed = data.len() - input.len();
        match outcome {
            Outcome::Exhausted => Progress::consumed(consumed),
            Outcome::Stalled => match self.ring.store(None, input) {
                Ok(()) => Progress::consumed(consumed),
                Err(err) => {
                    let mut progress = self.overflow(view, input.len(), err);
                    progress.consumed += consumed;
                    progress
                }
            },
            Outcome::Reconnect(reason) => self.teardown(data.len(), reason),
        }
    }

    /// Resume processing from the ring buffer.
    pub(crate) fn drain(&mut self, view: &RxView<'_>) -> Progress {
        let before = self.ring.len();
        let outcome = self
            .machine
            .run(view, &mut self.ring.reader(), Mode::Drain);
        let consumed = before - self.ring.len();
        match outcome {
            Outcome::Reconnect(reason) => self.teardown(consumed, reason),
            Outcome::Exhausted | Outcome::Stalled => Progress::consumed(consumed),
        }
    }

    /// Abandon everything held, returning the buffered bytes flushed.
    ///
    /// An accepted bounded reception completes with
    /// [`ReceptionOutcome::Failed`]; a header-less one with `unbounded`.
    pub(crate) fn reset(&mut self, unbounded: ReceptionOutcome) -> usize {
        self.machine.reset(unbounded);
        let flushed = self.ring.len();
        self.ring.clear();
        flushed
    }

    fn overflow(&mut self, view: &RxView<'_>, pending: usize, err: RingBufferError) -> Progress {
        debug!("{}: {err}", view.connection);
        report_drop(view.connection, &RxError::BufferOverflow { len: pending });
        self.teardown(pending, ReconnectReason::BufferOverflow)
    }

    fn teardown(&mut self, dropped: usize, reason: ReconnectReason) -> Progress {
        let flushed = self.reset(ReceptionOutcome::Failed);
        Progress {
            consumed: dropped + flushed,
            reconnect: Some(reason),
        }
    }
}

pub(crate) fn report_drop(connection: ConnectionId, error: &RxError) {
    match error {
        RxError::InvalidLength { .. } | RxError::BufferOverflow { .. } => {
            warn!("{connection}: dropping frame: {error}");
        }
        _ => debug!("{connection}: dropping frame: {error}"),
    }
    metrics::inc_dropped(error.reason());
}

pub(crate) fn report_delivered(pdu: RxPdu, contract: Contract) {
    debug!(
        "{}: delivered frame id {:#010x} to pdu {}",
        pdu.connection, pdu.frame_id, pdu.pdu_id
    );
    metrics::inc_delivered(contract);
}
