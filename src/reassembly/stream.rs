//! Stream reassembly state machine.
//!
//! The machine consumes bytes from an [`RxInput`] one step at a time. Each
//! step takes the current [`RxState`], acts on the input, and yields the
//! next state together with a [`Step`] telling the driver loop whether to
//! continue, stall until the consumer frees space, or give up on the
//! connection.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use log::warn;

use super::{
    Collecting,
    HeaderStage,
    OpenPdu,
    RxState,
    RxView,
    input::RxInput,
    report_delivered,
    report_drop,
};
use crate::{
    consumer::{CopyError, ReceptionOutcome, RxPdu},
    error::RxError,
    frame::{self, DecodedHeader, HEADER_LEN},
    route::{ConsumerHandle, Contract},
    transport::ReconnectReason,
};

/// Where the input comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Fresh transport data; a stall parks the rest in the ring buffer.
    Inline,
    /// Ring buffer content; a stall waits for the next drive.
    Drain,
}

/// Why [`Machine::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Exhausted,
    Stalled,
    Reconnect(ReconnectReason),
}

enum Step {
    Continue,
    Stall,
    Reconnect(ReconnectReason),
}

pub(crate) struct Machine {
    pub(super) state: RxState,
    pub(super) header: HeaderStage,
    linear: BytesMut,
    linear_capacity: usize,
    /// Bytes refused since the consumer last accepted a reception.
    refused_run: usize,
}

impl Machine {
    pub(crate) fn new(linear_capacity: usize) -> Self {
        Self {
            state: RxState::Idle,
            header: HeaderStage::default(),
            linear: BytesMut::with_capacity(linear_capacity),
            linear_capacity,
            refused_run: 0,
        }
    }

    /// Consume `input` until it runs dry, stalls, or forces a reconnect.
    pub(crate) fn run<I: RxInput>(&mut self, view: &RxView<'_>, input: &mut I, mode: Mode) -> Outcome {
        while input.has_remaining() {
            let (state, step) = self.step(view, input, mode);
            self.state = state;
            match step {
                Step::Continue => {}
                Step::Stall => return Outcome::Stalled,
                Step::Reconnect(reason) => return Outcome::Reconnect(reason),
            }
        }
        Outcome::Exhausted
    }

    pub(crate) fn reset(&mut self, unbounded: ReceptionOutcome) {
        match std::mem::take(&mut self.state) {
            RxState::Body(open) => {
                let outcome = if open.declared.is_some() {
                    ReceptionOutcome::Failed
                } else {
                    unbounded
                };
                open.consumer.reception_complete(open.pdu, outcome);
            }
            RxState::Collecting(collecting) => report_drop(
                collecting.pdu.connection,
                &RxError::ConsumerRefused {
                    frame_id: collecting.pdu.frame_id,
                },
            ),
            RxState::Idle | RxState::Discarding { .. } => {}
        }
        self.header = HeaderStage::default();
        self.linear.clear();
        self.refused_run = 0;
    }

    fn step<I: RxInput>(&mut self, view: &RxView<'_>, input: &mut I, mode: Mode) -> (RxState, Step) {
        match std::mem::take(&mut self.state) {
            RxState::Idle if view.header_mode => self.read_header(view, input),
            RxState::Idle => open_headerless(view, input),
            RxState::Body(open) => self.forward(view, open, input, mode),
            RxState::Collecting(collecting) => self.collect(collecting, input),
            RxState::Discarding {
                frame_id,
                remaining,
            } => {
                let n = remaining.min(input.remaining());
                input.advance(n);
                (discarding(frame_id, remaining - n), Step::Continue)
            }
        }
    }

    fn read_header<I: RxInput>(&mut self, view: &RxView<'_>, input: &mut I) -> (RxState, Step) {
        let filled = self.header.filled;
        let n = (HEADER_LEN - filled).min(input.remaining());
        input.copy_to_slice(&mut self.header.bytes[filled..filled + n]);
        self.header.filled += n;
        if self.header.filled < HEADER_LEN {
            return (RxState::Idle, Step::Continue);
        }
        self.header.filled = 0;
        let bytes = self.header.bytes;
        match frame::decode(&bytes, &view.format, &view.scope) {
            Ok(header) => self.dispatch(view, header, input),
            Err(err @ RxError::UnknownRoute { frame_id, len }) => {
                report_drop(view.connection, &err);
                (discarding(frame_id, len), Step::Continue)
            }
            Err(err) => {
                report_drop(view.connection, &err);
                (
                    RxState::Idle,
                    Step::Reconnect(ReconnectReason::InvalidLength),
                )
            }
        }
    }

    fn dispatch<I: RxInput>(
        &mut self,
        view: &RxView<'_>,
        header: DecodedHeader<'_>,
        input: &mut I,
    ) -> (RxState, Step) {
        let pdu = RxPdu {
            pdu_id: header.destination.pdu_id(),
            frame_id: header.frame_id,
            connection: view.connection,
        };
        match header.destination.consumer() {
            ConsumerHandle::Streaming(consumer) => match consumer.start_reception(pdu, header.len) {
                Ok(space) if space > 0 || header.len == 0 => {
                    self.refused_run = 0;
                    let open = OpenPdu {
                        pdu,
                        consumer: Arc::clone(consumer),
                        declared: Some(header.len),
                        forwarded: 0,
                        space,
                    };
                    if open.is_complete() {
                        consumer.reception_complete(pdu, ReceptionOutcome::Ok);
                        report_delivered(pdu, Contract::Streaming);
                        return (RxState::Idle, Step::Continue);
                    }
                    (RxState::Body(open), Step::Continue)
                }
                Ok(_) => {
                    consumer.reception_complete(pdu, ReceptionOutcome::Failed);
                    self.refuse(view, header.frame_id, header.len)
                }
                Err(_) => self.refuse(view, header.frame_id, header.len),
            },
            ConsumerHandle::FireAndForget(consumer) => {
                if input.chunk().len() >= header.len {
                    consumer.deliver(pdu, &input.chunk()[..header.len]);
                    input.advance(header.len);
                    report_delivered(pdu, Contract::FireAndForget);
                    (RxState::Idle, Step::Continue)
                } else if input.remaining() >= header.len {
                    // Buffered but split across the ring's wrap point.
                    let payload = input.copy_to_bytes(header.len);
                    consumer.deliver(pdu, &payload);
                    report_delivered(pdu, Contract::FireAndForget);
                    (RxState::Idle, Step::Continue)
                } else if header.len <= self.linear_capacity {
                    self.linear.clear();
                    let collecting = Collecting {
                        pdu,
                        consumer: Arc::clone(consumer),
                        declared: header.len,
                    };
                    (RxState::Collecting(collecting), Step::Continue)
                } else {
                    report_drop(
                        view.connection,
                        &RxError::BufferOverflow { len: header.len },
                    );
                    (discarding(header.frame_id, header.len), Step::Continue)
                }
            }
        }
    }

    /// Skip a refused frame, escalating when refusals persist.
    fn refuse(&mut self, view: &RxView<'_>, frame_id: u32, len: usize) -> (RxState, Step) {
        report_drop(view.connection, &RxError::ConsumerRefused { frame_id });
        let earlier = self.refused_run;
        self.refused_run = earlier.saturating_add(len);
        // A lone refused frame is skipped whatever its size.
        if earlier > 0 && self.linear_capacity > 0 && self.refused_run >= self.linear_capacity {
            warn!(
                "{}: consumer refused {} bytes in a row",
                view.connection, self.refused_run
            );
            self.refused_run = 0;
            return (
                RxState::Idle,
                Step::Reconnect(ReconnectReason::ConsumerRefused),
            );
        }
        (discarding(frame_id, len), Step::Continue)
    }

    fn forward<I: RxInput>(
        &mut self,
        view: &RxView<'_>,
        mut open: OpenPdu,
        input: &mut I,
        mode: Mode,
    ) -> (RxState, Step) {
        if open.space == 0 {
            if mode == Mode::Inline {
                return (RxState::Body(open), Step::Stall);
            }
            match open.consumer.copy_data(open.pdu, &[]) {
                Ok(space) => open.space = space,
                Err(CopyError::Busy) => open.space = 0,
                Err(CopyError::Refused) => return self.fail(view, open),
            }
            if open.space == 0 {
                return (RxState::Body(open), Step::Stall);
            }
        }
        let max_len = open.remaining().min(open.space);
        let (forwarded, result) = input.forward(&*open.consumer, open.pdu, max_len);
        open.forwarded += forwarded;
        match result {
            Ok(space) => open.space = space,
            Err(_) => return self.fail(view, open),
        }
        if open.is_complete() {
            open.consumer
                .reception_complete(open.pdu, ReceptionOutcome::Ok);
            report_delivered(open.pdu, Contract::Streaming);
            return (RxState::Idle, Step::Continue);
        }
        (RxState::Body(open), Step::Continue)
    }

    /// Abandon an accepted reception after a failed copy.
    fn fail(&mut self, view: &RxView<'_>, open: OpenPdu) -> (RxState, Step) {
        open.consumer
            .reception_complete(open.pdu, ReceptionOutcome::Failed);
        match open.declared {
            Some(declared) => self.refuse(view, open.pdu.frame_id, declared - open.forwarded),
            None => {
                report_drop(
                    view.connection,
                    &RxError::ConsumerRefused {
                        frame_id: open.pdu.frame_id,
                    },
                );
                (
                    RxState::Idle,
                    Step::Reconnect(ReconnectReason::ConsumerRefused),
                )
            }
        }
    }

    fn collect<I: RxInput>(&mut self, collecting: Collecting, input: &mut I) -> (RxState, Step) {
        let n = (collecting.declared - self.linear.len()).min(input.remaining());
        self.linear.put(Buf::take(&mut *input, n));
        if self.linear.len() < collecting.declared {
            return (RxState::Collecting(collecting), Step::Continue);
        }
        collecting.consumer.deliver(collecting.pdu, &self.linear);
        self.linear.clear();
        report_delivered(collecting.pdu, Contract::FireAndForget);
        (RxState::Idle, Step::Continue)
    }
}

fn discarding(frame_id: u32, remaining: usize) -> RxState {
    if remaining == 0 {
        RxState::Idle
    } else {
        RxState::Discarding {
            frame_id,
            remaining,
        }
    }
}

/// Start the single PDU of a header-less stream.
fn open_headerless<I: RxInput>(view: &RxView<'_>, input: &mut I) -> (RxState, Step) {
    let Some(route) = view.scope.sole_route() else {
        input.advance(input.remaining());
        return (RxState::Idle, Step::Continue);
    };
    let Some(destination) = route.destination_for(view.scope.offset) else {
        report_drop(
            view.connection,
            &RxError::UnknownRoute {
                frame_id: route.frame_id(),
                len: input.remaining(),
            },
        );
        input.advance(input.remaining());
        return (RxState::Idle, Step::Continue);
    };
    let pdu = RxPdu {
        pdu_id: destination.pdu_id(),
        frame_id: route.frame_id(),
        connection: view.connection,
    };
    match destination.consumer() {
        ConsumerHandle::FireAndForget(consumer) => {
            let len = input.chunk().len();
            consumer.deliver(pdu, input.chunk());
            input.advance(len);
            report_delivered(pdu, Contract::FireAndForget);
            (RxState::Idle, Step::Continue)
        }
        ConsumerHandle::Streaming(consumer) => match consumer.start_reception(pdu, 0) {
            Ok(space) => (
                RxState::Body(OpenPdu {
                    pdu,
                    consumer: Arc::clone(consumer),
                    declared: None,
                    forwarded: 0,
                    space,
                }),
                Step::Continue,
            ),
            Err(_) => {
                report_drop(
                    view.connection,
                    &RxError::ConsumerRefused {
                        frame_id: route.frame_id(),
                    },
                );
                (
                    RxState::Idle,
                    Step::Reconnect(ReconnectReason::ConsumerRefused),
                )
            }
        },
    }
}
