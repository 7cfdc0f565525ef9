//! Datagram demultiplexing.
//!
//! A datagram is atomic: it carries zero or more complete frames back to
//! back, possibly followed by trailing bytes. A dry-run pass decides whether
//! the datagram is acceptable at all; accepted datagrams are then split and
//! each frame is delivered on its own. Nothing is ever staged, so a frame
//! the consumer cannot take immediately is lost while its siblings are still
//! delivered.

use log::debug;

use crate::{
    config::TrailingPolicy,
    consumer::{ReceptionOutcome, RxPdu},
    error::RxError,
    frame::{self, HEADER_LEN},
    metrics,
    reassembly::{RxView, report_delivered, report_drop},
    route::{ConsumerHandle, Contract, Destination},
};

/// Summary of one datagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatagramReport {
    /// Whether validation accepted the datagram.
    pub accepted: bool,
    pub delivered: usize,
    pub dropped: usize,
}

/// Demultiplex one datagram.
pub(crate) fn receive(view: &RxView<'_>, data: &[u8]) -> DatagramReport {
    if !view.header_mode {
        return receive_whole(view, data);
    }
    if !validate(view, data) {
        debug!(
            "{}: rejecting {}-byte datagram",
            view.connection,
            data.len()
        );
        metrics::inc_datagrams_rejected();
        return DatagramReport::default();
    }
    let mut report = DatagramReport {
        accepted: true,
        ..DatagramReport::default()
    };
    let mut rest = data;
    while !rest.is_empty() {
        match frame::decode(rest, &view.format, &view.scope) {
            Ok(header) => {
                let Some(body) = payload(rest, header.len) else { break };
                let pdu = RxPdu {
                    pdu_id: header.destination.pdu_id(),
                    frame_id: header.frame_id,
                    connection: view.connection,
                };
                if deliver(view, pdu, header.destination, body) {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                }
                rest = &rest[HEADER_LEN + header.len..];
            }
            Err(err @ RxError::UnknownRoute { len, .. }) => {
                if payload(rest, len).is_none() {
                    break;
                }
                report_drop(view.connection, &err);
                report.dropped += 1;
                rest = &rest[HEADER_LEN + len..];
            }
            Err(_) => break,
        }
    }
    report
}

/// Dry-run pass over the whole datagram.
///
/// At least one complete frame must resolve to an enabled route. Lenient
/// policy stops at the first one; strict policy also requires every byte to
/// belong to a complete frame.
fn validate(view: &RxView<'_>, data: &[u8]) -> bool {
    let mut rest = data;
    let mut found = false;
    while !rest.is_empty() {
        let (len, usable) = match frame::decode(rest, &view.format, &view.scope) {
            Ok(header) => (header.len, true),
            Err(RxError::UnknownRoute { len, .. }) => (len, false),
            Err(_) => break,
        };
        if payload(rest, len).is_none() {
            break;
        }
        found |= usable;
        rest = &rest[HEADER_LEN + len..];
        if found && view.trailing == TrailingPolicy::Lenient {
            return true;
        }
    }
    found && (rest.is_empty() || view.trailing == TrailingPolicy::Lenient)
}

fn payload(frame: &[u8], len: usize) -> Option<&[u8]> {
    frame.get(HEADER_LEN..HEADER_LEN.checked_add(len)?)
}

/// Header-less datagrams carry exactly one PDU for the connection's route.
fn receive_whole(view: &RxView<'_>, data: &[u8]) -> DatagramReport {
    let Some(route) = view.scope.sole_route() else {
        return DatagramReport::default();
    };
    let Some(destination) = route.destination_for(view.scope.offset) else {
        report_drop(
            view.connection,
            &RxError::UnknownRoute {
                frame_id: route.frame_id(),
                len: data.len(),
            },
        );
        return DatagramReport {
            accepted: true,
            delivered: 0,
            dropped: 1,
        };
    };
    let pdu = RxPdu {
        pdu_id: destination.pdu_id(),
        frame_id: route.frame_id(),
        connection: view.connection,
    };
    let delivered = deliver(view, pdu, destination, data);
    DatagramReport {
        accepted: true,
        delivered: usize::from(delivered),
        dropped: usize::from(!delivered),
    }
}

/// Hand one complete payload to its consumer. Returns whether it was taken.
fn deliver(view: &RxView<'_>, pdu: RxPdu, destination: &Destination, payload: &[u8]) -> bool {
    match destination.consumer() {
        ConsumerHandle::FireAndForget(consumer) => {
            consumer.deliver(pdu, payload);
            report_delivered(pdu, Contract::FireAndForget);
            true
        }
        ConsumerHandle::Streaming(consumer) => {
            let refused = RxError::ConsumerRefused {
                frame_id: pdu.frame_id,
            };
            match consumer.start_reception(pdu, payload.len()) {
                Err(_) => {
                    report_drop(view.connection, &refused);
                    false
                }
                Ok(space) if space < payload.len() => {
                    consumer.reception_complete(pdu, ReceptionOutcome::Failed);
                    report_drop(
                        view.connection,
                        &RxError::BufferOverflow {
                            len: payload.len(),
                        },
                    );
                    false
                }
                Ok(_) => {
                    if !payload.is_empty() && consumer.copy_data(pdu, payload).is_err() {
                        consumer.reception_complete(pdu, ReceptionOutcome::Failed);
                        report_drop(view.connection, &refused);
                        return false;
                    }
                    consumer.reception_complete(pdu, ReceptionOutcome::Ok);
                    report_delivered(pdu, Contract::Streaming);
                    true
                }
            }
        }
    }
}
