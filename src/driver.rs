//! Continuation driver for buffered stream data.
//!
//! Data parked in a connection's ring buffer is only retried when something
//! drives the connection. [`RxEngine::drive_pending`] walks every connection
//! flagged as holding data or a pending cancellation;
//! [`run_continuation_driver`] calls it on a fixed period until shut down.

use std::{sync::Arc, sync::atomic::Ordering, time::Duration};

use log::debug;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{
    consumer::ReceptionOutcome,
    engine::{RxEngine, lock, mark_reconnect, observe_cancel},
    error::Result,
    socket_map::ConnectionId,
};

impl RxEngine {
    /// Resume buffered data on `connection`.
    ///
    /// Returns the number of bytes credited to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`RxError::UnknownConnection`](crate::RxError::UnknownConnection)
    /// for an unknown connection.
    pub fn drive(&self, connection: ConnectionId) -> Result<usize> {
        let slot = self.slot(connection)?;
        let group = self.group_of(slot);
        let socket = lock(&group.links)[slot.offset].socket;
        let (consumed, event) = {
            let mut rx = lock(&slot.rx);
            let mut progress = observe_cancel(group, slot, &mut rx);
            let mut event = mark_reconnect(slot, progress.reconnect);
            if slot.reconnect_pending.load(Ordering::Acquire) {
                progress.consumed += rx.reset(ReceptionOutcome::Failed);
            } else if rx.buffered() > 0 {
                let step = rx.drain(&self.view(slot));
                event = event.or(mark_reconnect(slot, step.reconnect));
                progress.consumed += step.consumed;
            }
            slot.has_buffered
                .store(rx.buffered() > 0, Ordering::Release);
            (progress.consumed, event)
        };
        self.settle(slot, socket, consumed, event);
        Ok(consumed)
    }

    /// Drive every connection with buffered data or a pending cancellation.
    ///
    /// Returns the number of connections driven.
    pub fn drive_pending(&self) -> usize {
        let mut driven = 0;
        for slot in &self.slots {
            let flagged = slot.has_buffered.load(Ordering::Acquire)
                || slot.cancel_requested.load(Ordering::Acquire);
            if flagged && self.drive(slot.id).is_ok() {
                driven += 1;
            }
        }
        driven
    }
}

/// Periodically drive pending connections until `shutdown` fires.
pub async fn run_continuation_driver(engine: Arc<RxEngine>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                let driven = engine.drive_pending();
                if driven > 0 {
                    debug!("continuation driver resumed {driven} connections");
                }
            }
        }
    }
}
