//! Route entries and destination selection.
//!
//! A [`Route`] maps a frame identifier to its destinations. Routes are built
//! once from configuration and shared between connections; only the enable
//! bit changes at runtime.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::Deserialize;

use crate::consumer::{FireAndForgetConsumer, StreamingConsumer};

/// Delivery contract used by every destination of a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contract {
    /// Piecewise delivery with consumer backpressure.
    Streaming,
    /// Whole-PDU delivery in a single call.
    FireAndForget,
}

impl Contract {
    /// Static label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::FireAndForget => "fire_and_forget",
        }
    }
}

/// Consumer bound to a destination.
#[derive(Clone)]
pub enum ConsumerHandle {
    Streaming(Arc<dyn StreamingConsumer>),
    FireAndForget(Arc<dyn FireAndForgetConsumer>),
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("ConsumerHandle::Streaming"),
            Self::FireAndForget(_) => f.write_str("ConsumerHandle::FireAndForget"),
        }
    }
}

/// One destination of a route.
#[derive(Clone, Debug)]
pub struct Destination {
    pdu_id: u32,
    consumer: ConsumerHandle,
    selector: Option<usize>,
}

impl Destination {
    /// Create a destination.
    ///
    /// `selector` restricts the destination to the connection at that offset
    /// within its group; `None` makes it the fallback for every connection.
    #[must_use]
    pub fn new(pdu_id: u32, consumer: ConsumerHandle, selector: Option<usize>) -> Self {
        Self {
            pdu_id,
            consumer,
            selector,
        }
    }

    #[must_use]
    pub fn pdu_id(&self) -> u32 { self.pdu_id }

    #[must_use]
    pub fn consumer(&self) -> &ConsumerHandle { &self.consumer }

    #[must_use]
    pub fn selector(&self) -> Option<usize> { self.selector }
}

/// Mapping from a frame identifier to its destinations.
#[derive(Debug)]
pub struct Route {
    frame_id: u32,
    contract: Contract,
    destinations: Vec<Destination>,
    enabled: AtomicBool,
}

impl Route {
    /// Create a route with its initial enable bit.
    #[must_use]
    pub fn new(
        frame_id: u32,
        contract: Contract,
        destinations: Vec<Destination>,
        enabled: bool,
    ) -> Self {
        Self {
            frame_id,
            contract,
            destinations,
            enabled: AtomicBool::new(enabled),
        }
    }

    #[must_use]
    pub fn frame_id(&self) -> u32 { self.frame_id }

    #[must_use]
    pub fn contract(&self) -> Contract { self.contract }

    #[must_use]
    pub fn destinations(&self) -> &[Destination] { &self.destinations }

    /// Whether the routing-control bit currently allows delivery.
    #[must_use]
    pub fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }

    /// Toggle the routing-control bit.
    pub fn set_enabled(&self, enabled: bool) { self.enabled.store(enabled, Ordering::Release); }

    /// Pick the active destination for the connection at `offset`.
    ///
    /// A destination selecting `offset` explicitly wins over the fallback.
    /// Returns `None` when the route is disabled or nothing applies.
    #[must_use]
    pub fn destination_for(&self, offset: usize) -> Option<&Destination> {
        if !self.is_enabled() {
            return None;
        }
        self.destinations
            .iter()
            .find(|d| d.selector == Some(offset))
            .or_else(|| self.destinations.iter().find(|d| d.selector.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::RxPdu;

    struct Sink;

    impl FireAndForgetConsumer for Sink {
        fn deliver(&self, _pdu: RxPdu, _payload: &[u8]) {}
    }

    fn sink() -> ConsumerHandle { ConsumerHandle::FireAndForget(Arc::new(Sink)) }

    #[test]
    fn explicit_selector_beats_fallback() {
        let route = Route::new(
            7,
            Contract::FireAndForget,
            vec![
                Destination::new(1, sink(), None),
                Destination::new(2, sink(), Some(1)),
            ],
            true,
        );

        assert_eq!(route.destination_for(0).map(Destination::pdu_id), Some(1));
        assert_eq!(route.destination_for(1).map(Destination::pdu_id), Some(2));
    }

    #[test]
    fn disabled_route_has_no_destination() {
        let route = Route::new(
            7,
            Contract::FireAndForget,
            vec![Destination::new(1, sink(), None)],
            true,
        );
        route.set_enabled(false);

        assert!(route.destination_for(0).is_none());
        route.set_enabled(true);
        assert!(route.destination_for(0).is_some());
    }

    #[test]
    fn selector_only_route_skips_other_connections() {
        let route = Route::new(
            7,
            Contract::FireAndForget,
            vec![Destination::new(1, sink(), Some(2))],
            true,
        );

        assert!(route.destination_for(0).is_none());
    }
}
