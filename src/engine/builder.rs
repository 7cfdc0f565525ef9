//! Construction of [`RxEngine`] from validated configuration.
//!
//! Consumers are registered by name; routes refer to them by that name and
//! the contract of the route decides which registry is consulted.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, atomic::AtomicBool},
};

use log::info;

use super::{ConnectionSlot, Group, RxEngine};
use crate::{
    address::LinkState,
    config::{ConfigError, ConnectionConfig, GatewayConfig, GroupConfig, RouteConfig, TransportKind},
    consumer::{FireAndForgetConsumer, StreamingConsumer},
    frame::{FrameFormat, RouteTable},
    reassembly::RxContext,
    route::{ConsumerHandle, Contract, Destination, Route},
    socket_map::{ConnectionId, GroupId, SocketMap},
    transport::{NullTransport, Transport},
};

/// Builder for [`RxEngine`].
pub struct RxEngineBuilder {
    config: GatewayConfig,
    streaming: HashMap<String, Arc<dyn StreamingConsumer>>,
    fire_and_forget: HashMap<String, Arc<dyn FireAndForgetConsumer>>,
    transport: Arc<dyn Transport>,
}

impl RxEngine {
    /// Start building an engine for `config`.
    #[must_use]
    pub fn builder(config: GatewayConfig) -> RxEngineBuilder {
        RxEngineBuilder {
            config,
            streaming: HashMap::new(),
            fire_and_forget: HashMap::new(),
            transport: Arc::new(NullTransport),
        }
    }
}

impl RxEngineBuilder {
    /// Register a streaming consumer under `name`.
    #[must_use]
    pub fn streaming_consumer(mut self, name: impl Into<String>, consumer: Arc<dyn StreamingConsumer>) -> Self {
        self.streaming.insert(name.into(), consumer);
        self
    }

    /// Register a fire-and-forget consumer under `name`.
    #[must_use]
    pub fn fire_and_forget_consumer(
        mut self,
        name: impl Into<String>,
        consumer: Arc<dyn FireAndForgetConsumer>,
    ) -> Self {
        self.fire_and_forget.insert(name.into(), consumer);
        self
    }

    /// Set the transport receiving credit and connection events.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first inconsistency found.
    pub fn build(self) -> Result<RxEngine, ConfigError> {
        let mut groups = Vec::with_capacity(self.config.groups.len());
        let mut slots = Vec::new();
        for (index, config) in self.config.groups.iter().enumerate() {
            let group = self.build_group(GroupId::new(index), config, &mut slots)?;
            groups.push(group);
        }
        info!(
            "receive engine ready: {} groups, {} connections",
            groups.len(),
            slots.len()
        );
        Ok(RxEngine {
            groups,
            slots,
            sockets: SocketMap::default(),
            transport: self.transport,
        })
    }

    fn build_group(
        &self,
        id: GroupId,
        config: &GroupConfig,
        slots: &mut Vec<ConnectionSlot>,
    ) -> Result<Group, ConfigError> {
        let size = config.connections.len();
        if size == 0 {
            return Err(ConfigError::EmptyGroup(config.name.clone()));
        }
        let routes = self.build_table(&config.routes, size)?;
        let first = slots.len();
        let mut links = Vec::with_capacity(size);
        for (offset, conn) in config.connections.iter().enumerate() {
            let slot = self.build_connection(config, &routes, conn, ConnectionSlotId {
                id: ConnectionId::new(first + offset),
                group: id,
                offset,
            })?;
            links.push(LinkState::new(
                conn.remote,
                !slot.routes.is_empty(),
                conn.bind_remote,
            ));
            slots.push(slot);
        }
        Ok(Group {
            name: config.name.clone(),
            local: config.local,
            transport: config.transport,
            header_mode: config.header_mode,
            format: FrameFormat::new(config.endianness, config.transport, config.max_pdu_len),
            routes,
            first,
            links: Mutex::new(links),
        })
    }

    fn build_connection(
        &self,
        group: &GroupConfig,
        group_routes: &RouteTable,
        config: &ConnectionConfig,
        ids: ConnectionSlotId,
    ) -> Result<ConnectionSlot, ConfigError> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("{}#{}", group.name, ids.offset));
        let routes = self.build_table(&config.routes, group.connections.len())?;
        if !group.header_mode {
            let found = routes.len() + group_routes.len();
            if found != 1 {
                return Err(ConfigError::HeaderlessRoutes {
                    connection: name,
                    found,
                });
            }
        }
        let streams = routes
            .iter()
            .chain(group_routes.iter())
            .any(|r| r.contract() == Contract::Streaming);
        if group.transport == TransportKind::Stream
            && group.header_mode
            && streams
            && config.ring_capacity == 0
        {
            return Err(ConfigError::ZeroRingCapacity(name));
        }
        Ok(ConnectionSlot {
            id: ids.id,
            name,
            group: ids.group,
            offset: ids.offset,
            trailing: config.trailing.unwrap_or(group.trailing),
            routes,
            rx: Mutex::new(RxContext::new(
                config.ring_capacity,
                config.linear_capacity,
            )),
            has_buffered: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            reconnect_pending: AtomicBool::new(false),
        })
    }

    fn build_table(&self, configs: &[RouteConfig], group_size: usize) -> Result<RouteTable, ConfigError> {
        let routes = configs
            .iter()
            .map(|config| self.build_route(config, group_size).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        RouteTable::new(routes)
    }

    fn build_route(&self, config: &RouteConfig, group_size: usize) -> Result<Route, ConfigError> {
        if config.destinations.is_empty() {
            return Err(ConfigError::NoDestination(config.frame_id));
        }
        let mut seen: Vec<Option<usize>> = Vec::with_capacity(config.destinations.len());
        let mut destinations = Vec::with_capacity(config.destinations.len());
        for dest in &config.destinations {
            if let Some(offset) = dest.connection_offset.filter(|&o| o >= group_size) {
                return Err(ConfigError::SelectorOutOfRange {
                    frame_id: config.frame_id,
                    offset,
                    size: group_size,
                });
            }
            if seen.contains(&dest.connection_offset) {
                return Err(ConfigError::AmbiguousDestination(config.frame_id));
            }
            seen.push(dest.connection_offset);
            let consumer = self.consumer(&dest.consumer, config.contract)?;
            destinations.push(Destination::new(
                dest.pdu_id,
                consumer,
                dest.connection_offset,
            ));
        }
        Ok(Route::new(
            config.frame_id,
            config.contract,
            destinations,
            config.enabled,
        ))
    }

    fn consumer(&self, name: &str, contract: Contract) -> Result<ConsumerHandle, ConfigError> {
        let handle = match contract {
            Contract::Streaming => self
                .streaming
                .get(name)
                .map(|c| ConsumerHandle::Streaming(Arc::clone(c))),
            Contract::FireAndForget => self
                .fire_and_forget
                .get(name)
                .map(|c| ConsumerHandle::FireAndForget(Arc::clone(c))),
        };
        handle.ok_or_else(|| ConfigError::UnknownConsumer {
            name: name.to_owned(),
            contract: contract.as_str(),
        })
    }
}

struct ConnectionSlotId {
    id: ConnectionId,
    group: GroupId,
    offset: usize,
}
