//! Sorted route tables with logarithmic lookup.
use std::sync::Arc;

use crate::{
    config::ConfigError,
    route::{Destination, Route},
};

/// Routes of one connection or group, sorted by frame identifier.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Build a table, sorting by frame identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateFrameId`] if two routes share an
    /// identifier.
    pub fn new(mut routes: Vec<Arc<Route>>) -> Result<Self, ConfigError> {
        routes.sort_by_key(|r| r.frame_id());
        if let Some(pair) = routes
            .windows(2)
            .find(|pair| pair[0].frame_id() == pair[1].frame_id())
        {
            return Err(ConfigError::DuplicateFrameId(pair[0].frame_id()));
        }
        Ok(Self { routes })
    }

    /// Find the route for `frame_id`.
    ///
    /// Identifiers outside the table's range are rejected before searching.
    #[must_use]
    pub fn lookup(&self, frame_id: u32) -> Option<&Arc<Route>> {
        let first = self.routes.first()?;
        let last = self.routes.last()?;
        if !(first.frame_id()..=last.frame_id()).contains(&frame_id) {
            return None;
        }
        self.routes
            .binary_search_by_key(&frame_id, |r| r.frame_id())
            .ok()
            .map(|idx| &self.routes[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> { self.routes.iter() }
}

/// Route tables visible to one connection.
///
/// A connection's own table is searched before its group's table.
#[derive(Clone, Copy, Debug)]
pub struct RouteScope<'a> {
    pub own: &'a RouteTable,
    pub group: &'a RouteTable,
    /// Offset of the connection within its group.
    pub offset: usize,
}

impl<'a> RouteScope<'a> {
    /// Resolve `frame_id` to a route and its active destination.
    ///
    /// A route found in the connection's own table shadows the group table,
    /// even when it is disabled.
    #[must_use]
    pub fn resolve(&self, frame_id: u32) -> Option<(&'a Arc<Route>, &'a Destination)> {
        let route = self
            .own
            .lookup(frame_id)
            .or_else(|| self.group.lookup(frame_id))?;
        route
            .destination_for(self.offset)
            .map(|destination| (route, destination))
    }

    /// The only route of a header-less connection.
    #[must_use]
    pub fn sole_route(&self) -> Option<&'a Arc<Route>> {
        self.own.iter().next().or_else(|| self.group.iter().next())
    }
}
