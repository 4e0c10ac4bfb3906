//! # Route Table
//!
//! Thread-safe, always-sorted list of registered routes.
//!
//! Registration may happen after serving starts, so the list sits behind a
//! `RwLock`; matching only takes the read side.

use crate::matcher::match_route;
use crate::request::Request;
use crate::route::{compare_segments, Route, RouteMatch};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Sorted collection of routes
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Arc<Route>>>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route and restore the table ordering
    ///
    /// The sort is stable: routes with equal keys keep registration order.
    pub fn insert(&self, route: Route) -> Arc<Route> {
        let route = Arc::new(route);
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.push(Arc::clone(&route));
        routes.sort_by(|a, b| compare_segments(&a.segments, &b.segments));

        debug!(
            method = route.method.as_deref().unwrap_or("*"),
            pattern = %route.pattern,
            prefix = route.is_prefix(),
            total = routes.len(),
            "Route registered"
        );
        route
    }

    /// Select the route for a request, if any
    #[must_use]
    pub fn match_request(&self, req: &Request) -> Option<RouteMatch> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        match_route(&routes, req.method.as_str(), &req.host, &req.path, req.headers())
    }

    /// Snapshot of the routes in table order
    #[must_use]
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
