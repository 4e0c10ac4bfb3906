//! # Route Matcher
//!
//! Selects at most one route for a request in two passes:
//!
//! 1. **Exact**: non-prefix routes whose segments line up one-to-one with the path
//! 2. **Prefix**: prefix routes whose prefix starts the path
//!
//! Both passes filter on domain, method and required headers, and take the
//! first hit in table order.

use crate::route::{split_path, Route, RouteMatch, Segment, Vars};
use hyper::HeaderMap;
use std::sync::Arc;

/// Find the route for a request
#[must_use]
pub fn match_route(
    routes: &[Arc<Route>],
    method: &str,
    host: &str,
    path: &str,
    headers: &HeaderMap,
) -> Option<RouteMatch> {
    let path_segments = split_path(path);
    let eligible = |route: &Route| {
        route.domain.as_deref().map_or(true, |d| d == host)
            && route.method.as_deref().map_or(true, |m| m == method)
            && headers_match(&route.headers, headers)
    };

    let exact = routes.iter().find_map(|route| {
        if route.is_prefix() || !eligible(route) {
            return None;
        }
        match_segments(&route.segments, &path_segments).map(|params| RouteMatch {
            route: Arc::clone(route),
            params,
        })
    });
    if exact.is_some() {
        return exact;
    }

    routes.iter().find_map(|route| {
        let prefix = route.prefix.as_deref()?;
        if !path.starts_with(prefix) || !eligible(route) {
            return None;
        }
        // Constraint mismatches never reject a prefix route.
        let params = match_segments(&route.segments, &path_segments).unwrap_or_default();
        Some(RouteMatch {
            route: Arc::clone(route),
            params,
        })
    })
}

/// Match pattern segments against path segments, capturing parameters
#[must_use]
pub fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<Vars> {
    if pattern.len() != path.len() {
        return None;
    }
    let mut params = Vars::new();
    for (segment, value) in pattern.iter().zip(path) {
        if !segment.accepts(value) {
            return None;
        }
        if let Segment::Param { name, .. } = segment {
            params.insert(name.as_str(), *value);
        }
    }
    Some(params)
}

/// Every required header must be present with exactly the given value
fn headers_match(required: &[(String, String)], headers: &HeaderMap) -> bool {
    required.iter().all(|(name, value)| {
        headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == value)
    })
}
