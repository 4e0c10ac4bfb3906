//! # Route Definition
//!
//! Single-responsibility module for registered route data.
//!
//! ## Design Principles
//!
//! - **S**: `Route` only holds what the matcher and the pipeline need
//! - **O**: New match criteria are new fields, checked by the matcher
//! - **D**: Decoupled from how routes are declared (see `builder`)

use crate::chain::Pipeline;
use crate::error::{Error, Result};
use crate::hooks::Hooks;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One component of a route pattern
#[derive(Debug, Clone)]
pub enum Segment {
    /// Must equal the path segment verbatim
    Literal(String),
    /// Captures the path segment under `name`
    Param {
        /// Parameter name
        name: String,
        /// Anchored constraint the captured value must satisfy
        constraint: Option<Regex>,
    },
}

impl Segment {
    /// Parse one raw pattern segment
    ///
    /// Placeholder forms: `:name`, `{name}`, `:name(re)` and `{name(re)}`.
    /// `regex_vars` supplies a constraint for placeholders without an inline one.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for an empty name or a bad regex.
    pub fn parse(raw: &str, pattern: &str, regex_vars: &HashMap<String, String>) -> Result<Self> {
        let body = if let Some(rest) = raw.strip_prefix(':') {
            rest
        } else if raw.len() > 1 && raw.starts_with('{') && raw.ends_with('}') {
            &raw[1..raw.len() - 1]
        } else {
            return Ok(Self::Literal(raw.to_string()));
        };

        let (name, inline) = match body.find('(') {
            Some(open) if body.ends_with(')') => (&body[..open], Some(&body[open + 1..body.len() - 1])),
            _ => (body, None),
        };

        if name.is_empty() {
            return Err(Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: format!("placeholder `{raw}` has no name"),
            });
        }

        let source = inline.or_else(|| regex_vars.get(name).map(String::as_str));
        let constraint = source
            .map(|re| {
                Regex::new(&format!("^(?:{re})$")).map_err(|e| Error::InvalidRoutePattern {
                    pattern: pattern.to_string(),
                    reason: format!("bad constraint for `{name}`: {e}"),
                })
            })
            .transpose()?;

        Ok(Self::Param {
            name: name.to_string(),
            constraint,
        })
    }

    /// Whether this is a placeholder segment
    #[must_use]
    pub const fn is_param(&self) -> bool {
        matches!(self, Self::Param { .. })
    }

    /// Whether `value` is accepted by this segment
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == value,
            Self::Param { constraint, .. } => constraint.as_ref().map_or(true, |re| re.is_match(value)),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => f.write_str(lit),
            Self::Param { name, .. } => write!(f, ":{name}"),
        }
    }
}

/// Split a path on `/`, dropping one leading slash
///
/// `""` and `"/"` yield no segments; a trailing slash yields a trailing empty one.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// Parse a full route pattern into segments
///
/// # Errors
///
/// Returns `Error::InvalidRoutePattern` when any placeholder is malformed.
pub fn parse_pattern(pattern: &str, regex_vars: &HashMap<String, String>) -> Result<Vec<Segment>> {
    split_path(pattern)
        .into_iter()
        .map(|raw| Segment::parse(raw, pattern, regex_vars))
        .collect()
}

/// Table ordering for two segment lists
///
/// Literal before placeholder at the same position, literals by string order,
/// placeholders equal to each other, then shorter before longer.
#[must_use]
pub fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    for (left, right) in a.iter().zip(b) {
        let ord = match (left, right) {
            (Segment::Literal(l), Segment::Literal(r)) => l.cmp(r),
            (Segment::Literal(_), Segment::Param { .. }) => Ordering::Less,
            (Segment::Param { .. }, Segment::Literal(_)) => Ordering::Greater,
            (Segment::Param { .. }, Segment::Param { .. }) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Captured path parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(HashMap<String, String>);

impl Vars {
    /// Create an empty set of parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Insert or overwrite a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of captured parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove every parameter
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Vars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A registered route
///
/// Immutable once inserted into the table.
pub struct Route {
    /// Uppercase HTTP method; `None` matches any method
    pub method: Option<String>,
    /// Pattern as declared (path, or prefix for prefix routes)
    pub pattern: String,
    /// Parsed pattern
    pub segments: Vec<Segment>,
    /// Path prefix, set for prefix routes
    pub prefix: Option<String>,
    /// Exact host requirement
    pub domain: Option<String>,
    /// Required header name/value pairs (all must hold)
    pub headers: Vec<(String, String)>,
    /// Middlewares plus terminal handler, composed at registration
    pub pipeline: Pipeline,
    /// Route-level hooks
    pub hooks: Hooks,
    /// Path of the group that declared this route
    pub scope: String,
}

impl Route {
    /// Whether this route matches by path prefix
    #[must_use]
    pub const fn is_prefix(&self) -> bool {
        self.prefix.is_some()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("prefix", &self.prefix)
            .field("domain", &self.domain)
            .field("headers", &self.headers)
            .field("stages", &self.pipeline.len())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Matcher outcome: the selected route and its captured parameters
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Selected route
    pub route: Arc<Route>,
    /// Captured path parameters
    pub params: Vars,
}
