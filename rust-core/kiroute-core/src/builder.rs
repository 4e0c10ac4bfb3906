//! # Route Builder
//!
//! Fluent route construction. A builder is a plain `Clone` value: setters
//! take `self` and return the updated builder, and `group` returns a child
//! that starts from a copy of the parent's settings. Nothing a child does
//! leaks back into its parent.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Collects route settings; registration is delegated to the app
//! - **O**: Any `IntoHandler` value can be a middleware or the terminal handler
//! - **D**: The cache is reached through the `Clock` abstraction

use crate::app::App;
use crate::cache::{CacheMiddleware, Clock, SystemClock};
use crate::chain::Pipeline;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{Handler, IntoHandler};
use crate::hooks::{ErrorHookFn, HookFn, Hooks};
use crate::route::{parse_pattern, Route};
use crate::static_files::StaticDir;
use hyper::Method;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Cache settings carried by a builder
#[derive(Clone)]
struct CachePolicy {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

/// Builder for one route or a group of routes
#[derive(Clone)]
pub struct RouteBuilder {
    app: App,
    base: String,
    method: Option<String>,
    path: String,
    prefix: Option<String>,
    domain: Option<String>,
    headers: Vec<(String, String)>,
    middlewares: Vec<Handler>,
    regex_vars: HashMap<String, String>,
    cache: Option<CachePolicy>,
    hooks: Hooks,
}

impl std::fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("base", &self.base)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("prefix", &self.prefix)
            .field("domain", &self.domain)
            .field("headers", &self.headers)
            .field("middlewares", &self.middlewares.len())
            .field("cache", &self.cache.as_ref().map(|c| c.ttl))
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl RouteBuilder {
    /// Empty builder registering into `app`
    pub(crate) fn new(app: App) -> Self {
        Self {
            app,
            base: String::new(),
            method: None,
            path: String::new(),
            prefix: None,
            domain: None,
            headers: Vec::new(),
            middlewares: Vec::new(),
            regex_vars: HashMap::new(),
            cache: None,
            hooks: Hooks::default(),
        }
    }

    // ---- matching ----

    /// Exact path, relative to the group
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = format!("{}{path}", self.base);
        self.prefix = None;
        self
    }

    /// Path prefix, relative to the group; turns the route into a prefix route
    #[must_use]
    pub fn path_prefix(mut self, prefix: &str) -> Self {
        let prefix = format!("{}{prefix}", self.base);
        self.path.clone_from(&prefix);
        self.prefix = Some(prefix);
        self
    }

    /// Required HTTP method (stored uppercase)
    #[must_use]
    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_ascii_uppercase());
        self
    }

    /// Required `Host`
    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Required header values; all must match exactly
    #[must_use]
    pub fn headers(mut self, pairs: &[(&str, &str)]) -> Self {
        for (name, value) in pairs {
            self = self.header(name, value);
        }
        self
    }

    /// Require one header value
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Constraint for placeholder `name` when the pattern has no inline one
    #[must_use]
    pub fn regex_var(mut self, name: &str, pattern: &str) -> Self {
        self.regex_vars.insert(name.to_string(), pattern.to_string());
        self
    }

    // ---- pipeline ----

    /// Append a route-local middleware
    #[must_use]
    pub fn use_middleware<M>(mut self, middleware: impl IntoHandler<M>) -> Self {
        self.middlewares.push(middleware.into_handler());
        self
    }

    /// Cache successful responses for `ttl`
    #[must_use]
    pub fn cache(self, ttl: Duration) -> Self {
        self.cache_with_clock(ttl, Arc::new(SystemClock))
    }

    /// Cache successful responses for `ttl`, measured on `clock`
    #[must_use]
    pub fn cache_with_clock(mut self, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        self.cache = Some(CachePolicy { ttl, clock });
        self
    }

    // ---- hooks ----

    /// Error hook for routes built from here
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context, &Error) + Send + Sync + 'static,
    {
        let hook: ErrorHookFn = Arc::new(hook);
        self.hooks.on_error = Some(hook);
        self
    }

    /// Not-found hook for unmatched requests under this builder's path
    ///
    /// Takes effect immediately; the longest matching path wins over
    /// shorter ones and over the app hook.
    #[must_use]
    pub fn not_found<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.app.register_not_found(self.scope_path(), Arc::clone(&hook));
        self.hooks.not_found = Some(hook);
        self
    }

    /// Hook run before the pipeline
    #[must_use]
    pub fn before_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.hooks.before_each = Some(hook);
        self
    }

    /// Hook run once after the pipeline
    #[must_use]
    pub fn after_each<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.hooks.after_each = Some(hook);
        self
    }

    // ---- registration ----

    /// Register the route with `handler` as its terminal stage
    ///
    /// Returns the builder so further routes can reuse its settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for a malformed placeholder or
    /// constraint.
    pub fn handle<M>(&self, handler: impl IntoHandler<M>) -> Result<Self> {
        self.register(handler.into_handler())
    }

    /// `GET path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn get<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::GET, path, handler)
    }

    /// `POST path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn post<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::POST, path, handler)
    }

    /// `PUT path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn put<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::PUT, path, handler)
    }

    /// `DELETE path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn delete<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::DELETE, path, handler)
    }

    /// `PATCH path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn patch<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::PATCH, path, handler)
    }

    /// `OPTIONS path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn options<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::OPTIONS, path, handler)
    }

    /// `HEAD path`
    ///
    /// # Errors
    ///
    /// Same as [`RouteBuilder::handle`].
    pub fn head<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.verb(Method::HEAD, path, handler)
    }

    fn verb<M>(&self, method: Method, path: &str, handler: impl IntoHandler<M>) -> Result<Self> {
        self.clone().path(path).method(method.as_str()).handle(handler)
    }

    /// Serve files from `dir` on this builder's path or prefix
    ///
    /// With a prefix, the prefix is stripped before the file lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` when neither a path nor a prefix
    /// was set.
    pub fn static_dir(&self, dir: impl Into<PathBuf>) -> Result<Self> {
        if self.path.is_empty() && self.prefix.is_none() {
            return Err(Error::InvalidRoutePattern {
                pattern: String::new(),
                reason: "static_dir needs a path or a path prefix".to_string(),
            });
        }
        let strip = self.prefix.clone().unwrap_or_default();
        self.register(StaticDir::new(strip, dir).handler())
    }

    // ---- nesting ----

    /// Child builder rooted at this builder's path plus `path`
    #[must_use]
    pub fn group(&self, path: &str) -> Self {
        let mut child = self.clone();
        child.base = format!("{}{path}", self.scope_path());
        child.path.clone_from(&child.base);
        child.prefix = None;
        child
    }

    /// Child builder whose routes default to prefix matching under `prefix`
    #[must_use]
    pub fn path_prefix_group(&self, prefix: &str) -> Self {
        let mut child = self.group(prefix);
        child.prefix = Some(child.base.clone());
        child
    }

    /// Path this builder registers at: the prefix if set, else the path
    fn scope_path(&self) -> String {
        self.prefix.clone().unwrap_or_else(|| self.path.clone())
    }

    fn register(&self, terminal: Handler) -> Result<Self> {
        let pattern = self.scope_path();
        let segments = parse_pattern(&pattern, &self.regex_vars)?;

        let mut stages = self.app.global_middlewares();
        if let Some(policy) = &self.cache {
            let cache = CacheMiddleware::with_clock(policy.ttl, Arc::clone(&policy.clock));
            stages.push(cache.into_handler());
        }
        stages.extend(self.middlewares.iter().cloned());

        self.app.register(Route {
            method: self.method.clone(),
            pattern,
            segments,
            prefix: self.prefix.clone(),
            domain: self.domain.clone(),
            headers: self.headers.clone(),
            pipeline: Pipeline::build(terminal, &stages),
            hooks: self.hooks.clone(),
            scope: self.base.clone(),
        });
        Ok(self.clone())
    }
}
