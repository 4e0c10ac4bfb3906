//! # Application
//!
//! Owns the route table, the global middlewares and hooks, the root
//! injector and the context pool, and runs one request end to end:
//! match, hooks, pipeline, panic recovery, not-found handling.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Request lifecycle only; matching and dispatch live elsewhere
//! - **O**: New behavior plugs in as middlewares, hooks or injected values
//! - **D**: Sessions and templates are trait objects supplied by the user

use crate::builder::RouteBuilder;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{Handler, IntoHandler};
use crate::hooks::{ErrorHookFn, HookFn, Hooks};
use crate::injector::Injector;
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::route::{Route, RouteMatch};
use crate::session::{MemorySession, Session, SessionFactory};
use crate::table::RouteTable;
use crate::template::TemplateEngine;
use crate::writer::Writer;
use hyper::{Method, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Mutable app-wide settings
#[derive(Default)]
struct Settings {
    middlewares: Vec<Handler>,
    hooks: Hooks,
    templates: Option<Arc<dyn TemplateEngine>>,
    session_factory: Option<SessionFactory>,
    scoped_not_found: Vec<(String, HookFn)>,
}

struct AppInner {
    table: RouteTable,
    settings: RwLock<Settings>,
    injector: Injector,
    pool: ContextPool,
}

/// The router application
///
/// Cloning is cheap; clones share routes and settings.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.inner.table.len())
            .field("middlewares", &self.settings().middlewares.len())
            .field("hooks", &self.settings().hooks)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Create an app with no routes
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppInner {
                table: RouteTable::new(),
                settings: RwLock::new(Settings::default()),
                injector: Injector::new(),
                pool: ContextPool::default(),
            }),
        }
    }

    fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.inner.settings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn settings_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.inner.settings.write().unwrap_or_else(|e| e.into_inner())
    }

    // ---- registration ----

    /// Append a global middleware
    ///
    /// Global middlewares run before route-local ones. Each route captures
    /// the list when it is registered, so add these first.
    pub fn use_middleware<M>(&self, middleware: impl IntoHandler<M>) -> &Self {
        self.settings_mut().middlewares.push(middleware.into_handler());
        self
    }

    /// Fresh builder for this app
    #[must_use]
    pub fn builder(&self) -> RouteBuilder {
        RouteBuilder::new(self.clone())
    }

    /// Builder for an exact path
    #[must_use]
    pub fn path(&self, path: &str) -> RouteBuilder {
        self.builder().path(path)
    }

    /// Builder for a path prefix
    #[must_use]
    pub fn path_prefix(&self, prefix: &str) -> RouteBuilder {
        self.builder().path_prefix(prefix)
    }

    /// Builder restricted to one host
    #[must_use]
    pub fn domain(&self, domain: &str) -> RouteBuilder {
        self.builder().domain(domain)
    }

    /// Group rooted at `path`
    #[must_use]
    pub fn group(&self, path: &str) -> RouteBuilder {
        self.builder().group(path)
    }

    /// Group whose routes match by prefix under `prefix`
    #[must_use]
    pub fn path_prefix_group(&self, prefix: &str) -> RouteBuilder {
        self.builder().path_prefix_group(prefix)
    }

    /// Register `handler` for `method` and `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` for a malformed pattern.
    pub fn handle<M>(&self, method: Method, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.path(path).method(method.as_str()).handle(handler)
    }

    /// `GET path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn get<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().get(path, handler)
    }

    /// `POST path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn post<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().post(path, handler)
    }

    /// `PUT path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn put<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().put(path, handler)
    }

    /// `DELETE path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn delete<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().delete(path, handler)
    }

    /// `PATCH path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn patch<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().patch(path, handler)
    }

    /// `OPTIONS path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn options<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().options(path, handler)
    }

    /// `HEAD path`
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn head<M>(&self, path: &str, handler: impl IntoHandler<M>) -> Result<RouteBuilder> {
        self.builder().head(path, handler)
    }

    /// Serve files from `dir` under the `path` prefix
    ///
    /// # Errors
    ///
    /// Same as [`App::handle`].
    pub fn static_dir(&self, path: &str, dir: impl Into<PathBuf>) -> Result<RouteBuilder> {
        self.path_prefix(path).static_dir(dir)
    }

    /// Registered routes in match order
    #[must_use]
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.inner.table.routes()
    }

    pub(crate) fn register(&self, route: Route) -> Arc<Route> {
        self.inner.table.insert(route)
    }

    pub(crate) fn global_middlewares(&self) -> Vec<Handler> {
        self.settings().middlewares.clone()
    }

    pub(crate) fn register_not_found(&self, scope: String, hook: HookFn) {
        let mut settings = self.settings_mut();
        settings.scoped_not_found.retain(|(s, _)| *s != scope);
        settings.scoped_not_found.push((scope, hook));
    }

    // ---- hooks ----

    /// App-wide hook run before every matched pipeline
    pub fn before_each<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.settings_mut().hooks.before_each = Some(hook);
        self
    }

    /// App-wide hook run once after every matched pipeline
    pub fn after_each<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.settings_mut().hooks.after_each = Some(hook);
        self
    }

    /// App-wide error hook
    pub fn on_error<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context, &Error) + Send + Sync + 'static,
    {
        let hook: ErrorHookFn = Arc::new(hook);
        self.settings_mut().hooks.on_error = Some(hook);
        self
    }

    /// App-wide not-found hook
    pub fn not_found<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let hook: HookFn = Arc::new(hook);
        self.settings_mut().hooks.not_found = Some(hook);
        self
    }

    // ---- collaborators ----

    /// Make `value` resolvable by type in every request
    pub fn inject<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.inner.injector.map(value);
        self
    }

    /// Register a lazy, memoized provider for `T`
    pub fn provide<T, F>(&self, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> Result<T> + Send + Sync + 'static,
    {
        self.inner.injector.provide(factory);
        self
    }

    /// Resolve an app-level dependency
    ///
    /// # Errors
    ///
    /// Returns `Error::Unresolved` when nothing provides `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.inner.injector.resolve::<T>()
    }

    /// The root injector
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.inner.injector
    }

    /// Template engine used by `Context::render`
    pub fn templates(&self, engine: impl TemplateEngine + 'static) -> &Self {
        self.settings_mut().templates = Some(Arc::new(engine));
        self
    }

    /// Session implementation started for each request
    pub fn session_factory<F>(&self, factory: F) -> &Self
    where
        F: Fn() -> Box<dyn Session> + Send + Sync + 'static,
    {
        self.settings_mut().session_factory = Some(Arc::new(factory));
        self
    }

    // ---- serving ----

    /// Run one request through the router
    #[must_use]
    pub fn handle_request(&self, request: Request) -> Response {
        self.handle_with_cancellation(request, CancellationToken::new())
    }

    /// Run one request; `cancel` is exposed to handlers through the context
    #[must_use]
    pub fn handle_with_cancellation(&self, request: Request, cancel: CancellationToken) -> Response {
        let writer = Writer::default();
        let (app_hooks, templates, session) = {
            let settings = self.settings();
            let session = settings.session_factory.as_ref().map_or_else(
                || Box::new(MemorySession::new()) as Box<dyn Session>,
                |factory| factory(),
            );
            (settings.hooks.clone(), settings.templates.clone(), session)
        };

        let mut ctx = self.inner.pool.acquire();
        ctx.bind(
            writer.clone(),
            Arc::new(request),
            self.inner.injector.child(),
            cancel,
            session,
            templates,
        );

        match ctx.start_session() {
            Ok(()) => match self.inner.table.match_request(ctx.request()) {
                Some(matched) => run_route(&mut ctx, matched, &app_hooks),
                None => self.run_not_found(&mut ctx, &app_hooks),
            },
            Err(e) => {
                error!(error = %e, path = %ctx.request().path, "Session start failed");
                write_error(&ctx, &e);
            }
        }

        self.inner.pool.release(ctx);
        writer.take_response().unwrap_or_default()
    }

    /// Convenience for tests: run `method target` with no body
    #[must_use]
    pub fn test_request(&self, method: Method, target: &str) -> Response {
        self.handle_request(Request::new(method, target))
    }

    fn run_not_found(&self, ctx: &mut Context, app_hooks: &Hooks) {
        let path = ctx.request().path.clone();
        debug!(method = %ctx.request().method, path = %path, "No route matched");

        let scoped = self
            .settings()
            .scoped_not_found
            .iter()
            .filter(|(scope, _)| in_scope(&path, scope))
            .max_by_key(|(scope, _)| scope.len())
            .map(|(_, hook)| Arc::clone(hook));

        match scoped.or_else(|| app_hooks.not_found.clone()) {
            Some(hook) => guarded("not_found", || hook(ctx)),
            None => {
                if let Err(e) = ctx.writer().error(StatusCode::NOT_FOUND, "404 page not found") {
                    warn!(error = %e, "Failed to write not-found response");
                }
            }
        }
    }
}

/// Hooks, pipeline and recovery for a matched route
fn run_route(ctx: &mut Context, matched: RouteMatch, app_hooks: &Hooks) {
    let RouteMatch { route, params } = matched;
    *ctx.params_mut() = params;
    let hooks = route.hooks.or(app_hooks);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if let Some(before) = &hooks.before_each {
            before(ctx);
        }
        route.pipeline.invoke(ctx)
    }))
    .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

    if let Err(err) = outcome {
        if matches!(err, Error::Panic(_)) {
            error!(method = %ctx.request().method, path = %ctx.request().path, error = %err, "Recovered from panic");
        } else {
            warn!(method = %ctx.request().method, path = %ctx.request().path, error = %err, "Request failed");
        }
        match &hooks.on_error {
            Some(hook) => guarded("on_error", || hook(ctx, &err)),
            None => write_error(ctx, &err),
        }
    }

    if let Some(after) = &hooks.after_each {
        guarded("after_each", || after(ctx));
    }
}

/// Whether `path` is `scope` itself or lies below it
fn in_scope(path: &str, scope: &str) -> bool {
    match path.strip_prefix(scope) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || scope.ends_with('/'),
        None => false,
    }
}

/// Default error answer; left alone when a status is already committed
fn write_error(ctx: &Context, err: &Error) {
    let writer = ctx.writer();
    if writer.is_committed() {
        return;
    }
    if let Err(e) = writer.error(err.status_code(), &err.public_message()) {
        warn!(error = %e, "Failed to write error response");
    }
}

/// Run a hook, logging instead of propagating a panic
fn guarded(kind: &'static str, hook: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
        let err = Error::from_panic(payload);
        error!(hook = kind, error = %err, "Hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_plain_404() {
        let app = App::new();
        let res = app.test_request(Method::GET, "/missing");
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body_string(), "404 page not found\n");
    }

    #[test]
    fn test_app_not_found_hook() {
        let app = App::new();
        app.not_found(|ctx: &mut Context| {
            let _ = ctx.text(StatusCode::NOT_FOUND, "custom");
        });
        assert_eq!(app.test_request(Method::GET, "/x").body_string(), "custom");
    }

    #[test]
    fn test_scoped_not_found_longest_wins() {
        let app = App::new();
        app.not_found(|ctx: &mut Context| {
            let _ = ctx.text(StatusCode::NOT_FOUND, "app");
        });
        let _api = app.group("/api").not_found(|ctx: &mut Context| {
            let _ = ctx.text(StatusCode::NOT_FOUND, "api");
        });
        let _v2 = app.group("/api/v2").not_found(|ctx: &mut Context| {
            let _ = ctx.text(StatusCode::NOT_FOUND, "v2");
        });

        assert_eq!(app.test_request(Method::GET, "/api/v2/x").body_string(), "v2");
        assert_eq!(app.test_request(Method::GET, "/api/v1/x").body_string(), "api");
        assert_eq!(app.test_request(Method::GET, "/other").body_string(), "app");
        assert_eq!(app.test_request(Method::GET, "/apiary").body_string(), "app");
        assert_eq!(app.test_request(Method::GET, "/api").body_string(), "api");
        assert_eq!(app.test_request(Method::GET, "/api/v2").body_string(), "v2");
    }

    #[test]
    fn test_in_scope_respects_segments() {
        assert!(in_scope("/api", "/api"));
        assert!(in_scope("/api/x", "/api"));
        assert!(!in_scope("/apiary", "/api"));
        assert!(in_scope("/files/a", "/files/"));
        assert!(in_scope("/anything", ""));
    }

    #[test]
    fn test_default_error_uses_status() {
        let app = App::new();
        app.get("/teapot", || -> Result<()> { Err(Error::status(StatusCode::IM_A_TEAPOT, "short and stout")) })
            .unwrap();
        app.get("/boom", || -> Result<()> { Err(Error::Session("secret".to_string())) })
            .unwrap();

        let res = app.test_request(Method::GET, "/teapot");
        assert_eq!(res.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(res.body_string(), "short and stout\n");

        let res = app.test_request(Method::GET, "/boom");
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string(), "Internal Server Error\n");
    }

    #[test]
    fn test_route_hook_beats_app_hook() {
        let app = App::new();
        app.on_error(|ctx: &mut Context, _: &Error| {
            let _ = ctx.text(StatusCode::BAD_GATEWAY, "app");
        });
        app.path("/r")
            .on_error(|ctx: &mut Context, _: &Error| {
                let _ = ctx.text(StatusCode::CONFLICT, "route");
            })
            .handle(|| -> Result<()> { Err(Error::status(StatusCode::BAD_REQUEST, "x")) })
            .unwrap();
        app.get("/a", || -> Result<()> { Err(Error::status(StatusCode::BAD_REQUEST, "x")) })
            .unwrap();

        assert_eq!(app.test_request(Method::GET, "/r").body_string(), "route");
        assert_eq!(app.test_request(Method::GET, "/a").body_string(), "app");
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let app = App::new();
        let after = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&after);
        app.on_error(|_: &mut Context, _: &Error| panic!("hook down"));
        app.after_each(move |_: &mut Context| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        app.get("/p", || -> Result<()> { panic!("handler down") }).unwrap();

        let _ = app.test_request(Method::GET, "/p");
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_start_failure_is_500() {
        struct Broken;
        impl Session for Broken {
            fn start(&mut self, _: &Request, _: &Writer) -> Result<()> {
                Err(Error::Session("store offline".to_string()))
            }
            fn get(&self, _: &str) -> Option<serde_json::Value> {
                None
            }
            fn set(&mut self, _: &str, _: serde_json::Value) -> Result<()> {
                Ok(())
            }
            fn delete(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            fn flash(&mut self, _: &str) -> Result<()> {
                Ok(())
            }
            fn flashes(&mut self) -> Result<Vec<String>> {
                Ok(Vec::new())
            }
            fn refresh(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let app = App::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        app.session_factory(|| Box::new(Broken));
        app.get("/", move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let res = app.test_request(Method::GET, "/");
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_injected_values_reach_handlers() {
        let app = App::new();
        app.inject(String::from("db-url"));
        app.get("/", |ctx: &mut Context| -> Result<()> {
            let url = ctx.resolve::<String>()?;
            ctx.text(StatusCode::OK, &url)
        })
        .unwrap();
        assert_eq!(app.test_request(Method::GET, "/").body_string(), "db-url");
        assert_eq!(*app.resolve::<String>().unwrap(), "db-url");
    }

    #[test]
    fn test_contexts_are_recycled() {
        let app = App::new();
        app.get("/", |ctx: &mut Context| ctx.set("n", 1u8)).unwrap();
        let _ = app.test_request(Method::GET, "/");
        let _ = app.test_request(Method::GET, "/");
        assert_eq!(app.inner.pool.idle(), 1);
    }
}
