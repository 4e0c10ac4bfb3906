//! # kiroute Core
//!
//! In-process HTTP router: route matching, middleware pipelines and
//! handlers whose parameter shape is picked at registration time.
//!
//! ## Architecture
//!
//! Routes are declared through [`App`] and [`RouteBuilder`] and kept in a
//! sorted [`RouteTable`]. For each request the matcher selects at most one
//! route, its frozen [`Pipeline`] runs middlewares depth-first through
//! `ctx.next()`, and the terminal [`Handler`] is dispatched by shape. Hooks
//! and panic recovery wrap the whole pipeline.
//!
//! ## Modules
//!
//! - `app` - Request lifecycle, hooks, not-found handling
//! - `builder` - Fluent route and group construction
//! - `route` / `table` / `matcher` - Patterns, the sorted table, selection
//! - `chain` - Middleware pipeline with explicit `next`
//! - `handler` / `resolve` - Handler shapes and parameter resolution
//! - `context` / `pool` - Per-request state and its recycling
//! - `writer` / `response` / `request` - HTTP plumbing
//! - `cache` - Single-slot response cache
//! - `middleware` - Stock middlewares
//! - `injector` - Hierarchical type-keyed dependency lookup
//! - `session` / `template` / `static_files` / `cookie` - Collaborators
//! - `server` / `config` / `env` / `logging` - Hyper server and ambient setup
//! - `json` - High-performance JSON parsing with simd-json
//! - `encoding` - XML and CSV response bodies
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod app;
pub mod builder;
pub mod cache;
pub mod chain;
pub mod config;
pub mod context;
pub mod cookie;
pub mod encoding;
pub mod env;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod injector;
pub mod json;
pub mod logging;
pub mod matcher;
pub mod middleware;
pub mod pool;
pub mod request;
pub mod resolve;
pub mod response;
pub mod route;
pub mod server;
pub mod session;
pub mod static_files;
pub mod table;
pub mod template;
pub mod writer;

pub use app::App;
pub use builder::RouteBuilder;
pub use cache::{CacheMiddleware, Clock, SystemClock};
pub use chain::Pipeline;
pub use config::ServerConfig;
pub use context::Context;
pub use cookie::{Cookie, SameSite};
pub use encoding::{to_csv_body, to_xml_body};
pub use error::{Error, Result};
pub use handler::{Handler, HandlerShape, IntoHandler};
pub use hooks::Hooks;
pub use injector::Injector;
pub use json::{parse_json, to_json_body};
pub use middleware::{
    CorsMiddleware, JwtGuard, LoggingMiddleware, Middleware, ProxyHeaders, RateLimitMiddleware,
    RefreshSession,
};
pub use request::Request;
pub use resolve::{Dep, Json, Resolve};
pub use response::Response;
pub use route::{Route, RouteMatch, Segment, Vars};
pub use server::{listen_and_serve, Server};
pub use session::{MemorySession, Session};
pub use static_files::StaticDir;
pub use table::RouteTable;
pub use template::TemplateEngine;
pub use writer::{ResponseWriter, Writer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
