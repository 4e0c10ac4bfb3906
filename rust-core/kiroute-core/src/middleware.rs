//! # Middleware System
//!
//! Stock middlewares for logging, proxies, CORS, rate limiting, sessions and
//! bearer-token auth.
//!
//! A middleware is just a pipeline stage: it receives the context, may write
//! a response, and calls `ctx.next()` to run the rest of the pipeline.
//! Closures of any handler shape work too; this trait is for stateful ones.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Each middleware has a single responsibility
//! - **O**: Extensible via Middleware trait
//! - **D**: The pipeline depends on the trait, not concrete implementations

use crate::context::Context;
use crate::error::Result;
use hyper::StatusCode;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request key under which `JwtGuard` stores the verified claims
pub const CLAIMS_KEY: &str = "claims";

/// Stateful pipeline stage
pub trait Middleware: Send + Sync + 'static {
    /// Process the request; call `ctx.next()` to continue the pipeline
    ///
    /// # Errors
    ///
    /// Returns the middleware's own failure or the rest of the pipeline's.
    fn handle(&self, ctx: &mut Context) -> Result<()>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        (**self).handle(ctx)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Logging middleware - one structured line per request
#[derive(Debug, Default)]
pub struct LoggingMiddleware {
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable header logging
    #[must_use]
    pub const fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        let start = Instant::now();
        let method = ctx.request().method.clone();
        let path = ctx.request().path.clone();
        if self.log_headers {
            debug!(method = %method, path = %path, headers = ?ctx.request().headers(), "Request received");
        }

        let result = ctx.next();

        let request = ctx.request();
        info!(
            method = %method,
            path = %path,
            status = ctx.writer().status().map_or(200, |s| s.as_u16()),
            remote_addr = request.remote_addr.as_deref().unwrap_or("-"),
            request_id = request.header("x-request-id").unwrap_or("-"),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            failed = result.is_err(),
            "Request handled"
        );
        result
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Trust `X-Forwarded-For` / `X-Forwarded-Proto` from a fronting proxy
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyHeaders;

impl Middleware for ProxyHeaders {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        let forwarded_for = ctx
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let forwarded_proto = ctx.header("x-forwarded-proto").map(str::to_string);

        if forwarded_for.is_some() || forwarded_proto.is_some() {
            let req = ctx.request_mut();
            if let Some(addr) = forwarded_for {
                req.remote_addr = Some(addr);
            }
            if let Some(proto) = forwarded_proto {
                req.scheme = Some(proto);
            }
        }
        ctx.next()
    }

    fn name(&self) -> &'static str {
        "ProxyHeaders"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// Preflight `OPTIONS` requests are answered with `204` without running the
/// rest of the pipeline.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Get the Access-Control-Allow-Origin header value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        ctx.set_header("Access-Control-Allow-Origin", &self.allow_origin);
        ctx.set_header("Access-Control-Allow-Methods", &self.allow_methods);
        ctx.set_header("Access-Control-Allow-Headers", &self.allow_headers);
        if ctx.request().method == hyper::Method::OPTIONS {
            ctx.writer().write_header(StatusCode::NO_CONTENT);
            return Ok(());
        }
        ctx.next()
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

/// Token bucket rate limiting middleware, keyed by client address
pub struct RateLimitMiddleware {
    /// Maximum burst capacity
    capacity: u64,
    /// Tokens refilled per second
    refill_per_sec: u64,
    /// Per-key buckets
    state: Mutex<HashMap<String, Bucket>>,
}

/// Internal token bucket state
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

impl RateLimitMiddleware {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, key: &str) -> bool {
        let mut map = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let bucket = map.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill);
        let refill = u64::try_from(elapsed.as_millis() * u128::from(self.refill_per_sec) / 1000).unwrap_or(u64::MAX);
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        let key = ctx.request().remote_addr.clone().unwrap_or_else(|| "unknown".to_string());
        if self.allow(&key) {
            return ctx.next();
        }
        debug!(client = %key, "Rate limit exceeded");
        ctx.json(StatusCode::TOO_MANY_REQUESTS, &json!({"error": "Rate limit exceeded"}))
    }

    fn name(&self) -> &'static str {
        "RateLimitMiddleware"
    }
}

/// Refresh the session on every request, then continue
#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshSession;

impl Middleware for RefreshSession {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        if let Err(e) = ctx.refresh_session() {
            debug!(error = %e, "Session refresh skipped");
        }
        ctx.next()
    }

    fn name(&self) -> &'static str {
        "RefreshSession"
    }
}

/// Bearer-token guard (HS256)
///
/// Verified claims are stored in the context under [`CLAIMS_KEY`] as a
/// `serde_json::Value`; anything else is answered with `401`.
#[derive(Clone)]
pub struct JwtGuard {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtGuard {
    /// Create a guard from a shared secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl Middleware for JwtGuard {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        let token = ctx
            .header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);
        let Some(token) = token else {
            return ctx.json(
                StatusCode::UNAUTHORIZED,
                &json!({"error": "Missing or invalid Authorization header"}),
            );
        };

        match decode::<serde_json::Value>(&token, &self.decoding_key, &self.validation) {
            Ok(data) => {
                ctx.set(CLAIMS_KEY, data.claims);
                ctx.next()
            }
            Err(e) => {
                warn!("JWT validation failed: {}", e);
                ctx.json(StatusCode::UNAUTHORIZED, &json!({"error": "Unauthorized"}))
            }
        }
    }

    fn name(&self) -> &'static str {
        "JwtGuard"
    }
}
