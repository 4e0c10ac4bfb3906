//! # Response Cache
//!
//! Single-slot, per-route response cache with a time-to-live.
//!
//! A miss runs the rest of the pipeline through a recording writer and keeps
//! the status, the headers the handler set and the body. A hit replays them
//! without calling `next`. The slot lock is only held to read or replace the
//! entry, so concurrent misses may both run the handler.

use crate::context::Context;
use crate::error::Result;
use crate::middleware::Middleware;
use crate::writer::{ResponseWriter, Writer};
use hyper::body::Bytes;
use hyper::{HeaderMap, StatusCode};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One memoized response
#[derive(Debug, Clone)]
struct CacheEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: Instant,
}

/// Middleware serving a route's last successful response until it expires
pub struct CacheMiddleware {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<CacheEntry>>,
}

impl std::fmt::Debug for CacheMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMiddleware")
            .field("ttl", &self.ttl)
            .field("warm", &self.slot().is_some())
            .finish_non_exhaustive()
    }
}

impl CacheMiddleware {
    /// Cache for `ttl` on the wall clock
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Cache for `ttl` on a custom clock
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_entry(&self) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.slot().as_ref().filter(|e| now < e.expires_at).cloned()
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: &mut Context) -> Result<()> {
        if let Some(entry) = self.fresh_entry() {
            debug!(path = %ctx.request().path, status = %entry.status, "Cache hit");
            let writer = ctx.writer();
            writer.merge_headers(&entry.headers);
            writer.write_header(entry.status);
            writer.write(&entry.body)?;
            return Ok(());
        }

        let captured = Arc::new(Mutex::new(Captured::default()));
        let recorder = Recorder {
            inner: ctx.writer().clone(),
            headers: HeaderMap::new(),
            forwarded: false,
            captured: Arc::clone(&captured),
        };
        let original = ctx.replace_writer(Writer::new(recorder));
        let result = ctx.next();
        let recording = ctx.replace_writer(original);
        result?;

        // Headers set without any write still have to reach the client
        if !recording.is_committed() {
            recording.write_header(StatusCode::OK);
        }

        let captured = std::mem::take(&mut *captured.lock().unwrap_or_else(|e| e.into_inner()));
        let entry = CacheEntry {
            status: captured.status.unwrap_or(StatusCode::OK),
            headers: captured.headers,
            body: captured.body.into(),
            expires_at: self.clock.now() + self.ttl,
        };
        debug!(
            path = %ctx.request().path,
            status = %entry.status,
            ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            "Cache filled"
        );
        *self.slot() = Some(entry);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CacheMiddleware"
    }
}

/// What the recorder saw
#[derive(Debug, Default)]
struct Captured {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Writer that forwards to the real one and keeps a copy
///
/// Its header map starts empty, so only headers set downstream of the cache
/// are recorded.
struct Recorder {
    inner: Writer,
    headers: HeaderMap,
    forwarded: bool,
    captured: Arc<Mutex<Captured>>,
}

impl Recorder {
    fn captured(&self) -> MutexGuard<'_, Captured> {
        self.captured.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.forwarded {
            self.inner.write_header(status);
            return;
        }
        self.forwarded = true;
        self.inner.merge_headers(&self.headers);
        self.inner.write_header(status);
        let mut captured = self.captured();
        captured.status = Some(status);
        captured.headers = self.headers.clone();
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.forwarded {
            self.write_header(StatusCode::OK);
        }
        let written = self.inner.write(buf)?;
        self.captured().body.extend_from_slice(&buf[..written]);
        Ok(written)
    }

    fn status(&self) -> Option<StatusCode> {
        self.captured().status
    }
}
