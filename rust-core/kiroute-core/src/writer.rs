//! # Response Writer
//!
//! The writer handle handlers and middlewares write through.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: `ResponseWriter` only accepts headers, a status and body bytes
//! - **O**: Wrappers (the cache recorder) implement the same trait
//! - **L**: Any `ResponseWriter` can stand in for the buffered one
//! - **D**: Handlers see the `Writer` handle, never the concrete sink

use crate::response::Response;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use hyper::{HeaderMap, StatusCode};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Sink for one HTTP response
///
/// The first `write_header` commits the status; a `write` before any
/// `write_header` commits `200 OK`.
pub trait ResponseWriter: Send {
    /// Headers to be sent
    fn headers(&self) -> &HeaderMap;

    /// Mutable headers to be sent
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status code
    fn write_header(&mut self, status: StatusCode);

    /// Append body bytes
    ///
    /// # Errors
    ///
    /// Returns the sink's IO error.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Committed status, if any
    fn status(&self) -> Option<StatusCode>;

    /// Extract the finished response, if this sink buffers one
    fn take_response(&mut self) -> Option<Response> {
        None
    }
}

/// In-memory response sink used by the server and `App::test_request`
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl BufferedResponse {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some(current) = self.status {
            debug!(current = %current, ignored = %status, "Superfluous write_header call");
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn take_response(&mut self) -> Option<Response> {
        Some(Response {
            status: self.status.take().unwrap_or(StatusCode::OK),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body).into(),
        })
    }
}

/// Shared handle to the response sink of one request
///
/// Cloning is cheap; all clones write to the same sink.
#[derive(Clone)]
pub struct Writer {
    inner: Arc<Mutex<Box<dyn ResponseWriter>>>,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new(BufferedResponse::new())
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Writer {
    /// Wrap a response sink
    pub fn new(sink: impl ResponseWriter + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ResponseWriter>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a header, replacing existing values; invalid pairs are ignored
    pub fn set_header(&self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.lock().headers_mut().insert(n, v);
        }
    }

    /// Append a header value; invalid pairs are ignored
    pub fn add_header(&self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.lock().headers_mut().append(n, v);
        }
    }

    /// Remove every value of a header
    pub fn remove_header(&self, name: &str) {
        self.lock().headers_mut().remove(name);
    }

    /// First value of a response header
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    /// Snapshot of the response headers
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers().clone()
    }

    /// Merge headers into the response
    ///
    /// Every name present in `headers` replaces the values already set under
    /// that name; other names are left alone.
    pub fn merge_headers(&self, headers: &HeaderMap) {
        let mut sink = self.lock();
        let target = sink.headers_mut();
        for name in headers.keys() {
            target.remove(name);
        }
        for (name, value) in headers {
            target.append(name.clone(), value.clone());
        }
    }

    /// Commit the status code
    pub fn write_header(&self, status: StatusCode) {
        self.lock().write_header(status);
    }

    /// Append body bytes
    ///
    /// # Errors
    ///
    /// Returns the sink's IO error.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    /// Committed status, if any
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status()
    }

    /// Whether a status has been committed
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.status().is_some()
    }

    /// Plain-text error response: `message` plus a newline
    ///
    /// # Errors
    ///
    /// Returns the sink's IO error.
    pub fn error(&self, status: StatusCode, message: &str) -> io::Result<()> {
        {
            let mut sink = self.lock();
            let headers = sink.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            sink.write_header(status);
        }
        self.write(format!("{message}\n").as_bytes())?;
        Ok(())
    }

    /// Extract the finished response from a buffering sink
    #[must_use]
    pub fn take_response(&self) -> Option<Response> {
        self.lock().take_response()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
