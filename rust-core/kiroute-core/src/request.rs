//! # HTTP Request
//!
//! Immutable request value shared by the matcher, the pipeline and handlers.
//!
//! - Headers are stored as a `HeaderMap` (case-insensitive names)
//! - Body is collected once by the server and kept as `Bytes`
//! - Query string is parsed at construction, form values on first access

use crate::error::{Error, Result};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{HeaderMap, Method};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Multi-valued form/query parameters in arrival order
pub type FormValues = HashMap<String, Vec<String>>;

/// Inbound HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Host the request was addressed to (`Host` header or URI authority)
    pub host: String,
    /// URL scheme, when known (set by `ProxyHeaders`)
    pub scheme: Option<String>,
    /// Peer address, when known
    pub remote_addr: Option<String>,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Parsed query parameters (last value wins)
    query_params: HashMap<String, String>,
    /// Request headers
    headers: HeaderMap,
    /// Request body (collected)
    body: Bytes,
    /// Body and query values, parsed lazily
    form: OnceLock<FormValues>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// Create a request manually (for testing/internal use)
    ///
    /// `target` may carry a query string (`/search?q=rust`).
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query_string) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target, None),
        };
        let query_params = parse_query_string(query_string.as_deref())
            .into_iter()
            .collect();

        Self {
            method,
            path,
            host: String::new(),
            scheme: None,
            remote_addr: None,
            query_string,
            query_params,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            form: OnceLock::new(),
        }
    }

    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Append a header; invalid names or values are ignored
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            if n == HOST && self.host.is_empty() {
                self.host = value.to_string();
            }
            self.headers.append(n, v);
        }
        self.form = OnceLock::new();
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.form = OnceLock::new();
        self
    }

    /// Set the peer address
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Create from hyper request with body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or received body
    /// exceeds `max_body_size`, and `Error::Http` when the body stream fails.
    pub async fn from_hyper_with_limit<B>(
        req: hyper::Request<B>,
        remote_addr: Option<SocketAddr>,
        max_body_size: usize,
    ) -> Result<Self>
    where
        B: hyper::body::Body<Data = Bytes, Error = hyper::Error>,
    {
        let (parts, body) = req.into_parts();

        if let Some(len) = parts.headers.get(CONTENT_LENGTH) {
            if let Some(content_len) = len.to_str().ok().and_then(|s| s.parse::<usize>().ok()) {
                if content_len > max_body_size {
                    return Err(Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: content_len,
                    });
                }
            }
        }

        let bytes = BodyExt::collect(body).await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default();
        let query_string = parts.uri.query().map(String::from);
        let query_params = parse_query_string(query_string.as_deref())
            .into_iter()
            .collect();

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            host,
            scheme: parts.uri.scheme_str().map(String::from),
            remote_addr: remote_addr.map(|a| a.to_string()),
            query_string,
            query_params,
            headers: parts.headers,
            body: bytes,
            form: OnceLock::new(),
        })
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// All request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get query parameters as a HashMap
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Form values: url-encoded body parameters first, then query parameters
    #[must_use]
    pub fn form(&self) -> &FormValues {
        self.form.get_or_init(|| {
            let mut values = FormValues::new();
            let is_form = self
                .header(CONTENT_TYPE.as_str())
                .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
            if is_form {
                if let Some(body) = self.body_str() {
                    for (k, v) in parse_query_string(Some(body)) {
                        values.entry(k).or_default().push(v);
                    }
                }
            }
            for (k, v) in parse_query_string(self.query_string.as_deref()) {
                values.entry(k).or_default().push(v);
            }
            values
        })
    }

    /// Cookie value by name, from the `Cookie` header
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(hyper::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

/// Parse query string into ordered key/value pairs
///
/// Handles URL decoding; keeps duplicates in arrival order.
fn parse_query_string(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .filter_map(|pair| {
                    let mut parts = pair.splitn(2, '=');
                    let key = parts.next()?;
                    let value = parts.next().unwrap_or("");
                    Some((url_decode(key), url_decode(value)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Basic URL decoding
///
/// Decodes byte-wise so multi-byte UTF-8 escapes survive.
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
