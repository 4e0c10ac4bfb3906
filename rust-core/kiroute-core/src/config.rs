//! # Server Configuration
//!
//! Defaults plus environment overrides.
//!
//! | Variable             | Field              | Default     |
//! |----------------------|--------------------|-------------|
//! | `HOST`               | `address` (ip)     | `127.0.0.1` |
//! | `PORT`               | `address` (port)   | `5000`      |
//! | `READ_TIMEOUT_SECS`  | `read_timeout`     | `60`        |
//! | `WRITE_TIMEOUT_SECS` | `write_timeout`    | `60`        |
//! | `MAX_BODY_SIZE`      | `max_body_size`    | `1048576`   |
//! | `TEMPLATES`          | `templates_dir`    | `templates` |

use crate::env::{int_or, var_or};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default listening port
pub const DEFAULT_PORT: u16 = 5000;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Time allowed to read request headers and body
    pub read_timeout: Duration,
    /// Time allowed for the router to produce a response
    pub write_timeout: Duration,
    /// Shutdown timeout for graceful shutdown
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Directory an application may load templates from
    pub templates_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            keep_alive: true,
            templates_dir: PathBuf::from("templates"),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the environment
    ///
    /// Unparsable values fall back to the default and are logged.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = var_or("HOST", &defaults.address.ip().to_string());
        let ip = host.parse::<IpAddr>().unwrap_or_else(|_| {
            warn!(host = %host, "Ignoring unparsable HOST");
            defaults.address.ip()
        });
        let port = u16::try_from(int_or("PORT", i64::from(DEFAULT_PORT))).unwrap_or(DEFAULT_PORT);

        Self {
            address: SocketAddr::new(ip, port),
            read_timeout: secs_or("READ_TIMEOUT_SECS", defaults.read_timeout),
            write_timeout: secs_or("WRITE_TIMEOUT_SECS", defaults.write_timeout),
            max_body_size: usize::try_from(int_or("MAX_BODY_SIZE", -1)).unwrap_or(defaults.max_body_size),
            templates_dir: PathBuf::from(var_or("TEMPLATES", "templates")),
            ..defaults
        }
    }

    /// Bind to another address
    #[must_use]
    pub const fn bind(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Set both timeouts
    #[must_use]
    pub const fn timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// Set max request body size
    #[must_use]
    pub const fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

fn secs_or(key: &str, fallback: Duration) -> Duration {
    u64::try_from(int_or(key, -1)).map_or(fallback, Duration::from_secs)
}
