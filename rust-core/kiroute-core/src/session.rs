//! # Session
//!
//! Narrow interface the router uses to talk to a session store. The router
//! starts one session per request before dispatch and exposes it through the
//! context; storage is up to the implementation.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::writer::Writer;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-request session handle
pub trait Session: Send {
    /// Load session state for this request
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read; the request then
    /// answers 500 without running the pipeline.
    fn start(&mut self, req: &Request, writer: &Writer) -> Result<()>;

    /// Value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not started or cannot be saved.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Remove a value
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not started or cannot be saved.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Queue a one-shot message
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not started.
    fn flash(&mut self, message: &str) -> Result<()>;

    /// Take all queued messages
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not started.
    fn flashes(&mut self) -> Result<Vec<String>>;

    /// Extend the session lifetime
    ///
    /// # Errors
    ///
    /// Returns an error when the session is not started or cannot be saved.
    fn refresh(&mut self) -> Result<()>;
}

/// Builds a fresh session for each request
pub type SessionFactory = Arc<dyn Fn() -> Box<dyn Session> + Send + Sync>;

/// In-process session that lives for one request
///
/// Nothing is persisted between requests.
#[derive(Debug, Default)]
pub struct MemorySession {
    started: bool,
    values: HashMap<String, Value>,
    flashes: Vec<String>,
    refreshed: usize,
}

impl MemorySession {
    /// Create an unstarted session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `refresh` succeeded
    #[must_use]
    pub const fn refresh_count(&self) -> usize {
        self.refreshed
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::Session("session not started".to_string()))
        }
    }
}

impl Session for MemorySession {
    fn start(&mut self, _req: &Request, _writer: &Writer) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.ensure_started()?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_started()?;
        self.values.remove(key);
        Ok(())
    }

    fn flash(&mut self, message: &str) -> Result<()> {
        self.ensure_started()?;
        self.flashes.push(message.to_string());
        Ok(())
    }

    fn flashes(&mut self) -> Result<Vec<String>> {
        self.ensure_started()?;
        Ok(std::mem::take(&mut self.flashes))
    }

    fn refresh(&mut self) -> Result<()> {
        self.ensure_started()?;
        self.refreshed += 1;
        Ok(())
    }
}
