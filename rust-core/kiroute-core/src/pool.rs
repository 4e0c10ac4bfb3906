//! # Context Pool
//!
//! Recycles `Context` allocations (value bag, params map) across requests.
//! A released context is fully reset before anyone can acquire it again.

use crate::context::Context;
use crate::request::Request;
use std::sync::{Arc, Mutex};

/// Default number of idle contexts kept around
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Bounded pool of reusable contexts
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Context>>,
    capacity: usize,
    empty_request: Arc<Request>,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl ContextPool {
    /// Create a pool keeping at most `capacity` idle contexts
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
            empty_request: Arc::new(Request::default()),
        }
    }

    /// Take a clean context
    #[must_use]
    pub fn acquire(&self) -> Context {
        self.free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default()
    }

    /// Reset a context and keep it for reuse
    pub fn release(&self, mut ctx: Context) {
        ctx.reset(&self.empty_request);
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }

    /// Number of idle contexts
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
