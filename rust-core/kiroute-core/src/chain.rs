//! # Middleware Chain
//!
//! Composes middlewares and the terminal handler into one pipeline, built once
//! at registration.
//!
//! Running stage `k` installs a continuation for stage `k + 1` in the context;
//! `Context::next` runs it in the same call stack. A stage that never calls
//! `next` ends the pipeline there.

use crate::context::{Context, NextState};
use crate::error::Result;
use crate::handler::{dispatch, Handler};
use std::sync::Arc;

/// Frozen sequence of stages: middlewares in order, terminal handler last
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Handler]>,
}

impl Pipeline {
    /// Compose `middlewares` in front of `terminal`
    #[must_use]
    pub fn build(terminal: Handler, middlewares: &[Handler]) -> Self {
        let stages: Vec<Handler> = middlewares
            .iter()
            .cloned()
            .chain(std::iter::once(terminal))
            .collect();
        Self {
            stages: stages.into(),
        }
    }

    /// Number of stages, terminal handler included
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false: a pipeline carries at least its terminal handler
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The terminal handler
    #[must_use]
    pub fn terminal(&self) -> Option<&Handler> {
        self.stages.last()
    }

    /// Run the pipeline from its first stage
    ///
    /// # Errors
    ///
    /// Returns the first error a stage returns.
    pub fn invoke(&self, ctx: &mut Context) -> Result<()> {
        let result = Continuation {
            stages: Arc::clone(&self.stages),
            index: 0,
        }
        .run(ctx);
        ctx.next = NextState::Idle;
        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(Handler::shape))
            .finish()
    }
}

/// The remaining stages of a pipeline, starting at `index`
pub(crate) struct Continuation {
    stages: Arc<[Handler]>,
    index: usize,
}

impl Continuation {
    /// Dispatch the stage at `index` with its own continuation installed
    pub(crate) fn run(self, ctx: &mut Context) -> Result<()> {
        let Some(handler) = self.stages.get(self.index) else {
            return Ok(());
        };
        ctx.next = if self.index + 1 < self.stages.len() {
            NextState::Pending(Self {
                stages: Arc::clone(&self.stages),
                index: self.index + 1,
            })
        } else {
            NextState::Idle
        };
        let result = dispatch(ctx, handler);
        // The caller's own `next` was spent getting here.
        ctx.next = NextState::Consumed;
        result
    }
}
