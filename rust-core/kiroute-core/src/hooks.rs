//! # Hooks
//!
//! Optional callbacks around the pipeline, settable on the app and per route.
//! A route hook replaces the app hook of the same kind; they never stack.

use crate::context::Context;
use crate::error::Error;
use std::sync::Arc;

/// Callback run before or after the pipeline, or for unmatched requests
pub type HookFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Callback receiving the pipeline's error or recovered panic
pub type ErrorHookFn = Arc<dyn Fn(&mut Context, &Error) + Send + Sync>;

/// Set of lifecycle hooks
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs before the pipeline
    pub before_each: Option<HookFn>,
    /// Runs once after the pipeline, whatever happened
    pub after_each: Option<HookFn>,
    /// Receives handler errors and recovered panics
    pub on_error: Option<ErrorHookFn>,
    /// Answers requests no route matched
    pub not_found: Option<HookFn>,
}

impl Hooks {
    /// Fill every unset hook from `fallback`
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        Self {
            before_each: self.before_each.clone().or_else(|| fallback.before_each.clone()),
            after_each: self.after_each.clone().or_else(|| fallback.after_each.clone()),
            on_error: self.on_error.clone().or_else(|| fallback.on_error.clone()),
            not_found: self.not_found.clone().or_else(|| fallback.not_found.clone()),
        }
    }

    /// Whether no hook is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.before_each.is_none()
            && self.after_each.is_none()
            && self.on_error.is_none()
            && self.not_found.is_none()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}
