//! # Templates
//!
//! Rendering is delegated to an engine supplied by the application; the
//! router only hands it a name, the data and the response body writer.

use crate::error::Result;
use serde_json::Value;
use std::io;

/// Renders named templates
pub trait TemplateEngine: Send + Sync {
    /// Render template `name` with `data` into `out`
    ///
    /// # Errors
    ///
    /// Returns `Error::Template` for unknown templates or render failures and
    /// `Error::Io` when writing fails.
    fn execute_template(&self, out: &mut dyn io::Write, name: &str, data: &Value) -> Result<()>;
}
