//! # Static Files
//!
//! Serves a directory under a URL prefix. Registered as a prefix route whose
//! terminal handler takes `(&Writer, &Request)`.

use crate::error::Result;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::Writer;
use hyper::header::CONTENT_TYPE;
use hyper::StatusCode;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A directory served under a URL prefix
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
    strip: String,
}

impl StaticDir {
    /// Serve `root`, removing `strip` from request paths first
    pub fn new(strip: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            strip: strip.into(),
        }
    }

    /// Map a URL path to a file under the root; `None` for traversal attempts
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let relative = url_path.strip_prefix(self.strip.as_str())?;
        let mut path = self.root.clone();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if path.is_dir() {
            path.push("index.html");
        }
        Some(path)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
    }

    /// Write the file for `req`, or `404 Not Found`
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` for read failures other than a missing file.
    pub fn serve(&self, w: &Writer, req: &Request) -> Result<()> {
        let Some(path) = self.map_path(&req.path).filter(|p| p.is_file()) else {
            debug!(path = %req.path, "Static file not found");
            return not_found(w);
        };
        match fs::read(&path) {
            Ok(bytes) => {
                w.set_header(CONTENT_TYPE.as_str(), Self::content_type(&path));
                w.write_header(StatusCode::OK);
                w.write(&bytes)?;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => not_found(w),
            Err(e) => Err(e.into()),
        }
    }

    /// Terminal handler serving this directory
    #[must_use]
    pub fn handler(self) -> Handler {
        let dir = Arc::new(self);
        Handler::WriterRequest(Arc::new(move |w: &Writer, req: &Request| dir.serve(w, req)))
    }
}

fn not_found(w: &Writer) -> Result<()> {
    w.error(StatusCode::NOT_FOUND, "404 page not found")?;
    Ok(())
}
