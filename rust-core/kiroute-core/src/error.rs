//! # Error Handling
//!
//! Centralized error types for kiroute core.
//! Uses `thiserror` for ergonomic error definitions.

use hyper::StatusCode;
use std::any::Any;
use thiserror::Error;

/// Result type alias for kiroute operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the kiroute runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided at registration
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A generic handler asked for a parameter nobody provides
    #[error("No provider registered for {type_name}")]
    Unresolved {
        /// Rust type name of the missing dependency
        type_name: &'static str,
    },

    /// A handler or middleware panicked; the payload was recovered
    #[error("Handler panicked: {0}")]
    Panic(String),

    /// A middleware called `next` after its continuation was already consumed
    #[error("next() called more than once by the same middleware")]
    NextAlreadyCalled,

    /// Handler-chosen HTTP error
    #[error("{message}")]
    Status {
        /// Status code to answer with
        code: StatusCode,
        /// Message sent as response body
        message: String,
    },

    /// Session collaborator failure
    #[error("Session error: {0}")]
    Session(String),

    /// Template collaborator failure
    #[error("Template error: {0}")]
    Template(String),

    /// Request payload could not be decoded
    #[error("Decode error: {reason}")]
    Decode {
        /// Parser message
        reason: String,
    },

    /// Response body could not be encoded
    #[error("{format} encode error: {reason}")]
    Encode {
        /// Target format
        format: &'static str,
        /// Encoder message
        reason: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Application error returned by a handler
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl Error {
    /// Build a [`Error::Status`] from a status code and message
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Normalize a recovered panic payload into an error value
    ///
    /// An `Error` payload (raised with `std::panic::panic_any`) is kept as is;
    /// string payloads are formatted; anything else becomes a generic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Self>() {
            Ok(err) => return *err,
            Err(other) => other,
        };
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panic(msg)
    }

    /// Status code used when no `on_error` hook handles this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { code, .. } => *code,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Decode { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body used when no `on_error` hook handles this error
    ///
    /// Internal failures never leak their message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            Self::PayloadTooLarge { .. } | Self::Decode { .. } => self.to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}
