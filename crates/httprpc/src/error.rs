//! Error types for httprpc.
//!
//! Every failure a caller can observe maps to exactly one variant, so client
//! code can tell an encoding problem from a dead server from a handler that
//! answered with an error.

use crate::envelope::Status;
use thiserror::Error;

/// Main error type for the httprpc library.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A payload could not be encoded, or decoded into the expected type.
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The top-level envelope is structurally invalid.
    #[error("Malformed envelope: {message}")]
    MalformedEnvelope { message: String },

    /// The HTTP exchange itself failed.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Call cancelled before the exchange completed")]
    Cancelled,

    #[error("method {method} not found")]
    UnknownMethod { method: String },

    /// The server answered with a non-OK status. Displays the remote
    /// message verbatim.
    #[error("{message}")]
    Remote { status: Status, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for httprpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Serialization {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        RpcError::Transport {
            message,
            source: Some(err),
        }
    }
}

impl RpcError {
    pub fn malformed(message: impl Into<String>) -> Self {
        RpcError::MalformedEnvelope {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        RpcError::Configuration {
            message: message.into(),
        }
    }

    /// Envelope status used when this error crosses the wire.
    ///
    /// Only two codes exist today, so every error maps to `Status::ERROR`
    /// except a remote error, which keeps whatever the server sent.
    pub fn status(&self) -> Status {
        match self {
            RpcError::Remote { status, .. } => *status,
            _ => Status::ERROR,
        }
    }

    /// True for failures of the exchange itself, including cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport { .. } | RpcError::Cancelled)
    }

    /// The server-provided message, if this is a remote error.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            RpcError::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}
