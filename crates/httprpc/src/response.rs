//! Outgoing results built by handlers.
//!
//! `Response::ok` and `Response::error` (plus the [`errorf!`](crate::errorf)
//! macro) are the only ways to build one, so a response always holds either
//! a payload or a message, never both.

use crate::envelope::{ResultEnvelope, Status};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Data(Value),
    Error(String),
}

/// A handler's answer to one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    outcome: Outcome,
}

impl Response {
    /// Successful result carrying `value`.
    ///
    /// A value that cannot be represented as JSON turns the response into an
    /// error describing why.
    pub fn ok<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self {
                outcome: Outcome::Data(data),
            },
            Err(e) => {
                warn!("Failed to encode response: {}", e);
                Self::error(format!("failed to encode response: {}", e))
            }
        }
    }

    /// Failed result carrying `err`'s message.
    pub fn error(err: impl fmt::Display) -> Self {
        Self {
            outcome: Outcome::Error(err.to_string()),
        }
    }

    pub fn status(&self) -> Status {
        match self.outcome {
            Outcome::Data(_) => Status::OK,
            Outcome::Error(_) => Status::ERROR,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status().is_ok()
    }

    pub fn into_envelope(self) -> ResultEnvelope {
        match self.outcome {
            Outcome::Data(data) => ResultEnvelope::ok(data),
            Outcome::Error(message) => ResultEnvelope::error(message),
        }
    }
}

impl From<crate::RpcError> for Response {
    fn from(err: crate::RpcError) -> Self {
        Response::error(err)
    }
}

/// Build an error [`Response`] from a format string.
///
/// ```
/// let res = httprpc::errorf!("method {} not found", "missing");
/// assert!(!res.is_ok());
/// ```
#[macro_export]
macro_rules! errorf {
    ($($arg:tt)*) => {
        $crate::Response::error(format!($($arg)*))
    };
}
