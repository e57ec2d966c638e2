//! Inbound call as seen by a handler.

use crate::cancel::CancellationToken;
use crate::envelope::CallEnvelope;
use crate::Result;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One decoded call plus the metadata of the exchange that carried it.
#[derive(Debug, Clone)]
pub struct Request {
    envelope: CallEnvelope,
    headers: HeaderMap,
    cancel: CancellationToken,
}

impl Request {
    /// Wrap a decoded envelope. The server fills in headers and a token tied
    /// to the exchange; tests can build one directly.
    pub fn new(envelope: CallEnvelope) -> Self {
        Self {
            envelope,
            headers: HeaderMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn method(&self) -> &str {
        &self.envelope.method
    }

    /// Raw payload.
    pub fn data(&self) -> &Value {
        &self.envelope.data
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.envelope.signature.as_deref()
    }

    /// Deserialize the payload into `T`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.envelope.data)?)
    }

    /// Header value by case-insensitive name. Values that are not visible
    /// ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Fires when the exchange is abandoned: the caller went away or the
    /// server forced shutdown.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
