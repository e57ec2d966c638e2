//! HTTP client for calling methods on an httprpc server.
//!
//! Each call is one POST: encode the call envelope, send it, decode the
//! result envelope. No retries and no caching; the caller owns retry policy.

use crate::cancel::CancellationToken;
use crate::config::ProtocolConfig;
use crate::envelope::{decode_result, encode_call_signed};
use crate::{Result, RpcError};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Client bound to one server address.
///
/// Holds no per-call state; cloning is cheap and clones share the underlying
/// connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    http: reqwest::Client,
}

impl Client {
    /// Client for the server at `addr`, e.g. `http://127.0.0.1:8080`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_http_client(addr, reqwest::Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (TLS roots, proxies, timeouts).
    pub fn with_http_client(addr: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            addr: addr.into(),
            http,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Call `method` with `request` and decode the result as `T`.
    ///
    /// A non-OK answer comes back as [`RpcError::Remote`] with the server's
    /// message unchanged.
    pub async fn call<Req, T>(&self, method: &str, request: &Req) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.exchange(method, request, None).await
    }

    /// Like [`call`](Self::call), attaching an opaque signature to the
    /// envelope.
    pub async fn call_signed<Req, T>(
        &self,
        method: &str,
        request: &Req,
        signature: Vec<u8>,
    ) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.exchange(method, request, Some(signature)).await
    }

    /// Like [`call`](Self::call), but gives up as soon as `cancel` fires.
    ///
    /// The in-flight exchange is dropped and [`RpcError::Cancelled`] is
    /// returned; no partial result is ever produced.
    pub async fn call_with_cancel<Req, T>(
        &self,
        cancel: &CancellationToken,
        method: &str,
        request: &Req,
    ) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        cancel.check()?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("RPC call {} cancelled", method);
                Err(RpcError::Cancelled)
            }
            result = self.exchange(method, request, None) => result,
        }
    }

    async fn exchange<Req, T>(
        &self,
        method: &str,
        request: &Req,
        signature: Option<Vec<u8>>,
    ) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_call_signed(method, request, signature)?;

        debug!("RPC call {} -> {}", method, self.addr);

        let response = self
            .http
            .post(&self.addr)
            .header(CONTENT_TYPE, ProtocolConfig::CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let bytes = response.bytes().await?;

        let data = decode_result(&bytes)?.into_result()?;
        Ok(serde_json::from_value(data)?)
    }
}
