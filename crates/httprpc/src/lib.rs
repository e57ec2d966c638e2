//! httprpc - named-method RPC over HTTP with JSON envelopes.
//!
//! A client posts a call envelope (`method` + `data`), the server looks the
//! method up in its registry, runs the handler and answers with a result
//! envelope (`status` + `data` or `error`).
//!
//! # Example
//!
//! ```rust,no_run
//! use httprpc::{Client, Registry, Request, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> httprpc::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.handle("echo", |req: Request| async move { Response::ok(req.data()) })?;
//!
//!     let mut handle = Server::new("example", registry)?
//!         .listen("127.0.0.1:0")
//!         .await?;
//!
//!     let client = Client::new(format!("http://{}", handle.addr()));
//!     let reply: serde_json::Value = client.call("echo", &serde_json::json!({"x": 1})).await?;
//!     assert_eq!(reply["x"], 1);
//!
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use client::Client;
pub use config::ServerOptions;
pub use envelope::{CallEnvelope, ResultEnvelope, Status};
pub use error::{Result, RpcError};
pub use registry::{Handler, Registry};
pub use request::Request;
pub use response::Response;
pub use server::{Server, ServerHandle, ServerState};
