//! HTTP server: dispatches call envelopes to registered handlers.
//!
//! # Lifecycle
//!
//! `Configuring` (handlers registered on a [`Registry`]) -> `Listening`
//! ([`Server::listen`]) -> `ShuttingDown` ([`ServerHandle::shutdown`]) ->
//! `Stopped`. Each exchange runs on its own task; there is no ordering between
//! exchanges. Handler tasks are tracked, so none of them outlives `Stopped`.

use crate::cancel::CancellationToken;
use crate::config::{ProtocolConfig, ServerConfig, ServerOptions};
use crate::envelope::{decode_call, encode_result};
use crate::errorf;
use crate::registry::{HandlerMap, Registry};
use crate::request::Request;
use crate::response::Response;
use crate::{Result, RpcError};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{CONTENT_TYPE, SERVER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::DropGuard;
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Handlers being registered; not yet bound.
    Configuring,
    /// Accepting exchanges.
    Listening,
    /// No new exchanges; in-flight ones get the grace period.
    ShuttingDown,
    Stopped,
}

/// A configured server that has not started listening yet.
pub struct Server {
    name: String,
    handlers: Arc<HandlerMap>,
    options: ServerOptions,
}

impl Server {
    /// Seal `registry` into a server identified by `name`.
    pub fn new(name: &str, registry: Registry) -> Result<Self> {
        Self::with_options(name, registry, ServerOptions::default())
    }

    pub fn with_options(name: &str, registry: Registry, options: ServerOptions) -> Result<Self> {
        // The name goes out as a header on every exchange.
        HeaderValue::from_str(name).map_err(|_| {
            RpcError::configuration(format!("invalid server name {:?}", name))
        })?;

        Ok(Self {
            name: name.to_string(),
            handlers: registry.seal(),
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the axum router without binding, for hosts that own the
    /// listener themselves.
    pub fn into_router(self) -> Router {
        let dispatcher = Dispatcher::new(
            &self.name,
            self.handlers,
            CancellationToken::new(),
            TaskTracker::new(),
        );
        build_router(dispatcher, self.options.max_body_bytes)
    }

    /// Bind `addr` and start serving in the background.
    ///
    /// Returns once the listener is bound; port 0 picks a free port, see
    /// [`ServerHandle::addr`].
    pub async fn listen<A: ToSocketAddrs>(self, addr: A) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let force = CancellationToken::new();
        let tasks = TaskTracker::new();
        let dispatcher = Dispatcher::new(&self.name, self.handlers, force.clone(), tasks.clone());
        let app = build_router(dispatcher, self.options.max_body_bytes);

        let state = Arc::new(watch::Sender::new(ServerState::Listening));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!("Server {} listening on {}", self.name, local_addr);

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
            task_state.send_replace(ServerState::Stopped);
        });

        Ok(ServerHandle {
            addr: local_addr,
            grace: self.options.shutdown_grace,
            state,
            force,
            tasks,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task),
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("methods", &self.handlers.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Handle to a running server. Dropping it aborts the server without waiting.
pub struct ServerHandle {
    addr: SocketAddr,
    grace: Duration,
    state: Arc<watch::Sender<ServerState>>,
    force: CancellationToken,
    tasks: TaskTracker,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the server reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ServerState::Stopped).await;
    }

    /// Shut down, giving in-flight exchanges up to the grace period.
    ///
    /// Stops accepting new exchanges right away. Exchanges and handler tasks
    /// still running when the grace period ends are answered with an error
    /// and aborted. Never fails; a forced shutdown is only logged. Calling it
    /// again is a no-op.
    pub async fn shutdown(&mut self) {
        let Some(mut task) = self.task_handle.take() else {
            return;
        };

        self.state.send_replace(ServerState::ShuttingDown);
        info!("Server on {} shutting down", self.addr);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        self.tasks.close();
        let tasks = &self.tasks;
        let drained = tokio::time::timeout(self.grace, async {
            let _ = (&mut task).await;
            tasks.wait().await;
        })
        .await;

        match drained {
            Ok(()) => info!("Server on {} stopped", self.addr),
            Err(_) => {
                warn!(
                    "Failed to shutdown gracefully within {:?}, forcing",
                    self.grace
                );
                self.force.cancel();
                task.abort();
                let _ = task.await;
                // Every remaining handler has been aborted by now.
                self.tasks.wait().await;
            }
        }

        self.state.send_replace(ServerState::Stopped);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            self.force.cancel();
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .finish()
    }
}

fn build_router(dispatcher: Dispatcher, max_body_bytes: usize) -> Router {
    Router::new()
        .fallback(handle_exchange)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(Arc::new(dispatcher))
}

/// Per-server dispatch state shared by every exchange.
struct Dispatcher {
    name: HeaderValue,
    handlers: Arc<HandlerMap>,
    /// Fired when shutdown gives up waiting.
    force: CancellationToken,
    /// Every handler task, so shutdown can wait for them.
    tasks: TaskTracker,
}

impl Dispatcher {
    fn new(
        name: &str,
        handlers: Arc<HandlerMap>,
        force: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        let name = HeaderValue::from_str(name)
            .unwrap_or_else(|_| HeaderValue::from_static(ServerConfig::DEFAULT_NAME));
        Self {
            name,
            handlers,
            force,
            tasks,
        }
    }

    async fn dispatch(&self, headers: HeaderMap, body: &[u8]) -> Response {
        let envelope = match decode_call(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Rejecting call: {}", e);
                return errorf!("failed to parse request: {}", e);
            }
        };

        let Some(handler) = self.handlers.get(&envelope.method).cloned() else {
            warn!("Unknown method: {}", envelope.method);
            return RpcError::UnknownMethod {
                method: envelope.method,
            }
            .into();
        };

        let method = envelope.method.clone();
        debug!("RPC call: {}", method);

        let cancel = CancellationToken::new();
        let request = Request::new(envelope)
            .with_headers(headers)
            .with_cancellation(cancel.clone());

        let mut task = self
            .tasks
            .spawn(async move { handler.call(request).await });
        let guard = AbandonOnDrop {
            cancel: Some(cancel.drop_guard()),
            handler: task.abort_handle(),
        };

        let response = tokio::select! {
            joined = &mut task => match joined {
                Ok(response) => response,
                Err(e) if e.is_panic() => {
                    error!("Handler for {} panicked", method);
                    errorf!("handler for method {} panicked", method)
                }
                Err(e) => errorf!("handler for method {} failed: {}", method, e),
            },
            _ = self.force.cancelled() => {
                warn!("Abandoning in-flight call to {}", method);
                cancel.cancel();
                task.abort();
                errorf!("server shutting down")
            }
        };

        guard.disarm();
        response
    }

    fn write(&self, response: Response) -> axum::response::Response {
        let status = StatusCode::from_u16(response.status().0)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match encode_result(&response.into_envelope()) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to write result: {}", e);
                br#"{"status":500,"error":"failed to encode result"}"#.to_vec()
            }
        };

        (
            status,
            [
                (
                    CONTENT_TYPE,
                    HeaderValue::from_static(ProtocolConfig::CONTENT_TYPE),
                ),
                (SERVER, self.name.clone()),
            ],
            body,
        )
            .into_response()
    }
}

/// Cancels the request token and aborts the handler task when the exchange
/// is dropped (caller gone, or server aborted) before the handler finishes.
struct AbandonOnDrop {
    cancel: Option<DropGuard>,
    handler: AbortHandle,
}

impl AbandonOnDrop {
    fn disarm(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.disarm();
        }
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            drop(cancel);
            self.handler.abort();
        }
    }
}

async fn handle_exchange(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let response = match body {
        Ok(body) => dispatcher.dispatch(headers, &body).await,
        Err(rejection) => {
            warn!("Failed to read request body: {}", rejection);
            errorf!("failed to read request: {}", rejection)
        }
    };
    dispatcher.write(response)
}
