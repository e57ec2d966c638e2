//! Method registry.
//!
//! Handlers are registered on an owned `Registry` through `&mut self`, then
//! the registry is moved into [`Server::new`](crate::Server::new), which
//! freezes it behind an `Arc`. Dispatch never takes a lock.

use crate::request::Request;
use crate::response::Response;
use crate::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Server-side function bound to one method name.
///
/// Implemented for any `Fn(Request) -> impl Future<Output = Response>`.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: Request) -> Response;
}

#[async_trait::async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn call(&self, req: Request) -> Response {
        (self)(req).await
    }
}

pub(crate) type HandlerMap = HashMap<String, Arc<dyn Handler>>;

/// Method name to handler mapping, write-once per name.
#[derive(Default)]
pub struct Registry {
    handlers: HandlerMap,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`.
    ///
    /// Fails with [`RpcError::Configuration`] if the name is empty or
    /// already taken; the existing registration is left untouched.
    pub fn handle<H: Handler>(&mut self, method: &str, handler: H) -> Result<&mut Self> {
        if method.is_empty() {
            return Err(RpcError::configuration("method name must not be empty"));
        }
        if self.handlers.contains_key(method) {
            return Err(RpcError::configuration(format!(
                "handler {} already exists",
                method
            )));
        }
        self.handlers.insert(method.to_string(), Arc::new(handler));
        Ok(self)
    }

    /// Register a handler with typed input and output.
    ///
    /// The payload is bound to `Req` before `f` runs; a payload that does not
    /// fit answers with an error and `f` is never called. `Ok` becomes an OK
    /// result, `Err(e)` an error result carrying `e`'s message.
    pub fn handle_typed<Req, Res, E, F, Fut>(&mut self, method: &str, f: F) -> Result<&mut Self>
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + 'static,
        E: fmt::Display + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Res, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.handle(method, move |req: Request| {
            let f = f.clone();
            async move {
                let input: Req = match req.bind() {
                    Ok(input) => input,
                    Err(e) => return Response::error(e),
                };
                match (*f)(input).await {
                    Ok(output) => Response::ok(&output),
                    Err(e) => Response::error(e),
                }
            }
        })
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn seal(self) -> Arc<HandlerMap> {
        Arc::new(self.handlers)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CallEnvelope;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn ping(_req: Request) -> Response {
        Response::ok("pong")
    }

    async fn pong(_req: Request) -> Response {
        Response::ok("ping")
    }

    fn call_envelope(method: &str, data: Value) -> Request {
        Request::new(CallEnvelope::new(method, data))
    }

    #[test]
    fn test_duplicate_registration_is_configuration_error() {
        let mut registry = Registry::new();
        registry.handle("ping", ping).unwrap();

        let err = registry.handle("ping", pong).unwrap_err();
        assert!(matches!(err, RpcError::Configuration { .. }));
        assert!(err.to_string().contains("ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_detected_in_any_order() {
        for order in [["a", "b", "a"], ["b", "a", "a"], ["a", "a", "b"]] {
            let mut registry = Registry::new();
            let results: Vec<bool> = order
                .iter()
                .map(|m| registry.handle(m, ping).is_ok())
                .collect();
            assert_eq!(results.iter().filter(|ok| !**ok).count(), 1);
            assert_eq!(registry.methods(), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_empty_method_rejected() {
        let mut registry = Registry::new();
        let err = registry.handle("", ping).unwrap_err();
        assert!(matches!(err, RpcError::Configuration { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_chained_registration() {
        let mut registry = Registry::new();
        registry
            .handle("ping", ping)
            .and_then(|r| r.handle("pong", pong))
            .unwrap();
        assert!(registry.contains("ping"));
        assert!(registry.contains("pong"));
        assert!(!registry.contains("missing"));
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let mut registry = Registry::new();
        registry
            .handle("echo", |req: Request| async move { Response::ok(req.data()) })
            .unwrap();

        let handlers = registry.seal();
        let res = handlers["echo"]
            .call(call_envelope("echo", json!({"x": 1})))
            .await;
        assert_eq!(res, Response::ok(&json!({"x": 1})));
    }

    #[derive(Debug, Deserialize)]
    struct Add {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn test_typed_handler() {
        let mut registry = Registry::new();
        registry
            .handle_typed("add", |args: Add| async move {
                Ok::<_, RpcError>(args.a + args.b)
            })
            .unwrap();

        let handlers = registry.seal();
        let res = handlers["add"]
            .call(call_envelope("add", json!({"a": 3, "b": 4})))
            .await;
        assert_eq!(res, Response::ok(&7));
    }

    #[tokio::test]
    async fn test_typed_handler_error_passes_message() {
        let mut registry = Registry::new();
        registry
            .handle_typed("boom", |_: Value| async move { Err::<(), _>("bad input") })
            .unwrap();

        let handlers = registry.seal();
        let res = handlers["boom"].call(call_envelope("boom", Value::Null)).await;
        assert_eq!(res.into_envelope().error_message(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_typed_handler_bind_failure_skips_function() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut registry = Registry::new();
        registry
            .handle_typed("add", move |args: Add| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, RpcError>(args.a + args.b) }
            })
            .unwrap();

        let handlers = registry.seal();
        let res = handlers["add"]
            .call(call_envelope("add", json!({"a": "three"})))
            .await;

        assert!(!res.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_lists_methods() {
        let mut registry = Registry::new();
        registry.handle("ping", ping).unwrap();
        assert_eq!(format!("{:?}", registry), "Registry { methods: [\"ping\"] }");
    }
}
