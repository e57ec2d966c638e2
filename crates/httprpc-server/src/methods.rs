//! Built-in methods served by the host binary.

use httprpc::{Registry, Request, Response};

pub fn registry() -> httprpc::Result<Registry> {
    let mut registry = Registry::new();
    registry.handle("ping", ping)?.handle("echo", echo)?;
    Ok(registry)
}

async fn ping(_req: Request) -> Response {
    Response::ok("pong")
}

/// Returns the call payload unchanged.
async fn echo(req: Request) -> Response {
    Response::ok(req.data())
}
