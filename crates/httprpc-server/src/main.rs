//! httprpc server host.
//!
//! Registers the built-in methods, listens, prints the bound port on stdout
//! and shuts down gracefully on Ctrl-C or SIGTERM.

mod methods;

use anyhow::Result;
use clap::Parser;
use httprpc::{Server, ServerOptions};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "httprpc-server")]
#[command(about = "JSON envelope RPC server over HTTP")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Name sent in the `server` header of every response
    #[arg(long, default_value = httprpc::config::ServerConfig::DEFAULT_NAME)]
    name: String,

    /// Seconds in-flight calls get to finish on shutdown
    #[arg(long, default_value = "5")]
    shutdown_grace_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting httprpc server");

    let options = ServerOptions::default()
        .with_shutdown_grace(Duration::from_secs(args.shutdown_grace_secs));
    let server = Server::with_options(&args.name, methods::registry()?, options)?;
    let mut handle = server.listen((args.host.as_str(), args.port)).await?;

    // Intentional stdout: parent processes read the port from this line.
    println!("RPC_PORT={}", handle.addr().port());

    shutdown_signal().await?;
    info!("Shutdown signal received");

    handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
