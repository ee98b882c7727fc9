//! Skill-sharing talk server - Entry Point
//!
//! Loads saved talks, starts the TalkServer actor and its persistence
//! sidecar, and serves the HTTP API until a shutdown signal arrives.

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skillshare_server::persistence::{load_talks, PersistHandle};
use skillshare_server::{handler, Config, ServerHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=skillshare_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("skillshare_server=info")),
        )
        .init();

    let config = Config::parse();
    info!("Talks file: {}", config.talks_file.display());

    let store = load_talks(&config.talks_file).await;
    let persist = PersistHandle::spawn(config.talks_file.clone(), config.persist_policy());
    let server = ServerHandle::spawn(store, Some(persist));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Skill-sharing server listening on {}", addr);

    // Long polls are answered on the signal. The actor stops only after
    // axum has stopped accepting and finished every request.
    let actor = server.clone();
    handler::serve(listener, server.clone(), async move {
        shutdown_signal().await;
        if let Err(e) = actor.drain().await {
            error!("Failed to release long polls: {}", e);
        }
    })
    .await?;

    info!("Saving changes to file");
    if let Err(e) = server.shutdown().await {
        error!("Failed to stop TalkServer cleanly: {}", e);
    }

    info!("Goodbye.");
    Ok(())
}

/// Resolve on SIGINT, SIGTERM or SIGHUP
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(signal::unix::SignalKind::terminate());
    #[cfg(unix)]
    let hangup = unix_signal(signal::unix::SignalKind::hangup());

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = hangup => {}
    }
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind) {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Failed to install signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
