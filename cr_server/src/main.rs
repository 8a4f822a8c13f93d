//! Card room server.
//!
//! Serves the session protocol over WebSockets behind an authenticating
//! gateway and archives finished sessions as JSON lines.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Error, anyhow};
use cardroom::session::SessionRegistry;
use cr_server::{
    api::{self, AppState},
    archive::JsonLinesArchive,
    config::ServerConfig,
    logging,
};
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Run the card room session server

USAGE:
  cr_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --archive    PATH        Finished session archive    [default: env ARCHIVE_PATH or data/games.jsonl]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  ARCHIVE_PATH             JSON lines file finished sessions are appended to
  DRAIN_TIMEOUT_SECS       Time running games get to finish on shutdown
  WS_OUTBOUND_CAPACITY     Messages queued per connection
  SUBMIT_TIMEOUT_MS        Bound on waiting for a session to answer
  TICK_INTERVAL_MS         Session timer resolution
  SESSION_RETENTION_SECS   How long finished sessions stay queryable
  SESSION_INBOX_CAPACITY   Requests queued per session
  MAX_SESSIONS             Upper bound on live sessions
  RUST_LOG                 Log filter
";

struct Args {
    bind: Option<SocketAddr>,
    archive: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        archive: pargs.opt_value_from_str("--archive")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.archive)?;
    config.validate()?;
    info!("Starting card room server at {}", config.bind);

    let archive = JsonLinesArchive::open(&config.archive_path)
        .await
        .with_context(|| format!("Failed to open archive {}", config.archive_path.display()))?;

    let registry = SessionRegistry::new(config.registry.clone(), Arc::new(archive))
        .map_err(|e| anyhow!("Failed to start session registry: {}", e))?;
    let registry = Arc::new(registry);

    let (state, closing) = AppState::new(registry.clone(), config.outbound_capacity);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    let drain_timeout = config.drain_timeout();
    let draining = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Draining sessions for up to {:?}...", drain_timeout);
            let report = draining.shutdown(drain_timeout).await;
            info!(
                "Drained {} sessions, {} archived",
                report.sessions, report.archived
            );
            let _ = closing.send(true);
        })
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C, shutting down: {}", e);
    }
}
