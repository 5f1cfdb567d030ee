//! Poker score room server.
//!
//! Hosts the room hub, the inactivity watcher and the WebSocket bridge over
//! a PostgreSQL or in-memory ledger store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use poker_score::{
    LedgerStore, MemoryLedgerStore, PgLedgerStore,
    db::Database,
    hub::RoomHub,
};
use ps_server::{
    api,
    config::{ServerConfig, StoreBackend},
    logging,
};

const HELP: &str = "\
Run the poker score room server

USAGE:
  ps_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --store      BACKEND     postgres or memory          [default: env STORE_BACKEND or postgres]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  STORE_BACKEND            postgres | memory
  ROOM_INACTIVITY_HOURS    Idle hours before a room is auto-settled [default: 12]
  HUB_CONNECTION_BUFFER    Outbound frames buffered per socket [default: 64]
  DB_*, ROOM_*, HUB_*      Pool, lifecycle and hub tuning; a .env file is loaded if present
";

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

    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let store: Option<StoreBackend> = pargs.opt_value_from_str("--store")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url, store)?;
    config.validate()?;

    info!("Starting poker score server at {} ({} store)", config.bind, config.store);

    let store: Arc<dyn LedgerStore> = match config.store {
        StoreBackend::Postgres => {
            let db = Database::new(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

            let started = Instant::now();
            db.migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            logging::log_performance(
                "migrate",
                started.elapsed().as_millis() as u64,
                Some("poker_score schema"),
            );

            info!("Database connected successfully");
            Arc::new(PgLedgerStore::new(db.pool().clone()))
        }
        StoreBackend::Memory => {
            info!("Using in-memory ledger store; state is lost on exit");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let hub = RoomHub::spawn(&config.hub);
    let state = api::AppState::new(
        store,
        hub,
        config.lifecycle.clone(),
        config.hub.connection_buffer,
    );

    let watcher = state.rooms.clone().spawn_inactivity_watcher();

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    watcher.abort();

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
