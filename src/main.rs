//! wss-handshake-tunnel server.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client (WebSocket)                                          Backend
//!   ──────────────────▶ ┌──────────┐   ┌──────────────────┐   ┌─────────┐
//!   GET + Upgrade +     │   http   │──▶│    handshake     │──▶│ connect │──▶ TCP dial
//!   X-Connect-Host      │  server  │   │ (rewrite + 101)  │   │ handler │
//!   ◀────────────────── └──────────┘   └──────────────────┘   └─────────┘
//!   101 + raw bytes  ◀══════════════ hijacked connection ═════════════▶ raw bytes
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use wss_handshake_tunnel::config::{load_config, validation::validate_config, ConfigError};
use wss_handshake_tunnel::lifecycle::signals::spawn_signal_listener;
use wss_handshake_tunnel::observability::logging;
use wss_handshake_tunnel::{HttpServer, Shutdown, TunnelConfig};

#[derive(Parser)]
#[command(name = "wss-handshake-tunnel")]
#[command(about = "Bridge WebSocket upgrades onto CONNECT tunnels", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TunnelConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability);

    tracing::info!("wss-handshake-tunnel v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        handshake = config.handshake.enabled,
        accept_alphabet = ?config.handshake.accept_alphabet,
        connect_timeout_secs = config.timeouts.connect_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
