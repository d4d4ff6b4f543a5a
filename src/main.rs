//! # chatline
//!
//! Chat server binary: loads settings, opens the message database and
//! serves the WebSocket and HTTP endpoints until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chatline_core::UserId;
use chatline_server::auth::{JwtIssuer, JwtVerifier};
use chatline_server::config::ServerConfig;
use chatline_server::server::ChatServer;
use chatline_settings::{ChatlineSettings, LogFormat};
use chatline_store::Database;
use chatline_telemetry::{init_telemetry, TelemetryConfig};

/// Real-time chat server.
#[derive(Parser, Debug)]
#[command(name = "chatline", about = "Real-time chat server", version)]
struct Cli {
    /// Settings file (default `~/.chatline/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default).
    Serve,
    /// Print an access token for a user, signed with the configured secret.
    Token {
        /// User id to put in the token subject.
        #[arg(long)]
        user: i64,
        /// Token lifetime in seconds (defaults to `auth.token_ttl_secs`).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(chatline_settings::settings_path);
    let mut settings = chatline_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    apply_cli_overrides(&mut settings, &cli);

    let _ = init_telemetry(&TelemetryConfig::from_strings(
        &settings.logging.level,
        &settings.logging.module_levels,
        settings.logging.format == LogFormat::Json,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Token { user, ttl_secs } => {
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(settings.auth.token_ttl_secs));
            let token = JwtIssuer::new(&settings.auth.jwt_secret, ttl)
                .issue(UserId::new(user))
                .context("Failed to sign token")?;
            println!("{token}");
            Ok(())
        }
    }
}

fn apply_cli_overrides(settings: &mut ChatlineSettings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(db) = &cli.db {
        settings.storage.database_path.clone_from(db);
    }
}

fn server_config(settings: &ChatlineSettings) -> ServerConfig {
    let s = &settings.server;
    ServerConfig {
        host: s.host.clone(),
        port: s.port,
        max_connections: s.max_connections,
        send_queue_capacity: s.send_queue_capacity,
        max_message_size: s.max_message_size,
        ping_interval: Duration::from_secs(s.ping_interval_secs),
        idle_timeout: s.idle_timeout_secs.map(Duration::from_secs),
        shutdown_timeout: Duration::from_secs(s.shutdown_timeout_secs),
    }
}

async fn serve(settings: ChatlineSettings) -> Result<()> {
    tracing::info!("Starting chatline server");

    let db_path = &settings.storage.database_path;
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "Database opened");

    if settings.auth.jwt_secret == chatline_settings::AuthSettings::default().jwt_secret {
        tracing::warn!("auth.jwt_secret is the built-in default; set CHATLINE_JWT_SECRET");
    }
    let verifier = Arc::new(JwtVerifier::new(
        &settings.auth.jwt_secret,
        Duration::from_secs(settings.auth.leeway_secs),
    ));

    let config = server_config(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let mut server = ChatServer::new(config, db, verifier);
    match chatline_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let (addr, mut handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "chatline server ready");

    let server_exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl+c")?;
            tracing::info!("Shutting down");
            false
        }
        _ = &mut handle => {
            tracing::warn!("Server task exited unexpectedly");
            true
        }
    };

    let handles = if server_exited { Vec::new() } else { vec![handle] };
    server
        .shutdown()
        .graceful_shutdown(server.registry(), handles, shutdown_timeout)
        .await;
    Ok(())
}
