//! Blynk device client entry point.
//!
//! Loads the configuration, connects to the Blynk server, and calls
//! `BlynkClient::step` on a fixed interval until Ctrl+C.  The handlers
//! registered here only log what they see and answer reads of V0 with the
//! process uptime; a real device would register its own.
//!
//! # Usage
//!
//! ```text
//! blynk-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: platform config dir]
//!   --token <TOKEN>        Device auth token [env: BLYNK_AUTH_TOKEN]
//!   --server <HOST>        Server host name
//!   --port <PORT>          Server TCP port
//!   --heartbeat <SECS>     Heartbeat period in seconds
//!   --log-level <FILTER>   tracing filter, e.g. "debug"
//! ```
//!
//! Command-line values override the config file.  `RUST_LOG`, when set,
//! overrides both for the log filter.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blynk_client::infrastructure::storage::config::{load_config, AppConfig};
use blynk_client::infrastructure::transport::tcp::TcpTransport;
use blynk_client::BlynkClient;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Poll-driven Blynk device client.
#[derive(Debug, Parser)]
#[command(name = "blynk-client", about = "Blynk IoT device client", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device auth token.
    #[arg(long, env = "BLYNK_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Blynk server host name or IP address.
    #[arg(long)]
    server: Option<String>,

    /// Blynk server TCP port.
    #[arg(long)]
    port: Option<u16>,

    /// Heartbeat period in seconds.
    #[arg(long)]
    heartbeat: Option<u64>,

    /// `tracing` filter directive.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(token) = self.token {
            config.auth_token = token;
        }
        if let Some(host) = self.server {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(secs) = self.heartbeat {
            config.timing.heartbeat_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let app_config = cli.apply(file_config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&app_config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client_config = app_config.to_client_config().context("invalid configuration")?;
    info!(
        "Blynk client starting: server={}:{}, heartbeat={:?}",
        client_config.host, client_config.port, client_config.heartbeat
    );

    let transport = TcpTransport::new(app_config.timing.connect_timeout());
    let mut client = BlynkClient::new(client_config, transport);
    register_handlers(&mut client);

    // ── Embedding loop ────────────────────────────────────────────────────────
    //
    // `step()` only blocks while a connection attempt is in progress, for at
    // most `connect_timeout_secs` in total.  A Ctrl+C that arrives meanwhile
    // is picked up as soon as `step()` returns: the signal branch is polled
    // first on every iteration.
    let mut ticker = tokio::time::interval(app_config.timing.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("received Ctrl+C, shutting down"),
                    Err(e) => warn!("failed to listen for Ctrl+C signal: {e}"),
                }
                break;
            }
            _ = ticker.tick() => client.step(Instant::now()),
        }
    }

    client.disconnect(Instant::now());
    info!("Blynk client stopped");
    Ok(())
}

fn register_handlers(client: &mut BlynkClient<TcpTransport>) {
    let started = Instant::now();

    client.on_connected(|_| info!("connected to Blynk server"));
    client.on_disconnected(|| warn!("disconnected from Blynk server"));
    client.on_any_virtual_write(|pin, values, _| info!("V{pin} <- {values:?}"));
    client.on_virtual_read(0, move |_| Some(started.elapsed().as_secs().to_string()));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
