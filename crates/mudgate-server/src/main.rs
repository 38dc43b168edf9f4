//! mudgate gateway server.
//!
//! Authenticated browsers connect over WebSocket; the gateway opens one
//! upstream telnet session per user and relays text both ways under the
//! configured policy.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use mudgate_core::tracing_init::init_tracing;
use mudgate_core::Config;
use mudgate_server::http;
use mudgate_server::limiter::CommandLimiters;
use mudgate_server::metrics::GatewayMetrics;
use mudgate_server::session::{RegistryConfig, SessionRegistry};
use mudgate_server::state::AppState;
use mudgate_server::storage::GatewayDatabase;
use mudgate_vault::KeyRing;

#[derive(Parser, Debug)]
#[command(name = "mudgate")]
#[command(version, about = "Browser gateway for classic telnet MUD servers")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "MUDGATE_ADDR")]
    addr: SocketAddr,

    /// Path to the SQLite database file.
    #[arg(long, env = "MUDGATE_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Tracing comes up before config so config warnings are visible.
    let log_json = std::env::var("LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    init_tracing("mudgate=info", log_json);

    let mut cfg = Config::from_env().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting mudgate"
    );

    let db = match &args.db_path {
        Some(path) => GatewayDatabase::open(path).await?,
        None => GatewayDatabase::open(&default_db_path()?).await?,
    };

    let vault = Arc::new(
        KeyRing::new(std::mem::take(&mut cfg.encryption_keys))
            .context("failed to build key ring")?,
    );
    let metrics = Arc::new(GatewayMetrics::new());
    let registry = Arc::new(SessionRegistry::new(
        RegistryConfig::from_config(&cfg),
        Arc::clone(&metrics),
    ));
    let limiters = Arc::new(CommandLimiters::new(
        cfg.command_rate_per_sec,
        Duration::from_secs(1),
    ));

    let state = AppState {
        db,
        registry,
        vault,
        metrics,
        limiters,
        max_frame_bytes: cfg.max_frame_bytes,
        admin_metrics_secret: cfg.admin_metrics_secret.clone(),
    };

    let app = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".mudgate").join("gateway.db"))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal");
}
