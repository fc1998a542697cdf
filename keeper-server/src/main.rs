//! Keeper sync server
//!
//! Stores every account's records as opaque ciphertext and hands each
//! device the changes it has not seen yet.

use clap::Parser;
use keeper_server::{build_router, cleanup, AppState, ServerConfig, ServerStorage};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keeper-server", about = "Keeper secrets sync server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "keeper-server.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Token signing secret override
    #[arg(long, env = "KEEPER_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }
    if let Some(secret) = cli.jwt_secret {
        cfg.jwt_secret = Some(secret);
    }

    tracing::info!("Starting keeper server on {}", cfg.listen_addr);

    let storage = ServerStorage::open(&cfg.storage_path)?;
    cleanup::spawn_cleanup_task(storage.clone(), cfg.cleanup_interval_secs);

    let app = build_router(AppState::new(storage, &cfg), &cfg);
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
