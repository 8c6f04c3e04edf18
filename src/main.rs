//! Embernet node binary
//!
//! Runs the peer-to-peer networking core: listens for inbound peers,
//! dials the configured bootstrap peers and keeps the peer set alive
//! until interrupted.

use clap::Parser;
use embernet::network::{NodeConfig, PeerRegistry};
use embernet::storage::MemDatabase;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "embernet")]
#[command(version)]
#[command(about = "Peer-to-peer networking core for a blockchain node", long_about = None)]
struct Cli {
    /// Address to listen on for inbound peers
    #[arg(short, long, default_value = "0.0.0.0:30303")]
    listen: String,

    /// Peer address to dial on startup; may be given multiple times
    #[arg(short, long = "peer")]
    peers: Vec<String>,

    /// JSON config file; overrides the flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep running as an outbound-only client if the listen address
    /// cannot be bound
    #[arg(long)]
    client_fallback: bool,
}

fn load_config(cli: Cli) -> io::Result<NodeConfig> {
    if let Some(path) = cli.config {
        let file = File::open(path)?;
        return serde_json::from_reader(file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
    }

    Ok(NodeConfig {
        listen_addr: cli.listen,
        bootstrap_peers: cli.peers,
        client_fallback: cli.client_fallback,
    })
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = load_config(Cli::parse())?;
    let registry = PeerRegistry::new(config, Arc::new(MemDatabase::new()), Vec::new());
    registry.start().await?;

    let shutdown_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, shutting down");
            shutdown_registry.stop().await;
        }
    });

    registry.wait_for_shutdown().await;
    Ok(())
}
