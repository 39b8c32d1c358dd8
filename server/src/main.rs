use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use server::persistence::{JsonFileStore, ProgressStore};
use shared::{DEFAULT_PORT, TICK_RATE};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative boss arena server")]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Maximum number of sessions, bots included
    #[clap(short, long, default_value = "8")]
    max_players: usize,
    /// Bots to start with the server
    #[clap(short, long, default_value = "0")]
    bots: usize,
    /// Seconds of silence before a session is dropped
    #[clap(long, default_value = "5")]
    timeout_secs: f32,
    /// Ticks between full snapshots
    #[clap(long, default_value = "90")]
    snapshot_interval: u64,
    /// Starting level (defaults to the saved highest level)
    #[clap(short, long)]
    level: Option<u32>,
    /// Seed for boss attack selection
    #[clap(long, default_value = "0")]
    seed: u64,
    /// JSON file for coins and level progress
    #[clap(long)]
    save_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            max_players: self.max_players,
            bots: self.bots,
            timeout_ticks: (self.timeout_secs.max(0.0) * TICK_RATE as f32).ceil() as u64,
            snapshot_interval: self.snapshot_interval.max(1),
            level: self.level,
            seed: self.seed,
            save_file: self.save_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!(
        "Starting server on {} ({} Hz, timeout {:.1}s)",
        config.bind_addr(),
        TICK_RATE,
        config.timeout_secs()
    );

    let store = config.save_file.clone().map(|path| {
        let store = JsonFileStore::new(path);
        info!("Progress file: {}", store.path().display());
        Box::new(store) as Box<dyn ProgressStore>
    });

    let mut server = Server::new(config, store).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
