use clap::Parser;
use client::network::{bot_names, run_bot, BotExit};
use log::{error, info};
use shared::DEFAULT_PORT;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs one or more bots against a boss arena server", long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bot name; numbered when more than one bot runs
    #[arg(short, long, default_value = "TestBot")]
    name: String,

    /// Number of bots to run
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Base seed for bot personalities
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    info!("Starting {} bot(s) against {}", args.count, addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping bots");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut handles = Vec::new();
    for (i, name) in bot_names(&args.name, args.count).into_iter().enumerate() {
        let addr = addr.clone();
        let shutdown = shutdown_rx.clone();
        let seed = args.seed.wrapping_add(i as u64);
        handles.push(tokio::spawn(async move {
            let result = run_bot(&addr, &name, seed, shutdown).await;
            (name, result)
        }));
        // Stagger joins so a swarm does not arrive in a single tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for handle in handles {
        report(handle.await);
    }
    Ok(())
}

fn report(
    result: Result<(String, Result<BotExit, client::network::BoxError>), tokio::task::JoinError>,
) {
    match result {
        Ok((name, Ok(BotExit::Stopped))) => info!("Bot {} stopped", name),
        Ok((name, Ok(BotExit::Disconnected(reason)))) => {
            info!("Bot {} was disconnected: {}", name, reason)
        }
        Ok((name, Err(e))) => error!("Bot {} failed: {}", name, e),
        Err(e) => error!("Bot task panicked: {}", e),
    }
}
