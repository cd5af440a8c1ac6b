use clap::Parser;
use log::{error, info, warn};
use server::net::{self, TlsPolicy};
use server::registry::{SessionRegistry, SharedRegistry};
use server::{sim, tls};
use shared::{DEFAULT_MAX_PLAYERS, DEFAULT_PORT};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

/// Authoritative game server for the snake arena.
#[derive(Parser, Debug)]
#[command(name = "funsnakes-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of concurrent players
    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Serve plaintext only (no certificate is loaded or generated)
    #[arg(long)]
    no_tls: bool,

    /// With TLS enabled, also accept clients that connect without it
    #[arg(long)]
    allow_plain: bool,

    /// Certificate path (generated if missing)
    #[arg(long, default_value = "server.crt")]
    cert: PathBuf,

    /// Private key path (generated if missing)
    #[arg(long, default_value = "server.key")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let policy = if args.no_tls {
        TlsPolicy::disabled()
    } else {
        let acceptor = tls::build_acceptor(&args.cert, &args.key)?;
        if args.allow_plain {
            TlsPolicy::with_fallback(acceptor)
        } else {
            TlsPolicy::required(acceptor)
        }
    };

    let registry: SharedRegistry = Arc::new(RwLock::new(SessionRegistry::new(args.max_players)));
    let (command_tx, command_rx) = mpsc::channel(64);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Listening on {} (tls: {}, max players: {})",
        addr,
        policy.is_enabled(),
        args.max_players
    );

    let simulation = tokio::spawn(sim::run(registry.clone(), command_rx));
    let acceptor = tokio::spawn(net::run(listener, registry, command_tx, policy));

    tokio::select! {
        _ = simulation => warn!("Simulation loop exited"),
        result = acceptor => {
            if let Ok(Err(e)) = result {
                error!("Accept loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
    }

    Ok(())
}
