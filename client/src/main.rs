use clap::Parser;
use client::controller::{Activity, UpdatePolicy};
use client::network::{Client, ClientError, ClientOptions, Connection, HANDSHAKE_TIMEOUT};
use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rendezvous address of the server
    #[arg(short = 's', long, default_value = "127.0.0.1:27192")]
    server: SocketAddr,

    /// Milliseconds per frame
    #[arg(short, long, default_value = "16")]
    frame_ms: u64,

    /// Log off after this many seconds instead of running until Ctrl+C
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Report at the idle rate, as a backgrounded client would
    #[arg(long)]
    idle: bool,

    /// Seed for the scripted movement
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let connection = match Connection::connect(args.server, HANDSHAKE_TIMEOUT).await {
        Ok(connection) => connection,
        Err(e @ ClientError::HandshakeTimeout { .. }) => {
            error!("Server down or full: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let options = ClientOptions {
        frame: Duration::from_millis(args.frame_ms.max(1)),
        policy: UpdatePolicy::default(),
        activity: if args.idle {
            Activity::Idle
        } else {
            Activity::Active
        },
        seed: args.seed,
    };

    Client::new(connection, options)
        .run(args.duration_secs.map(Duration::from_secs))
        .await?;

    info!("Client finished");
    Ok(())
}
