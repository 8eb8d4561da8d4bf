use clap::Parser;
use log::{error, info};
use server::config::{IdlePolicy, ServerConfig};
use server::network::Server;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the rendezvous and session sockets to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Rendezvous port clients send their logon to
    #[arg(short, long, default_value_t = shared::SERVER_PORT)]
    port: u16,

    /// Number of session slots
    #[arg(short, long, default_value_t = shared::MAX_USERS)]
    max_users: usize,

    /// Milliseconds a session may stay silent before it is reported as lagged
    #[arg(short, long, default_value = "5000")]
    wait_timeout_ms: u64,

    /// Log off sessions that stay silent for a whole wait timeout
    #[arg(long)]
    drop_idle: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_users: args.max_users,
        wait_timeout: Duration::from_millis(args.wait_timeout_ms),
        idle_policy: if args.drop_idle {
            IdlePolicy::Disconnect
        } else {
            IdlePolicy::Ignore
        },
        ..ServerConfig::default()
    };

    let server = Server::bind(&config).await?;

    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    };

    server.shutdown().await;

    if let Err(e) = result {
        error!("Listener failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
