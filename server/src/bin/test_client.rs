use clap::Parser;
use shared::{decode, encode, LocomotionState, Message, PlayerUpdate, Vec3, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Logs on to a running server, walks in a straight line for a few updates,
/// prints whatever the server relays back and logs off.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rendezvous address of the server
    #[arg(short, long, default_value = "127.0.0.1:27192")]
    server: SocketAddr,

    /// Number of updates to send
    #[arg(short, long, default_value = "10")]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Sending logon to {}", args.server);
    socket.send_to(&encode(&Message::Logon)?, args.server).await?;

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let (len, session_addr) = match timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await {
        Ok(received) => received?,
        Err(_) => {
            println!("No reply within 3s: server down or full");
            return Ok(());
        }
    };
    println!(
        "Reply {:?} from session port {}",
        decode(&buf[..len]),
        session_addr
    );
    socket.connect(session_addr).await?;

    for i in 0..args.count {
        let update = PlayerUpdate {
            player_id: 0,
            velocity: Vec3::new(0.0, 0.0, 1.0),
            position: Vec3::new(0.0, 0.0, i as f32 * 0.1),
            state: LocomotionState::Walk,
            yaw: 0.0,
        };
        socket.send(&encode(&Message::UpdatePlayer(update))?).await?;

        // Print anything other players sent in the meantime
        while let Ok(len) = socket.try_recv(&mut buf) {
            match decode(&buf[..len]) {
                Ok(message) => println!("  Received {:?}", message),
                Err(e) => println!("  Undecodable datagram: {}", e),
            }
        }

        sleep(Duration::from_millis(100)).await;
    }

    println!("Sending logoff");
    socket.send(&encode(&Message::Logoff)?).await?;

    println!("Test client finished");
    Ok(())
}
