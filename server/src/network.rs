//! Rendezvous listener: the only socket clients know about before logging on

use crate::config::ServerConfig;
use crate::registry::{SessionRegistry, WorkerConfig};
use crate::session::SessionError;
use crate::wait::{wait_for_packets, WaitOutcome};
use log::{debug, error, info, warn};
use shared::{decode, Message, MAX_PACKET_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Owns the rendezvous socket and the session registry.
pub struct Server {
    socket: UdpSocket,
    registry: Arc<SessionRegistry>,
}

impl Server {
    /// Binds the rendezvous port and every session port.
    pub async fn bind(config: &ServerConfig) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind(SocketAddr::new(config.host, config.port)).await?;
        let local_addr = socket.local_addr()?;

        let registry = SessionRegistry::create(
            config.host,
            config.session_base_port(),
            config.max_users,
            WorkerConfig::from(config),
        )?;

        info!(
            "Server listening on {} with {} session slots",
            local_addr,
            registry.max_users()
        );

        Ok(Server {
            socket,
            registry: Arc::new(registry),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Runs the listener until [`Server::shutdown`] is called.
    ///
    /// A transport failure on the rendezvous socket is returned and should
    /// bring the whole server down.
    pub async fn run(&self) -> Result<(), SessionError> {
        let mut shutdown = self.registry.shutdown_signal();
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        info!("Server started successfully");

        loop {
            match wait_for_packets(&self.socket, &mut shutdown, None).await? {
                WaitOutcome::Ready => self.drain(&mut buffer).await?,
                WaitOutcome::Cancelled => break,
                WaitOutcome::TimedOut => {}
            }
        }

        info!("Listener stopped");
        Ok(())
    }

    async fn drain(&self, buffer: &mut [u8]) -> Result<(), SessionError> {
        loop {
            if self.registry.is_shutting_down() {
                return Ok(());
            }

            let (len, addr) = match self.socket.try_recv_from(buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    error!("Rendezvous socket failed: {}", e);
                    return Err(e.into());
                }
            };

            match decode(&buffer[..len]) {
                Ok(Message::Logon) => self.handle_logon(addr).await,
                Ok(other) => debug!("Ignoring {} from {} on rendezvous port", other.kind(), addr),
                Err(e) => debug!("Ignoring bad datagram from {}: {}", addr, e),
            }
        }
    }

    async fn handle_logon(&self, addr: SocketAddr) {
        match self.registry.logon(addr).await {
            Ok(_) => {}
            Err(SessionError::Full) => warn!("Dropping logon from {}: server full", addr),
            Err(SessionError::AlreadyConnected(_, id)) => {
                debug!("Repeat logon from {} already served by session {}", addr, id)
            }
            Err(SessionError::ShuttingDown) => debug!("Dropping logon from {}: shutting down", addr),
            Err(e) => error!("Could not log on {}: {}", addr, e),
        }
    }

    /// Stops the listener and every session worker, waiting for all of them.
    pub async fn shutdown(&self) {
        info!("Server shutting down");
        self.registry.shutdown().await;
    }
}
