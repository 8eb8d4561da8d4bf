//! One registry slot: a dedicated UDP port plus the per-connection state that
//! is rebuilt every time a client logs on to the slot.

use log::debug;
use shared::{EncodeError, PlayerId, MAX_PACKET_SIZE};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no free session slot")]
    Full,
    #[error("{0} already owns session {1}")]
    AlreadyConnected(SocketAddr, PlayerId),
    #[error("session {0} does not exist")]
    InvalidId(PlayerId),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("could not reserve a session port starting at {0}")]
    NoPortAvailable(u16),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connected,
}

/// State that only lives while a client holds the slot.
#[derive(Debug)]
struct Link {
    status: SessionStatus,
    peer: Option<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    worker: Option<JoinHandle<()>>,
}

/// A registry slot.
///
/// The port is bound once when the server starts and kept for the life of the
/// process. Each logon gets a fresh socket handle on that port, associated with
/// the client's address, and a fresh worker task.
#[derive(Debug)]
pub struct Session {
    id: PlayerId,
    reservation: std::net::UdpSocket,
    local_addr: SocketAddr,
    link: RwLock<Link>,
    disconnect: watch::Sender<bool>,
}

impl Session {
    /// Binds the slot's dedicated port.
    pub fn create(id: PlayerId, host: IpAddr, port: u16) -> io::Result<Self> {
        let reservation = std::net::UdpSocket::bind(SocketAddr::new(host, port))?;
        reservation.set_nonblocking(true)?;
        let local_addr = reservation.local_addr()?;
        let (disconnect, _) = watch::channel(false);

        Ok(Self {
            id,
            reservation,
            local_addr,
            link: RwLock::new(Link {
                status: SessionStatus::Disconnected,
                peer: None,
                socket: None,
                worker: None,
            }),
            disconnect,
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn status(&self) -> SessionStatus {
        self.link.read().await.status
    }

    pub async fn is_connected(&self) -> bool {
        self.status().await == SessionStatus::Connected
    }

    pub async fn peer(&self) -> Option<SocketAddr> {
        self.link.read().await.peer
    }

    /// Socket to relay through, if a client currently holds the slot.
    pub async fn outbound(&self) -> Option<Arc<UdpSocket>> {
        let link = self.link.read().await;
        match link.status {
            SessionStatus::Connected => link.socket.clone(),
            SessionStatus::Disconnected => None,
        }
    }

    /// Associates a new socket handle with `peer` and starts the worker that
    /// `spawn` builds for it. The slot is marked Connected before the worker
    /// can observe it, so a worker that fails immediately still leaves the slot
    /// Disconnected.
    pub(crate) async fn connect<F>(&self, peer: SocketAddr, spawn: F) -> Result<(), SessionError>
    where
        F: FnOnce(Arc<UdpSocket>, watch::Receiver<bool>) -> JoinHandle<()>,
    {
        let socket = Arc::new(self.open(peer).await?);

        self.disconnect.send_replace(false);
        let disconnect = self.disconnect.subscribe();

        let mut link = self.link.write().await;
        link.worker = Some(spawn(Arc::clone(&socket), disconnect));
        link.socket = Some(socket);
        link.peer = Some(peer);
        link.status = SessionStatus::Connected;

        Ok(())
    }

    async fn open(&self, peer: SocketAddr) -> Result<UdpSocket, SessionError> {
        let socket = UdpSocket::from_std(self.reservation.try_clone()?)?;
        socket.connect(peer).await?;

        // Anything still queued came from before the association.
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            match socket.try_recv(&mut buffer) {
                Ok(len) => debug!("[{}] discarded {} stale bytes", self.id, len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("[{}] stale receive error: {}", self.id, e);
                    break;
                }
            }
        }

        Ok(socket)
    }

    /// Raises the level-triggered disconnect signal for the current worker.
    pub fn request_disconnect(&self) {
        self.disconnect.send_replace(true);
    }

    /// Called by the worker on its way out. Frees the slot for reuse.
    pub(crate) async fn finish(&self) {
        let mut link = self.link.write().await;
        link.status = SessionStatus::Disconnected;
        link.peer = None;
        link.socket = None;
    }

    pub(crate) async fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.link.write().await.worker.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let session = Session::create(3, LOCALHOST, 0).unwrap();

        assert_eq!(session.id(), 3);
        assert_ne!(session.local_addr().port(), 0);
        assert_eq!(session.status().await, SessionStatus::Disconnected);
        assert!(session.outbound().await.is_none());
        assert!(session.peer().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_associates_peer_and_spawns_worker() {
        let session = Session::create(0, LOCALHOST, 0).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        session
            .connect(client_addr, |socket, _| {
                tokio::spawn(async move {
                    let _ = socket.send(&[9, 9, 9, 9]).await;
                })
            })
            .await
            .unwrap();

        assert!(session.is_connected().await);
        assert_eq!(session.peer().await, Some(client_addr));
        assert!(session.outbound().await.is_some());

        let mut buffer = [0u8; 16];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buffer[..len], &[9, 9, 9, 9]);
        assert_eq!(from, session.local_addr());

        let worker = session.take_worker().await.unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_frees_slot() {
        let session = Session::create(1, LOCALHOST, 0).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        session
            .connect(client.local_addr().unwrap(), |_, _| tokio::spawn(async {}))
            .await
            .unwrap();
        session.finish().await;

        assert_eq!(session.status().await, SessionStatus::Disconnected);
        assert!(session.outbound().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_signal_is_reset_on_connect() {
        let session = Session::create(2, LOCALHOST, 0).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        session.request_disconnect();

        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        session
            .connect(client_addr, move |_, disconnect| {
                let _ = seen_tx.send(*disconnect.borrow());
                tokio::spawn(async {})
            })
            .await
            .unwrap();

        assert!(!seen_rx.await.unwrap());
    }

    #[test]
    fn test_port_in_use_is_reported() {
        let first = Session::create(0, LOCALHOST, 0).unwrap();
        let taken = first.local_addr().port();

        let err = Session::create(1, LOCALHOST, taken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
