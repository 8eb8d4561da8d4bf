//! Fixed pool of session slots shared by the rendezvous listener and every
//! session worker.
//!
//! Slots are indexed by PlayerId. A slot's status and socket only change in
//! [`SessionRegistry::connect`], called from the listener before the worker
//! exists, and in the slot's own worker when it exits. Everything else only
//! reads them.

use crate::config::{IdlePolicy, ServerConfig};
use crate::dispatcher;
use crate::session::{Session, SessionError, SessionStatus};
use log::{debug, info};
use shared::{encode, Message, PlayerId};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Settings every session worker runs with.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub wait_timeout: Duration,
    pub idle_policy: IdlePolicy,
}

impl From<&ServerConfig> for WorkerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            wait_timeout: config.wait_timeout,
            idle_policy: config.idle_policy,
        }
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    worker: WorkerConfig,
    shutdown: watch::Sender<bool>,
}

impl SessionRegistry {
    /// Creates `max_users` slots, each bound to its own port.
    ///
    /// Ports are probed upwards from `base_port`, skipping any that are taken.
    /// A base of zero gives every slot an OS-assigned port.
    pub fn create(
        host: IpAddr,
        base_port: u16,
        max_users: usize,
        worker: WorkerConfig,
    ) -> Result<Self, SessionError> {
        let mut sessions = Vec::with_capacity(max_users);
        let mut port = base_port;

        for id in 0..max_users as PlayerId {
            let session = loop {
                match Session::create(id, host, port) {
                    Ok(session) => break session,
                    Err(e) if port != 0 && e.kind() == io::ErrorKind::AddrInUse => {
                        port = port
                            .checked_add(1)
                            .ok_or(SessionError::NoPortAvailable(base_port))?;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            debug!("Session {} listening on {}", id, session.local_addr());
            sessions.push(session);

            if port != 0 {
                port = port
                    .checked_add(1)
                    .ok_or(SessionError::NoPortAvailable(base_port))?;
            }
        }

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            sessions,
            worker,
            shutdown,
        })
    }

    pub fn max_users(&self) -> usize {
        self.sessions.len()
    }

    pub fn worker_config(&self) -> WorkerConfig {
        self.worker
    }

    pub fn session(&self, id: PlayerId) -> Result<&Session, SessionError> {
        self.sessions
            .get(id as usize)
            .ok_or(SessionError::InvalidId(id))
    }

    pub async fn status(&self, id: PlayerId) -> Result<SessionStatus, SessionError> {
        Ok(self.session(id)?.status().await)
    }

    pub fn port(&self, id: PlayerId) -> Result<u16, SessionError> {
        Ok(self.session(id)?.local_addr().port())
    }

    pub async fn connected_count(&self) -> usize {
        let mut count = 0;
        for session in &self.sessions {
            if session.is_connected().await {
                count += 1;
            }
        }
        count
    }

    /// First Disconnected slot in index order.
    pub async fn find_free_slot(&self) -> Result<PlayerId, SessionError> {
        for session in &self.sessions {
            if !session.is_connected().await {
                return Ok(session.id());
            }
        }
        Err(SessionError::Full)
    }

    pub async fn find_by_peer(&self, addr: SocketAddr) -> Option<PlayerId> {
        for session in &self.sessions {
            if session.peer().await == Some(addr) {
                return Some(session.id());
            }
        }
        None
    }

    /// Associates slot `id` with `peer` and starts its worker.
    pub async fn connect(self: &Arc<Self>, id: PlayerId, peer: SocketAddr) -> Result<(), SessionError> {
        let registry = Arc::clone(self);
        self.session(id)?
            .connect(peer, move |socket, disconnect| {
                tokio::spawn(dispatcher::run_session(registry, id, socket, disconnect))
            })
            .await
    }

    /// Handles a Logon from `peer`: picks a free slot and connects it.
    ///
    /// A peer that already holds a slot keeps it; the repeat Logon is refused
    /// with [`SessionError::AlreadyConnected`]. Once shutdown has started every
    /// Logon is refused with [`SessionError::ShuttingDown`].
    pub async fn logon(self: &Arc<Self>, peer: SocketAddr) -> Result<PlayerId, SessionError> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }

        if let Some(existing) = self.find_by_peer(peer).await {
            return Err(SessionError::AlreadyConnected(peer, existing));
        }

        let id = self.find_free_slot().await?;
        self.connect(id, peer).await?;
        info!("Logged on user {} from {}", id, peer);
        Ok(id)
    }

    /// Sends `message` to every Connected session other than `sender`.
    ///
    /// Delivery is best effort: a slot that disconnects mid-iteration is simply
    /// skipped and send failures are only logged. Returns how many sessions the
    /// datagram was handed to.
    pub async fn broadcast_except(
        &self,
        sender: PlayerId,
        message: &Message,
    ) -> Result<usize, SessionError> {
        let data = encode(message)?;
        let mut delivered = 0;

        for session in &self.sessions {
            if session.id() == sender {
                continue;
            }

            let Some(socket) = session.outbound().await else {
                continue;
            };

            match socket.send(&data).await {
                Ok(_) => delivered += 1,
                Err(e) => debug!(
                    "[{}] dropped {} for session {}: {}",
                    sender,
                    message.kind(),
                    session.id(),
                    e
                ),
            }
        }

        Ok(delivered)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Raises the process-wide shutdown signal, wakes every worker and waits
    /// for all of them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        for session in &self.sessions {
            session.request_disconnect();
        }

        for session in &self.sessions {
            if let Some(worker) = session.take_worker().await {
                if let Err(e) = worker.await {
                    debug!("Session {} worker ended abnormally: {}", session.id(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode, LocomotionState, PlayerUpdate, Vec3, MAX_PACKET_SIZE};
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn registry(max_users: usize) -> Arc<SessionRegistry> {
        let worker = WorkerConfig {
            wait_timeout: Duration::from_secs(5),
            idle_policy: IdlePolicy::Ignore,
        };
        Arc::new(SessionRegistry::create(LOCALHOST, 0, max_users, worker).unwrap())
    }

    async fn recv_message(socket: &UdpSocket) -> Message {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        decode(&buffer[..len]).unwrap()
    }

    /// Binds a client socket, logs it on and pairs it with its session port.
    async fn logged_on_client(registry: &Arc<SessionRegistry>) -> (PlayerId, UdpSocket) {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let id = registry.logon(client.local_addr().unwrap()).await.unwrap();
        let session_addr = registry.session(id).unwrap().local_addr();
        client.connect(session_addr).await.unwrap();

        assert_eq!(recv_message(&client).await, Message::ConfirmLogon);
        (id, client)
    }

    #[tokio::test]
    async fn test_slots_get_distinct_ports() {
        let registry = registry(4);
        let mut ports: Vec<u16> = (0..4).map(|id| registry.port(id).unwrap()).collect();
        ports.sort_unstable();
        ports.dedup();

        assert_eq!(ports.len(), 4);
        assert_eq!(registry.max_users(), 4);
        assert!(matches!(registry.port(4), Err(SessionError::InvalidId(4))));
    }

    #[tokio::test]
    async fn test_probing_skips_taken_ports() {
        let blocker = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap().port();
        let worker = WorkerConfig {
            wait_timeout: Duration::from_secs(5),
            idle_policy: IdlePolicy::Ignore,
        };

        // The neighbouring ports may be busy too; only the skip itself matters.
        if let Ok(registry) = SessionRegistry::create(LOCALHOST, taken, 2, worker) {
            assert!(registry.port(0).unwrap() > taken);
            assert!(registry.port(1).unwrap() > registry.port(0).unwrap());
        }
    }

    #[tokio::test]
    async fn test_find_free_slot_scans_in_order() {
        let registry = registry(2);
        assert_eq!(registry.find_free_slot().await.unwrap(), 0);

        let (first, _c1) = logged_on_client(&registry).await;
        assert_eq!(first, 0);
        assert_eq!(registry.find_free_slot().await.unwrap(), 1);

        let (second, _c2) = logged_on_client(&registry).await;
        assert_eq!(second, 1);
        assert!(matches!(
            registry.find_free_slot().await,
            Err(SessionError::Full)
        ));
        assert_eq!(registry.connected_count().await, 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_registry_refuses_logon() {
        let registry = registry(1);
        let (_id, _client) = logged_on_client(&registry).await;

        let late = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = registry.logon(late.local_addr().unwrap()).await;
        assert!(matches!(result, Err(SessionError::Full)));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeat_logon_keeps_existing_slot() {
        let registry = registry(2);
        let (id, client) = logged_on_client(&registry).await;

        let result = registry.logon(client.local_addr().unwrap()).await;
        assert!(matches!(result, Err(SessionError::AlreadyConnected(_, existing)) if existing == id));
        assert_eq!(registry.connected_count().await, 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let registry = registry(3);
        let (a, client_a) = logged_on_client(&registry).await;
        let (_b, client_b) = logged_on_client(&registry).await;
        let (_c, client_c) = logged_on_client(&registry).await;

        let message = Message::UpdatePlayer(PlayerUpdate {
            player_id: a,
            velocity: Vec3::ZERO,
            position: Vec3::new(4.0, 5.0, 6.0),
            state: LocomotionState::Idle,
            yaw: 0.0,
        });

        let delivered = registry.broadcast_except(a, &message).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(recv_message(&client_b).await, message);
        assert_eq!(recv_message(&client_c).await, message);

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let echoed = timeout(Duration::from_millis(100), client_a.recv(&mut buffer)).await;
        assert!(echoed.is_err(), "sender must not receive its own broadcast");

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_with_no_peers_is_empty() {
        let registry = registry(2);
        let delivered = registry
            .broadcast_except(0, &Message::PlayerLoggedOff { player_id: 0 })
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_logon_after_shutdown_is_refused() {
        let registry = registry(1);
        registry.shutdown().await;

        let late = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = registry.logon(late.local_addr().unwrap()).await;

        assert!(matches!(result, Err(SessionError::ShuttingDown)));
        assert_eq!(registry.status(0).await.unwrap(), SessionStatus::Disconnected);
        assert!(registry.session(0).unwrap().take_worker().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_frees_every_slot() {
        let registry = registry(2);
        let (_a, _client_a) = logged_on_client(&registry).await;
        let (_b, _client_b) = logged_on_client(&registry).await;

        let mut signal = registry.shutdown_signal();
        registry.shutdown().await;

        assert!(registry.is_shutting_down());
        assert!(*signal.borrow_and_update());
        assert_eq!(registry.connected_count().await, 0);
        assert_eq!(registry.status(0).await.unwrap(), SessionStatus::Disconnected);
        assert_eq!(registry.status(1).await.unwrap(), SessionStatus::Disconnected);
    }
}
