//! Client connection handshake and the single-threaded frame loop

use crate::controller::{Activity, LocalController, UpdatePolicy};
use crate::tracker::{RemoteEntityTracker, TrackerEvent};
use crate::wander::Wanderer;
use log::{debug, error, info, warn};
use shared::{decode, encode, EncodeError, Message, MAX_PACKET_SIZE, MAX_USERS};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long the handshake waits for the server to answer a Logon.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server is down, full, or unreachable; the protocol cannot tell which.
    #[error("no reply from {server} within {timeout:?}")]
    HandshakeTimeout { server: SocketAddr, timeout: Duration },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

/// UDP association with the session port the server assigned us.
pub struct Connection {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl Connection {
    /// Sends one Logon to the rendezvous address and waits for any reply.
    ///
    /// Whichever address answers becomes the peer for the rest of the session.
    /// There is a single attempt; no reply within `wait` fails the connect.
    pub async fn connect(server: SocketAddr, wait: Duration) -> Result<Self, ClientError> {
        let local: IpAddr = match server {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;

        info!("Logging on to {}", server);
        socket.send_to(&encode(&Message::Logon)?, server).await?;

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, peer) = match timeout(wait, socket.recv_from(&mut buffer)).await {
            Ok(received) => received?,
            Err(_) => {
                return Err(ClientError::HandshakeTimeout {
                    server,
                    timeout: wait,
                })
            }
        };

        match decode(&buffer[..len]) {
            Ok(Message::ConfirmLogon) => debug!("Logon confirmed by {}", peer),
            Ok(other) => debug!("First reply from {} was {}", peer, other.kind()),
            Err(e) => debug!("First reply from {} did not decode: {}", peer, e),
        }

        socket.connect(peer).await?;
        info!("Connected to session at {}", peer);

        Ok(Connection { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, message: &Message) -> Result<(), ClientError> {
        self.socket.send(&encode(message)?).await?;
        Ok(())
    }

    /// Receives every datagram already queued without waiting. Datagrams that
    /// do not decode are logged and skipped.
    pub fn drain(&self) -> Result<Vec<Message>, ClientError> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut messages = Vec::new();

        loop {
            match self.socket.try_recv(&mut buffer) {
                Ok(len) => match decode(&buffer[..len]) {
                    Ok(message) => messages.push(message),
                    Err(e) => warn!("Dropping packet from server: {}", e),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(messages),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sends a single Logoff. Nothing is acknowledged.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        info!("Logging off from {}", self.peer);
        self.send(&Message::Logoff).await
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub frame: Duration,
    pub policy: UpdatePolicy,
    pub activity: Activity,
    pub seed: Option<u64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(16),
            policy: UpdatePolicy::default(),
            activity: Activity::Active,
            seed: None,
        }
    }
}

/// Headless client: one cooperative loop that drains the network, steps the
/// local walker, smooths remote players and throttles outgoing updates.
pub struct Client {
    connection: Connection,
    tracker: RemoteEntityTracker,
    controller: LocalController,
    wanderer: Wanderer,
    options: ClientOptions,
    started: Instant,
    last_frame: f64,
    frames: u64,
}

impl Client {
    pub fn new(connection: Connection, options: ClientOptions) -> Self {
        Client {
            connection,
            tracker: RemoteEntityTracker::new(MAX_USERS),
            controller: LocalController::new(options.policy),
            wanderer: Wanderer::new(options.seed),
            options,
            started: Instant::now(),
            last_frame: 0.0,
            frames: 0,
        }
    }

    pub fn tracker(&self) -> &RemoteEntityTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &LocalController {
        &self.controller
    }

    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Runs one frame of the loop.
    pub async fn frame(&mut self) -> Result<(), ClientError> {
        let now = self.now();
        let dt = (now - self.last_frame) as f32;
        self.last_frame = now;
        self.frames += 1;

        for message in self.connection.drain()? {
            match self.tracker.apply(&message, now) {
                TrackerEvent::Activated { player_id, state } => {
                    info!("Player {} appeared ({:?})", player_id, state)
                }
                TrackerEvent::StateChanged { player_id, from, to } => {
                    debug!("Player {} animation {:?} -> {:?}", player_id, from, to)
                }
                TrackerEvent::Deactivated { player_id } => info!("Player {} logged off", player_id),
                TrackerEvent::Moved { .. } | TrackerEvent::Ignored => {}
            }
        }

        let pose = self.wanderer.step(dt);
        self.tracker.advance(now);

        if self.frames % 60 == 0 {
            let local = self.controller.render_pose();
            debug!(
                "Local at ({:.2}, {:.2}, {:.2}), {} remote players",
                local.position.x,
                local.position.y,
                local.position.z,
                self.tracker.active_count()
            );
            for (player_id, remote) in self.tracker.render_poses() {
                debug!(
                    "  Player {} at ({:.2}, {:.2}, {:.2}) yaw {:.2}",
                    player_id, remote.position.x, remote.position.y, remote.position.z, remote.yaw
                );
            }
        }

        if let Some(update) = self.controller.poll(now, pose, self.options.activity) {
            self.connection.send(&update).await?;
        }

        Ok(())
    }

    /// Runs frames until `duration` elapses or Ctrl+C, then logs off.
    pub async fn run(self, duration: Option<Duration>) -> Result<(), ClientError> {
        self.run_until(duration, tokio::signal::ctrl_c()).await
    }

    /// Runs frames until `duration` elapses or `stop` completes, then logs off.
    pub async fn run_until<S>(mut self, duration: Option<Duration>, stop: S) -> Result<(), ClientError>
    where
        S: Future,
    {
        let mut frame_interval = interval(self.options.frame);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(stop);

        let result = loop {
            if duration.map_or(false, |limit| self.started.elapsed() >= limit) {
                break Ok(());
            }

            tokio::select! {
                _ = frame_interval.tick() => {
                    if let Err(e) = self.frame().await {
                        error!("Frame failed: {}", e);
                        break Err(e);
                    }
                },
                _ = &mut stop => {
                    info!("Stop requested, logging off...");
                    break Ok(());
                }
            }
        };

        info!(
            "Sent {} updates over {} frames",
            self.controller.updates_sent(),
            self.frames
        );

        keep_first_error(result, self.connection.disconnect().await)
    }
}

/// The loop's own outcome wins; a failed Logoff is only logged.
fn keep_first_error(
    result: Result<(), ClientError>,
    logoff: Result<(), ClientError>,
) -> Result<(), ClientError> {
    if let Err(e) = logoff {
        warn!("Logoff failed: {}", e);
    }
    result
}
