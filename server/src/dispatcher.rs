//! Per-session worker: waits on the session socket, drains every pending
//! datagram and relays it to the other sessions.

use crate::config::IdlePolicy;
use crate::registry::SessionRegistry;
use crate::wait::{wait_for_packets, WaitOutcome};
use log::{debug, error, info, warn};
use shared::{decode, encode, Message, PlayerId, MAX_PACKET_SIZE};
use std::io;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Result of handling one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    Continue,
    LoggedOff,
}

/// Why a worker stopped serving its session.
#[derive(Debug)]
pub enum SessionExit {
    LoggedOff,
    Disconnected,
    IdleTimeout,
    Failed(io::Error),
}

impl SessionExit {
    /// Whether the other players still need to hear that this one left.
    fn announce(&self) -> bool {
        matches!(self, SessionExit::IdleTimeout | SessionExit::Failed(_))
    }
}

pub(crate) async fn run_session(
    registry: Arc<SessionRegistry>,
    id: PlayerId,
    socket: Arc<UdpSocket>,
    mut disconnect: watch::Receiver<bool>,
) {
    let exit = serve(&registry, id, &socket, &mut disconnect).await;
    drop(socket);
    conclude(&registry, id, exit).await;
}

/// Logs why the worker stopped, tells the other players when they would not
/// otherwise hear about it, and frees the slot.
async fn conclude(registry: &SessionRegistry, id: PlayerId, exit: SessionExit) {
    match &exit {
        SessionExit::LoggedOff => info!("[{}] logged off", id),
        SessionExit::Disconnected => info!("[{}] disconnected", id),
        SessionExit::IdleTimeout => info!("[{}] dropped after idling", id),
        SessionExit::Failed(e) => error!("[{}] transport failure: {}", id, e),
    }

    if exit.announce() {
        announce_logoff(registry, id).await;
    }

    if let Ok(session) = registry.session(id) {
        session.finish().await;
    }
}

async fn serve(
    registry: &SessionRegistry,
    id: PlayerId,
    socket: &UdpSocket,
    disconnect: &mut watch::Receiver<bool>,
) -> SessionExit {
    match encode(&Message::ConfirmLogon) {
        Ok(data) => {
            if let Err(e) = socket.send(&data).await {
                return SessionExit::Failed(e);
            }
        }
        Err(e) => error!("[{}] could not encode ConfirmLogon: {}", id, e),
    }

    let worker = registry.worker_config();
    let mut buffer = [0u8; MAX_PACKET_SIZE];

    loop {
        // A worker started while shutdown was already under way may have
        // missed its disconnect signal.
        if registry.is_shutting_down() {
            return SessionExit::Disconnected;
        }

        match wait_for_packets(socket, disconnect, Some(worker.wait_timeout)).await {
            Ok(WaitOutcome::Ready) => {
                if let Some(exit) = drain(registry, id, &mut buffer, |buf| socket.try_recv(buf)).await {
                    return exit;
                }
            }
            Ok(WaitOutcome::TimedOut) => {
                warn!("[{}] lagged out", id);

                if worker.idle_policy == IdlePolicy::Disconnect {
                    return SessionExit::IdleTimeout;
                }
            }
            Ok(WaitOutcome::Cancelled) => return SessionExit::Disconnected,
            Err(e) => return SessionExit::Failed(e),
        }
    }
}

/// Processes datagrams from `recv` until it would block.
///
/// Returns the exit reason when the session has to end: a Logoff, or any
/// receive error other than `WouldBlock`.
async fn drain<R>(
    registry: &SessionRegistry,
    id: PlayerId,
    buffer: &mut [u8],
    mut recv: R,
) -> Option<SessionExit>
where
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    loop {
        match recv(&mut *buffer) {
            Ok(len) => {
                if process_packet(registry, id, &buffer[..len]).await == Relay::LoggedOff {
                    return Some(SessionExit::LoggedOff);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
            Err(e) => return Some(SessionExit::Failed(e)),
        }
    }
}

/// Handles one datagram received on session `id`.
///
/// The server is the authority on identity: the player id inside an
/// UpdatePlayer is replaced with `id` before it is relayed. Malformed
/// datagrams and kinds a session never expects are logged and skipped.
pub async fn process_packet(registry: &SessionRegistry, id: PlayerId, data: &[u8]) -> Relay {
    let message = match decode(data) {
        Ok(message) => message,
        Err(e) => {
            warn!("[{}] dropping malformed packet: {}", id, e);
            return Relay::Continue;
        }
    };

    match message {
        Message::UpdatePlayer(mut update) => {
            update.player_id = id;
            match registry
                .broadcast_except(id, &Message::UpdatePlayer(update))
                .await
            {
                Ok(count) => debug!("[{}] relayed update to {} sessions", id, count),
                Err(e) => error!("[{}] relay failed: {}", id, e),
            }
            Relay::Continue
        }
        Message::Logoff => {
            announce_logoff(registry, id).await;
            Relay::LoggedOff
        }
        other => {
            debug!("[{}] ignoring {} on session socket", id, other.kind());
            Relay::Continue
        }
    }
}

async fn announce_logoff(registry: &SessionRegistry, id: PlayerId) {
    if let Err(e) = registry
        .broadcast_except(id, &Message::PlayerLoggedOff { player_id: id })
        .await
    {
        error!("[{}] could not announce logoff: {}", id, e);
    }
}
