//! The one blocking point shared by the rendezvous listener and every session
//! worker: wait until the socket is readable, the cancel signal is raised, or
//! the timeout elapses.

use std::future::pending;
use std::io;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Waits for `socket` to become readable.
///
/// `cancel` is level-triggered: once it holds `true` every later call returns
/// `Cancelled` immediately, even if the flag was raised while nobody waited.
/// A dropped sender also counts as cancellation. Cancellation wins over
/// readiness when both are pending. `None` waits without a deadline.
pub async fn wait_for_packets(
    socket: &UdpSocket,
    cancel: &mut watch::Receiver<bool>,
    timeout: Option<Duration>,
) -> io::Result<WaitOutcome> {
    if *cancel.borrow_and_update() {
        return Ok(WaitOutcome::Cancelled);
    }

    let deadline = async {
        match timeout {
            Some(timeout) => sleep(timeout).await,
            None => pending::<()>().await,
        }
    };

    tokio::select! {
        biased;

        _ = cancel.wait_for(|cancelled| *cancelled) => Ok(WaitOutcome::Cancelled),
        ready = socket.readable() => ready.map(|_| WaitOutcome::Ready),
        _ = deadline => Ok(WaitOutcome::TimedOut),
    }
}
