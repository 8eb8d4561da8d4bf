//! # Position Relay Client Library
//!
//! This library provides the client half of the position-sync layer. The
//! client is authoritative for its own player: it moves locally, reports its
//! pose at a throttled rate, and renders everyone else from what the server
//! relays back.
//!
//! ## Architecture Overview
//!
//! ### Single Cooperative Loop
//! Everything runs on one task. Each frame drains every datagram already
//! queued on the socket without blocking, feeds it to the tracker, steps the
//! local player, smooths the remote players and sends an update if one is due.
//!
//! ### Dead Reckoning
//! Remote players are drawn at a position extrapolated from their two most
//! recent snapshots, eased towards that target by a fixed factor per frame.
//! Updates arrive at roughly 10 Hz and the render loop runs much faster, so
//! the extrapolation fills the gaps and the easing hides corrections.
//!
//! ### Throttled Reporting
//! The local controller sends at 10 Hz while the client is active and 2 Hz
//! while it is idle, independent of frame rate.
//!
//! ## Module Organization
//!
//! - `network`: Logon handshake, the session socket and the frame loop
//! - `tracker`: remote player table, extrapolation and smoothing
//! - `controller`: local pose reporting and send throttling
//! - `wander`: scripted movement standing in for player input
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions, Connection, HANDSHAKE_TIMEOUT};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = "127.0.0.1:27192".parse()?;
//!     let connection = Connection::connect(server, HANDSHAKE_TIMEOUT).await?;
//!
//!     Client::new(connection, ClientOptions::default()).run(None).await?;
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod network;
pub mod tracker;
pub mod wander;
