//! # Position Relay Server Library
//!
//! This library provides the server half of the position-sync layer. The
//! server never simulates anything: clients own their kinematics, the server
//! owns identity and fan-out.
//!
//! ## Core Responsibilities
//!
//! ### Logon Discovery
//! A single rendezvous socket on a well-known port accepts Logon datagrams and
//! nothing else. Each Logon is handed to the session registry, which assigns
//! the first free slot and answers from that slot's dedicated port. From then
//! on the client talks only to its session port.
//!
//! ### Relaying
//! Every UpdatePlayer a session receives is stamped with the session's
//! PlayerId and sent to every other connected session. Logoff fans out a
//! PlayerLoggedOff and frees the slot.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! Each connected session runs its own worker task that blocks only in its
//! wait for data, disconnect or timeout. The listener is one more task that
//! blocks only in its wait for data or shutdown. They share nothing but the
//! registry.
//!
//! ### Fixed Slot Pool
//! The registry is created once with `max_users` slots and never grows. The
//! slot index is the PlayerId on the wire, so ids are dense and reused.
//!
//! ### Best-Effort Delivery
//! There are no acknowledgements, retries or sequence numbers. Lost updates
//! are replaced by the next one.
//!
//! ## Module Organization
//!
//! - `config`: server and worker settings
//! - `wait`: the shared wait-with-timeout primitive
//! - `session`: one slot, its port and its per-connection state
//! - `registry`: the slot pool, logon assignment and broadcast
//! - `dispatcher`: the per-session worker loop
//! - `network`: the rendezvous listener and server lifecycle
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(&ServerConfig::default()).await?;
//!
//!     tokio::select! {
//!         result = server.run() => result?,
//!         _ = tokio::signal::ctrl_c() => {}
//!     }
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod network;
pub mod registry;
pub mod session;
pub mod wait;
