use shared::{MAX_USERS, SERVER_PORT};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// What a session worker does when its wait times out with no traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Log the lag and keep waiting.
    Ignore,
    /// Treat the silence as a logoff.
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Rendezvous port. Zero lets the OS choose, and session ports follow suit.
    pub port: u16,
    pub max_users: usize,
    /// First port probed for session slots. Defaults to `port + 1`.
    pub session_base_port: Option<u16>,
    pub wait_timeout: Duration,
    pub idle_policy: IdlePolicy,
}

impl ServerConfig {
    pub fn session_base_port(&self) -> u16 {
        match (self.session_base_port, self.port) {
            (Some(base), _) => base,
            (None, 0) => 0,
            (None, port) => port.saturating_add(1),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: SERVER_PORT,
            max_users: MAX_USERS,
            session_base_port: None,
            wait_timeout: Duration::from_secs(5),
            idle_policy: IdlePolicy::Ignore,
        }
    }
}
