use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::Deserialize;

use crate::net::{DISCOVERY_PORT, GAME_PORT};

/// Session tunables. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Address both sockets bind to. A specific address also becomes the
    /// local identity used for role election.
    pub bind_addr: Ipv4Addr,
    /// Local identity override when binding to `0.0.0.0`.
    pub advertised_addr: Option<Ipv4Addr>,
    pub discovery_port: u16,
    pub game_port: u16,
    /// Game port the peer listens on. Defaults to our own `game_port`.
    pub peer_game_port: Option<u16>,
    /// Where announces go. Defaults to the limited broadcast address on
    /// `discovery_port`.
    pub announce_addr: Option<SocketAddrV4>,
    pub broadcast_interval_ms: u64,
    pub discovery_poll_ms: u64,
    pub network_poll_ms: u64,
    pub inactivity_timeout_ms: u64,
    /// Give up searching after this long without an accepted peer.
    pub search_timeout_ms: Option<u64>,
    pub heartbeat_interval_ms: u64,
    pub sync_period_ms: u64,
    pub input_resend_ms: u64,
    pub start_command_repeats: u8,
    /// Capacity of the drained event queue; 0 disables it.
    pub event_channel_capacity: usize,
    /// Percentage of outbound game datagrams to drop on purpose.
    pub simulated_loss_percent: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: Ipv4Addr::UNSPECIFIED,
            advertised_addr: None,
            discovery_port: DISCOVERY_PORT,
            game_port: GAME_PORT,
            peer_game_port: None,
            announce_addr: None,
            broadcast_interval_ms: 500,
            discovery_poll_ms: 50,
            network_poll_ms: 16,
            inactivity_timeout_ms: 5_000,
            search_timeout_ms: None,
            heartbeat_interval_ms: 2_000,
            sync_period_ms: 50,
            input_resend_ms: 500,
            start_command_repeats: 3,
            event_channel_capacity: 256,
            simulated_loss_percent: 0.0,
        }
    }
}

impl SessionConfig {
    pub fn discovery_bind(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_addr, self.discovery_port)
    }

    pub fn game_bind(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_addr, self.game_port)
    }

    pub fn announce_target(&self) -> SocketAddrV4 {
        self.announce_addr
            .unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::BROADCAST, self.discovery_port))
    }

    pub fn peer_game_port(&self) -> u16 {
        self.peer_game_port.unwrap_or(self.game_port)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms)
    }

    pub fn network_poll(&self) -> Duration {
        Duration::from_millis(self.network_poll_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_ms.map(Duration::from_millis)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_millis(self.sync_period_ms)
    }

    pub fn input_resend_interval(&self) -> Duration {
        Duration::from_millis(self.input_resend_ms)
    }
}
