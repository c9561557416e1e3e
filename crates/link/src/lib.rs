//! LAN discovery and state synchronization for a two-player snake game.
//!
//! Two instances find each other by UDP broadcast, elect a host by address,
//! and then exchange fixed-size frames on a unicast game channel. The host
//! owns the simulation and publishes snapshots; the client sends its input.

pub mod config;
pub mod error;
pub mod net;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use net::{
    ActionFlags, BoardChange, BoardChangeKind, BoardDelta, BoundedList, CrashedPlayer,
    DiscoveryMessage, GameMessage, GameStateSnapshot, Heartbeat, HeartbeatKind, InputMessage,
    Location, Message, NetworkStats, SnakeState, SnakeStateUpdate, StartCommand, StartKind,
    Velocity, WireError, DISCOVERY_PORT, GAME_PORT, MAX_BARRIERS, MAX_BOARD_CHANGES, MAX_FOOD,
    MAX_POISON, MAX_SEGMENTS,
};
pub use session::{
    Cadence, ConnectionState, InputState, NetworkRole, PeerInfo, Session, SessionEvent,
    SyncDue, SyncScheduler, elect_role,
};
