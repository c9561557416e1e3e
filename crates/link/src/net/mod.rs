mod endpoint;
mod protocol;
mod stats;
pub(crate) mod wire;

pub use endpoint::{Channel, Endpoint, PacketLossSimulation};
pub(crate) use stats::StatsCounters;
pub use protocol::{
    ActionFlags, BoardChange, BoardChangeKind, BoardDelta, CrashedPlayer, Decoded,
    DiscoveryMessage, FrameHeader, GameMessage, GameStateSnapshot, Heartbeat, HeartbeatKind,
    InputMessage, Location, Message, SnakeState, SnakeStateUpdate, StartCommand, StartKind,
    Velocity, WireError, DISCOVERY_MAGIC, DISCOVERY_PORT, GAME_MAGIC, GAME_PORT, HEADER_SIZE,
    MAX_BARRIERS, MAX_BOARD_CHANGES, MAX_FOOD, MAX_FRAME_SIZE, MAX_POISON, MAX_SEGMENTS,
    PROTOCOL_VERSION,
};
pub use stats::NetworkStats;
pub use wire::{BoundedList, Reader, Wire};
