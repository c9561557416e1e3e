use bitflags::bitflags;
use bytes::{Bytes, BytesMut};

use super::wire::{BoundedList, Reader, Wire, wire_struct};

pub const DISCOVERY_PORT: u16 = 47777;
pub const GAME_PORT: u16 = 47778;
pub const DISCOVERY_MAGIC: u32 = 0x534E_4B31; // "SNK1"
pub const GAME_MAGIC: u32 = 0x534E_4B32; // "SNK2"
pub const PROTOCOL_VERSION: u8 = 1;

pub const MAX_SEGMENTS: usize = 500;
pub const MAX_FOOD: usize = 100;
pub const MAX_POISON: usize = 100;
pub const MAX_BARRIERS: usize = 200;
pub const MAX_BOARD_CHANGES: usize = 20;

/// Largest datagram either channel will ever produce.
pub const MAX_FRAME_SIZE: usize = GameStateSnapshot::FRAME_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("unsupported protocol version {0}")]
    Version(u8),
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),
    #[error("message kind {kind:#04x} must be {expected} bytes, got {found}")]
    Size {
        kind: u8,
        expected: usize,
        found: usize,
    },
    #[error("frame ended early: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u8 },
}

/// Leading fields of every frame on both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u8,
    pub kind: u8,
}

wire_struct!(FrameHeader {
    magic: u32,
    version: u8,
    kind: u8,
});

pub const HEADER_SIZE: usize = FrameHeader::SIZE;

/// A payload that travels as one datagram with a tagged header.
pub trait Message: Wire {
    const MAGIC: u32;
    const KIND: u8;
    const FRAME_SIZE: usize = HEADER_SIZE + Self::SIZE;

    fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(Self::FRAME_SIZE);
        FrameHeader {
            magic: Self::MAGIC,
            version: PROTOCOL_VERSION,
            kind: Self::KIND,
        }
        .put(&mut out);
        self.put(&mut out);
        debug_assert_eq!(out.len(), Self::FRAME_SIZE);
        out.freeze()
    }
}

/// A decoded message plus the number of list counts that were clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub message: T,
    pub clamped: usize,
}

fn read_header(bytes: &[u8], magic: u32) -> Result<FrameHeader, WireError> {
    let header = FrameHeader::get(&mut Reader::new(bytes))?;
    if header.magic != magic {
        return Err(WireError::BadMagic {
            expected: magic,
            found: header.magic,
        });
    }
    if header.version != PROTOCOL_VERSION {
        return Err(WireError::Version(header.version));
    }
    Ok(header)
}

fn decode_body<M: Message>(bytes: &[u8]) -> Result<Decoded<M>, WireError> {
    if bytes.len() != M::FRAME_SIZE {
        return Err(WireError::Size {
            kind: M::KIND,
            expected: M::FRAME_SIZE,
            found: bytes.len(),
        });
    }
    let mut reader = Reader::new(&bytes[HEADER_SIZE..]);
    let message = M::get(&mut reader)?;
    Ok(Decoded {
        message,
        clamped: reader.clamped(),
    })
}

macro_rules! wire_enum {
    ($name:ident, $field:literal { $($variant:ident = $value:literal),* $(,)? }) => {
        impl $name {
            pub fn to_u8(self) -> u8 {
                match self {
                    $(Self::$variant => $value,)*
                }
            }

            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }

        impl Wire for $name {
            const SIZE: usize = 1;

            fn put(&self, out: &mut BytesMut) {
                self.to_u8().put(out);
            }

            fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
                let value = u8::get(src)?;
                Self::from_u8(value).ok_or(WireError::InvalidValue {
                    field: $field,
                    value,
                })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// A board cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub x: i16,
    pub y: i16,
}

impl Location {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

wire_struct!(Location { x: i16, y: i16 });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Velocity {
    pub x: i8,
    pub y: i8,
}

impl Velocity {
    pub const STILL: Self = Self::new(0, 0);
    pub const UP: Self = Self::new(0, -1);
    pub const DOWN: Self = Self::new(0, 1);
    pub const LEFT: Self = Self::new(-1, 0);
    pub const RIGHT: Self = Self::new(1, 0);

    pub const fn new(x: i8, y: i8) -> Self {
        Self { x, y }
    }

    pub fn is_moving(&self) -> bool {
        *self != Self::STILL
    }
}

wire_struct!(Velocity { x: i8, y: i8 });

bitflags! {
    /// One-shot controls carried with an input message.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ActionFlags: u8 {
        const JUMP = 1 << 0;
        const FASTER = 1 << 1;
        const SLOWER = 1 << 2;
        const STALL = 1 << 3;
    }
}

impl Wire for ActionFlags {
    const SIZE: usize = 1;

    fn put(&self, out: &mut BytesMut) {
        self.bits().put(out);
    }

    fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self::from_bits_truncate(u8::get(src)?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CrashedPlayer {
    #[default]
    None,
    Player1,
    Player2,
    Both,
}

wire_enum!(CrashedPlayer, "crashed player" {
    None = 0,
    Player1 = 1,
    Player2 = 2,
    Both = 3,
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartKind {
    #[default]
    Start,
    Restart,
}

wire_enum!(StartKind, "start command" {
    Start = 0,
    Restart = 1,
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeartbeatKind {
    #[default]
    Ping,
    Pong,
}

wire_enum!(HeartbeatKind, "heartbeat type" {
    Ping = 0,
    Pong = 1,
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BoardChangeKind {
    #[default]
    FoodAdded,
    FoodRemoved,
    PoisonAdded,
    PoisonRemoved,
    BarrierAdded,
    BarrierRemoved,
}

wire_enum!(BoardChangeKind, "board change" {
    FoodAdded = 0,
    FoodRemoved = 1,
    PoisonAdded = 2,
    PoisonRemoved = 3,
    BarrierAdded = 4,
    BarrierRemoved = 5,
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BoardChange {
    pub kind: BoardChangeKind,
    pub at: Location,
}

wire_struct!(BoardChange {
    kind: BoardChangeKind,
    at: Location,
});

/// One snake as the host sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnakeState {
    /// Head first.
    pub segments: BoundedList<Location, MAX_SEGMENTS>,
    pub velocity: Velocity,
    pub move_period: f32,
}

wire_struct!(SnakeState {
    segments: BoundedList<Location, MAX_SEGMENTS>,
    velocity: Velocity,
    move_period: f32,
});

// ---------------------------------------------------------------------------
// Discovery channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMessage {
    Announce,
    Response,
}

impl DiscoveryMessage {
    const ANNOUNCE: u8 = 0x01;
    const RESPONSE: u8 = 0x02;

    pub const FRAME_SIZE: usize = HEADER_SIZE;

    fn kind(self) -> u8 {
        match self {
            Self::Announce => Self::ANNOUNCE,
            Self::Response => Self::RESPONSE,
        }
    }

    pub fn encode(self) -> Bytes {
        let mut out = BytesMut::with_capacity(Self::FRAME_SIZE);
        FrameHeader {
            magic: DISCOVERY_MAGIC,
            version: PROTOCOL_VERSION,
            kind: self.kind(),
        }
        .put(&mut out);
        out.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let header = read_header(bytes, DISCOVERY_MAGIC)?;
        let message = match header.kind {
            Self::ANNOUNCE => Self::Announce,
            Self::RESPONSE => Self::Response,
            other => return Err(WireError::UnknownKind(other)),
        };
        if bytes.len() != Self::FRAME_SIZE {
            return Err(WireError::Size {
                kind: header.kind,
                expected: Self::FRAME_SIZE,
                found: bytes.len(),
            });
        }
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// Game channel
// ---------------------------------------------------------------------------

/// Client → host control state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputMessage {
    pub sequence: u32,
    pub velocity: Velocity,
    pub actions: ActionFlags,
    pub move_period: f32,
}

wire_struct!(InputMessage {
    sequence: u32,
    velocity: Velocity,
    actions: ActionFlags,
    move_period: f32,
});

impl Message for InputMessage {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x10;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartCommand {
    pub kind: StartKind,
}

wire_struct!(StartCommand { kind: StartKind });

impl Message for StartCommand {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x11;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub kind: HeartbeatKind,
    /// Milliseconds since the originating session started.
    pub timestamp_ms: u64,
}

wire_struct!(Heartbeat {
    kind: HeartbeatKind,
    timestamp_ms: u64,
});

impl Message for Heartbeat {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x12;
}

/// Incremental board content changes, sent instead of a full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardDelta {
    pub sequence: u32,
    pub changes: BoundedList<BoardChange, MAX_BOARD_CHANGES>,
}

wire_struct!(BoardDelta {
    sequence: u32,
    changes: BoundedList<BoardChange, MAX_BOARD_CHANGES>,
});

impl Message for BoardDelta {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x13;
}

/// Both snakes and the score line, without board contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnakeStateUpdate {
    pub sequence: u32,
    pub snakes: [SnakeState; 2],
    pub scores: [u16; 2],
    pub game_over: bool,
    pub crashed_player: CrashedPlayer,
}

wire_struct!(SnakeStateUpdate {
    sequence: u32,
    snakes: [SnakeState; 2],
    scores: [u16; 2],
    game_over: bool,
    crashed_player: CrashedPlayer,
});

impl Message for SnakeStateUpdate {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x14;
}

/// Full authoritative state, sent periodically by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStateSnapshot {
    pub sequence: u32,
    pub snakes: [SnakeState; 2],
    pub scores: [u16; 2],
    pub game_over: bool,
    pub crashed_player: CrashedPlayer,
    pub food: BoundedList<Location, MAX_FOOD>,
    pub poison: BoundedList<Location, MAX_POISON>,
    pub barriers: BoundedList<Location, MAX_BARRIERS>,
}

wire_struct!(GameStateSnapshot {
    sequence: u32,
    snakes: [SnakeState; 2],
    scores: [u16; 2],
    game_over: bool,
    crashed_player: CrashedPlayer,
    food: BoundedList<Location, MAX_FOOD>,
    poison: BoundedList<Location, MAX_POISON>,
    barriers: BoundedList<Location, MAX_BARRIERS>,
});

impl Message for GameStateSnapshot {
    const MAGIC: u32 = GAME_MAGIC;
    const KIND: u8 = 0x15;
}

impl GameStateSnapshot {
    /// The snake/score part of this snapshot, for hosts that pair it with
    /// board deltas.
    pub fn snake_update(&self) -> SnakeStateUpdate {
        SnakeStateUpdate {
            sequence: self.sequence,
            snakes: self.snakes.clone(),
            scores: self.scores,
            game_over: self.game_over,
            crashed_player: self.crashed_player,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    Input(InputMessage),
    Start(StartCommand),
    Heartbeat(Heartbeat),
    BoardDelta(BoardDelta),
    SnakeState(SnakeStateUpdate),
    Snapshot(GameStateSnapshot),
}

impl GameMessage {
    pub fn decode(bytes: &[u8]) -> Result<Decoded<Self>, WireError> {
        fn wrap<M: Message>(
            bytes: &[u8],
            variant: fn(M) -> GameMessage,
        ) -> Result<Decoded<GameMessage>, WireError> {
            decode_body::<M>(bytes).map(|decoded| Decoded {
                message: variant(decoded.message),
                clamped: decoded.clamped,
            })
        }

        let header = read_header(bytes, GAME_MAGIC)?;
        match header.kind {
            InputMessage::KIND => wrap(bytes, Self::Input),
            StartCommand::KIND => wrap(bytes, Self::Start),
            Heartbeat::KIND => wrap(bytes, Self::Heartbeat),
            BoardDelta::KIND => wrap(bytes, Self::BoardDelta),
            SnakeStateUpdate::KIND => wrap(bytes, Self::SnakeState),
            GameStateSnapshot::KIND => wrap(bytes, Self::Snapshot),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Self::Input(msg) => msg.encode(),
            Self::Start(msg) => msg.encode(),
            Self::Heartbeat(msg) => msg.encode(),
            Self::BoardDelta(msg) => msg.encode(),
            Self::SnakeState(msg) => msg.encode(),
            Self::Snapshot(msg) => msg.encode(),
        }
    }
}
