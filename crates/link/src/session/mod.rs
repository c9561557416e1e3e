//! The peer session: discovery, connection lifecycle and game channel sends.
//!
//! A [`Session`] is owned by the game loop. [`Session::start_discovery`]
//! binds both sockets and starts two background threads; [`Session::stop`]
//! (or dropping the session) stops and joins them before the sockets close.
//! Nothing a background thread does reaches the game except through the
//! registered handlers and [`Session::drain_events`].

mod discovery;
mod dispatch;
mod network;
mod scheduler;
mod state;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::net::{
    ActionFlags, BoardDelta, Channel, Endpoint, GameStateSnapshot, Heartbeat, HeartbeatKind,
    InputMessage, Message, NetworkStats, PacketLossSimulation, SnakeStateUpdate, StartCommand,
    StartKind, StatsCounters, Velocity,
};

pub use dispatch::SessionEvent;
pub use scheduler::{Cadence, InputState, SyncDue, SyncScheduler};
pub use state::{ConnectionState, NetworkRole, PeerInfo, elect_role};

use discovery::DiscoveryWorker;
use dispatch::Dispatcher;
use network::NetworkWorker;
use state::SessionSlots;

/// State shared between the owning [`Session`] and its threads.
pub(crate) struct Shared {
    config: SessionConfig,
    local_ip: Ipv4Addr,
    running: AtomicBool,
    slots: Mutex<SessionSlots>,
    last_error: Mutex<Option<Arc<SessionError>>>,
    dispatch: Dispatcher,
    stats: Arc<StatsCounters>,
}

/// Sockets and threads that exist between start and stop.
struct Link {
    game: Arc<Endpoint>,
    epoch: Instant,
    sequence: AtomicU32,
    discovery: Option<JoinHandle<()>>,
    network: Option<JoinHandle<()>>,
}

impl Link {
    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    fn join(&mut self) {
        let handles = [
            ("discovery", self.discovery.take()),
            ("network", self.network.take()),
        ];
        for (name, handle) in handles {
            let Some(handle) = handle else {
                continue;
            };
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
    }
}

pub struct Session {
    shared: Arc<Shared>,
    link: Option<Link>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let local_ip = discovery::resolve_local_ip(config.bind_addr, config.advertised_addr);
        let stats = Arc::new(StatsCounters::default());
        let dispatch = Dispatcher::new(config.event_channel_capacity, stats.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                local_ip,
                running: AtomicBool::new(false),
                slots: Mutex::new(SessionSlots::default()),
                last_error: Mutex::new(None),
                dispatch,
                stats,
            }),
            link: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Binds both sockets and starts searching for a peer.
    ///
    /// On failure nothing is left running and the state stays
    /// [`ConnectionState::Idle`].
    pub fn start_discovery(&mut self) -> Result<(), SessionError> {
        if self.link.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let config = &self.shared.config;
        let stats = &self.shared.stats;
        let discovery =
            Endpoint::bind(Channel::Discovery, config.discovery_bind(), true, stats.clone())?;
        let mut game = Endpoint::bind(Channel::Game, config.game_bind(), false, stats.clone())?;
        game.set_loss_simulation(PacketLossSimulation {
            loss_percent: config.simulated_loss_percent,
        });

        *self.shared.last_error.lock() = None;
        self.shared.slots.lock().begin_discovery();
        self.shared.running.store(true, Ordering::SeqCst);

        let mut link = Link {
            game: Arc::new(game),
            epoch: Instant::now(),
            sequence: AtomicU32::new(0),
            discovery: None,
            network: None,
        };

        let worker = NetworkWorker::new(self.shared.clone(), link.game.clone(), link.epoch);
        let spawned = spawn("network", move || worker.run()).and_then(|network| {
            link.network = Some(network);
            let worker = DiscoveryWorker::new(self.shared.clone(), discovery);
            spawn("discovery", move || worker.run())
        });

        match spawned {
            Ok(handle) => {
                link.discovery = Some(handle);
                self.link = Some(link);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                link.join();
                self.shared.slots.lock().reset();
                Err(e)
            }
        }
    }

    /// Stops both threads, closes the sockets and returns to
    /// [`ConnectionState::Idle`]. No handler runs after this returns.
    pub fn stop(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::SeqCst);
        link.join();
        drop(link);
        self.shared.slots.lock().reset();
        log::info!("session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.link.is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.slots.lock().state()
    }

    /// Our role, once a peer has been accepted.
    pub fn role(&self) -> NetworkRole {
        self.shared.slots.lock().role()
    }

    pub fn pending_peer(&self) -> Option<PeerInfo> {
        self.shared.slots.lock().pending()
    }

    /// The active peer's game endpoint, else the pending one's.
    pub fn peer_address(&self) -> Option<SocketAddrV4> {
        let slots = self.shared.slots.lock();
        slots.active().or(slots.pending().map(|peer| peer.addr))
    }

    pub fn local_address(&self) -> Ipv4Addr {
        self.shared.local_ip
    }

    /// The locally bound game socket, while running.
    pub fn game_socket_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().map(|link| link.game.local_addr())
    }

    pub fn stats(&self) -> NetworkStats {
        self.shared.stats.snapshot()
    }

    /// Most recent failure raised on a background thread.
    pub fn last_error(&self) -> Option<Arc<SessionError>> {
        self.shared.last_error.lock().clone()
    }

    pub fn accept_connection(&self) -> bool {
        let accepted = self.shared.slots.lock().accept();
        let Some(peer) = accepted else {
            return false;
        };
        log::info!("connected to {} as {}", peer.addr, peer.role.as_str());
        self.shared.dispatch.emit(SessionEvent::Connected(peer.role));
        true
    }

    pub fn decline_connection(&self) -> bool {
        let declined = self.shared.slots.lock().decline();
        let Some(peer) = declined else {
            return false;
        };
        log::info!("declined {}, searching again", peer.addr);
        true
    }

    pub fn send_input(&self, velocity: Velocity, actions: ActionFlags, move_period: f32) -> bool {
        self.send_with(|sequence| InputMessage {
            sequence,
            velocity,
            actions,
            move_period,
        })
    }

    pub fn send_game_state(&self, snapshot: &GameStateSnapshot) -> bool {
        self.send_with(|sequence| GameStateSnapshot {
            sequence,
            ..snapshot.clone()
        })
    }

    pub fn send_board_delta(&self, delta: &BoardDelta) -> bool {
        self.send_with(|sequence| BoardDelta {
            sequence,
            ..delta.clone()
        })
    }

    pub fn send_snake_state(&self, update: &SnakeStateUpdate) -> bool {
        self.send_with(|sequence| SnakeStateUpdate {
            sequence,
            ..update.clone()
        })
    }

    /// Sends the command back to back `start_command_repeats` times. Receivers
    /// see every copy that arrives.
    pub fn send_start_command(&self, kind: StartKind) -> bool {
        let Some((link, peer)) = self.route() else {
            return false;
        };
        let frame = StartCommand { kind }.encode();
        let mut any = false;
        for _ in 0..self.shared.config.start_command_repeats.max(1) {
            any |= link.game.send_to(&frame, peer);
        }
        any
    }

    pub fn send_heartbeat(&self) -> bool {
        let Some((link, peer)) = self.route() else {
            return false;
        };
        let timestamp_ms = link.epoch.elapsed().as_millis() as u64;
        let frame = Heartbeat {
            kind: HeartbeatKind::Ping,
            timestamp_ms,
        }
        .encode();
        link.game.send_to(&frame, peer)
    }

    fn route(&self) -> Option<(&Link, SocketAddr)> {
        let link = self.link.as_ref()?;
        let peer = self.shared.slots.lock().active()?;
        Some((link, SocketAddr::V4(peer)))
    }

    fn send_with<M: Message>(&self, build: impl FnOnce(u32) -> M) -> bool {
        let Some((link, peer)) = self.route() else {
            return false;
        };
        let frame = build(link.next_sequence()).encode();
        link.game.send_to(&frame, peer)
    }

    /// Events published since the last drain, oldest first.
    pub fn drain_events(&self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.shared.dispatch.drain()
    }

    pub fn clear_handlers(&self) {
        self.shared.dispatch.clear();
    }

    pub fn on_peer_detected(&self, handler: impl Fn(PeerInfo) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.peer_detected = Some(Arc::new(handler)));
    }

    pub fn on_connected(&self, handler: impl Fn(NetworkRole) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.connected = Some(Arc::new(handler)));
    }

    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.disconnected = Some(Arc::new(handler)));
    }

    pub fn on_input_received(&self, handler: impl Fn(&InputMessage) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.input = Some(Arc::new(handler)));
    }

    pub fn on_game_state_received(
        &self,
        handler: impl Fn(&GameStateSnapshot) + Send + Sync + 'static,
    ) {
        self.shared
            .dispatch
            .register(|h| h.game_state = Some(Arc::new(handler)));
    }

    pub fn on_board_delta_received(&self, handler: impl Fn(&BoardDelta) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.board_delta = Some(Arc::new(handler)));
    }

    pub fn on_snake_state_received(
        &self,
        handler: impl Fn(&SnakeStateUpdate) + Send + Sync + 'static,
    ) {
        self.shared
            .dispatch
            .register(|h| h.snake_state = Some(Arc::new(handler)));
    }

    pub fn on_game_start_received(&self, handler: impl Fn(&StartCommand) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.game_start = Some(Arc::new(handler)));
    }

    pub fn on_search_failed(&self, handler: impl Fn(Duration) + Send + Sync + 'static) {
        self.shared
            .dispatch
            .register(|h| h.search_failed = Some(Arc::new(handler)));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, SessionError> {
    std::thread::Builder::new()
        .name(format!("snakelink-{}", name))
        .spawn(body)
        .map_err(|source| SessionError::Spawn { name, source })
}
