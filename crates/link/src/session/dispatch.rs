//! Hands session events to the game.
//!
//! Two ways in, both fed by the same [`Dispatcher::emit`]:
//!
//! * handlers, invoked on whichever session thread saw the event. The table
//!   lock is held only while the handler is cloned out, so a slow handler
//!   does not stall registration. Registering handlers from inside a handler
//!   is not supported.
//! * a bounded queue of [`SessionEvent`] values the game loop drains each
//!   frame on its own thread. When the queue is full new events are dropped
//!   rather than blocking the session threads.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::state::{NetworkRole, PeerInfo};
use crate::net::{
    BoardDelta, GameStateSnapshot, InputMessage, SnakeStateUpdate, StartCommand, StatsCounters,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerDetected(PeerInfo),
    Connected(NetworkRole),
    Disconnected,
    Input(InputMessage),
    GameState(GameStateSnapshot),
    BoardDelta(BoardDelta),
    SnakeState(SnakeStateUpdate),
    GameStart(StartCommand),
    SearchFailed(Duration),
}

type Handler<F> = Option<Arc<F>>;

#[derive(Default)]
pub(crate) struct Handlers {
    pub peer_detected: Handler<dyn Fn(PeerInfo) + Send + Sync>,
    pub connected: Handler<dyn Fn(NetworkRole) + Send + Sync>,
    pub disconnected: Handler<dyn Fn() + Send + Sync>,
    pub input: Handler<dyn Fn(&InputMessage) + Send + Sync>,
    pub game_state: Handler<dyn Fn(&GameStateSnapshot) + Send + Sync>,
    pub board_delta: Handler<dyn Fn(&BoardDelta) + Send + Sync>,
    pub snake_state: Handler<dyn Fn(&SnakeStateUpdate) + Send + Sync>,
    pub game_start: Handler<dyn Fn(&StartCommand) + Send + Sync>,
    pub search_failed: Handler<dyn Fn(Duration) + Send + Sync>,
}

pub(crate) struct Dispatcher {
    handlers: Mutex<Handlers>,
    queue: Option<(Sender<SessionEvent>, Receiver<SessionEvent>)>,
    stats: Arc<StatsCounters>,
}

impl Dispatcher {
    pub fn new(queue_capacity: usize, stats: Arc<StatsCounters>) -> Self {
        Self {
            handlers: Mutex::new(Handlers::default()),
            queue: (queue_capacity > 0).then(|| crossbeam_channel::bounded(queue_capacity)),
            stats,
        }
    }

    /// Replaces handlers under the table lock.
    pub fn register(&self, apply: impl FnOnce(&mut Handlers)) {
        apply(&mut self.handlers.lock());
    }

    pub fn clear(&self) {
        *self.handlers.lock() = Handlers::default();
    }

    pub fn drain(&self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.queue.iter().flat_map(|(_, rx)| rx.try_iter())
    }

    pub fn emit(&self, event: SessionEvent) {
        self.invoke(&event);
        self.enqueue(event);
    }

    fn pick<F: ?Sized>(&self, select: impl FnOnce(&Handlers) -> Handler<F>) -> Handler<F> {
        select(&self.handlers.lock())
    }

    fn invoke(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PeerDetected(peer) => {
                if let Some(handler) = self.pick(|h| h.peer_detected.clone()) {
                    handler(*peer);
                }
            }
            SessionEvent::Connected(role) => {
                if let Some(handler) = self.pick(|h| h.connected.clone()) {
                    handler(*role);
                }
            }
            SessionEvent::Disconnected => {
                if let Some(handler) = self.pick(|h| h.disconnected.clone()) {
                    handler();
                }
            }
            SessionEvent::Input(input) => {
                if let Some(handler) = self.pick(|h| h.input.clone()) {
                    handler(input);
                }
            }
            SessionEvent::GameState(snapshot) => {
                if let Some(handler) = self.pick(|h| h.game_state.clone()) {
                    handler(snapshot);
                }
            }
            SessionEvent::BoardDelta(delta) => {
                if let Some(handler) = self.pick(|h| h.board_delta.clone()) {
                    handler(delta);
                }
            }
            SessionEvent::SnakeState(update) => {
                if let Some(handler) = self.pick(|h| h.snake_state.clone()) {
                    handler(update);
                }
            }
            SessionEvent::GameStart(command) => {
                if let Some(handler) = self.pick(|h| h.game_start.clone()) {
                    handler(command);
                }
            }
            SessionEvent::SearchFailed(waited) => {
                if let Some(handler) = self.pick(|h| h.search_failed.clone()) {
                    handler(*waited);
                }
            }
        }
    }

    fn enqueue(&self, event: SessionEvent) {
        let Some((tx, _)) = &self.queue else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.record_event_dropped();
            }
            // We hold the receiver, so the channel cannot disconnect.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
