use std::time::Duration;

use snakelink::{
    ActionFlags, ConnectionState, InputState, NetworkRole, Session, SessionEvent, StartKind,
    SyncDue, SyncScheduler, Velocity,
};

use crate::config::PeerConfig;
use crate::game::ToyGame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warn(String),
}

/// Drives one session and the toy game the way a game loop would.
pub struct Peer {
    session: Session,
    scheduler: SyncScheduler,
    game: ToyGame,
    input: InputState,
    auto_accept: bool,
    full_snapshot_every: u32,
    syncs_since_full: u32,
}

impl Peer {
    pub fn new(config: PeerConfig) -> Self {
        let scheduler = SyncScheduler::from_config(NetworkRole::None, &config.session);
        let input = InputState {
            velocity: Velocity::LEFT,
            actions: ActionFlags::empty(),
            move_period: config.game.move_period,
        };
        Self {
            session: Session::new(config.session),
            scheduler,
            game: ToyGame::new(config.game),
            input,
            auto_accept: config.auto_accept,
            full_snapshot_every: config.game.full_snapshot_every.max(1),
            syncs_since_full: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn game(&self) -> &ToyGame {
        &self.game
    }

    pub fn start(&mut self) -> Result<(), snakelink::SessionError> {
        self.session.start_discovery()
    }

    /// Stops and searches again.
    pub fn restart_search(&mut self) -> Result<(), snakelink::SessionError> {
        self.session.stop();
        self.scheduler.set_role(NetworkRole::None);
        self.session.start_discovery()
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    pub fn accept(&mut self) -> bool {
        self.session.accept_connection()
    }

    pub fn decline(&mut self) -> bool {
        self.session.decline_connection()
    }

    fn local_player(&self) -> usize {
        match self.scheduler.role() {
            NetworkRole::Client => 1,
            _ => 0,
        }
    }

    pub fn steer(&mut self, velocity: Velocity) {
        self.input.velocity = velocity;
        if self.scheduler.role() == NetworkRole::Host {
            self.game.steer(0, velocity);
        }
    }

    pub fn press(&mut self, action: ActionFlags) {
        if action.contains(ActionFlags::FASTER) {
            self.input.move_period *= 0.8;
        }
        if action.contains(ActionFlags::SLOWER) {
            self.input.move_period *= 1.25;
        }
        self.input.actions |= action;
    }

    /// Host only: (re)starts the round on both sides.
    pub fn request_start(&mut self, notices: &mut Vec<Notice>) {
        if self.scheduler.role() != NetworkRole::Host {
            notices.push(Notice::Warn("only the host can start a round".into()));
            return;
        }
        let kind = if self.game.is_over() {
            StartKind::Restart
        } else {
            StartKind::Start
        };
        self.game.restart();
        self.syncs_since_full = 0;
        self.session.send_start_command(kind);
        self.send_snapshot();
        notices.push(Notice::Info(format!("sent {:?}", kind)));
    }

    pub fn update(&mut self, dt: Duration, notices: &mut Vec<Notice>) {
        let events: Vec<_> = self.session.drain_events().collect();
        for event in events {
            self.handle_event(event, notices);
        }

        if self.session.connection_state() != ConnectionState::Connected {
            return;
        }

        if self.scheduler.role() == NetworkRole::Host {
            let local = self.local_player();
            if !self.input.actions.is_empty() {
                let input = self.local_input_message();
                self.game.apply_input(local, &input);
            }
            self.game.step(dt.as_secs_f32());
        }

        match self.scheduler.tick(dt, &self.input) {
            Some(SyncDue::Snapshot) => self.publish(),
            Some(SyncDue::Input(input)) => {
                self.session
                    .send_input(input.velocity, input.actions, input.move_period);
            }
            None => {}
        }
        self.input.actions = ActionFlags::empty();
    }

    fn local_input_message(&self) -> snakelink::InputMessage {
        snakelink::InputMessage {
            sequence: 0,
            velocity: self.input.velocity,
            actions: self.input.actions,
            move_period: self.input.move_period,
        }
    }

    fn publish(&mut self) {
        self.syncs_since_full += 1;
        if self.syncs_since_full >= self.full_snapshot_every {
            self.send_snapshot();
            return;
        }
        if let Some(delta) = self.game.take_board_delta() {
            self.session.send_board_delta(&delta);
        }
        self.session.send_snake_state(&self.game.snake_update());
    }

    fn send_snapshot(&mut self) {
        self.syncs_since_full = 0;
        // The snapshot carries the whole board.
        while self.game.take_board_delta().is_some() {}
        self.session.send_game_state(&self.game.snapshot());
    }

    fn handle_event(&mut self, event: SessionEvent, notices: &mut Vec<Notice>) {
        let role = self.scheduler.role();
        match event {
            SessionEvent::PeerDetected(peer) => {
                notices.push(Notice::Info(format!(
                    "peer {} found, you would be {}",
                    peer.addr,
                    peer.role.as_str()
                )));
                if self.auto_accept {
                    self.accept();
                } else {
                    notices.push(Notice::Info("press 'a' to accept or 'd' to decline".into()));
                }
            }
            SessionEvent::Connected(role) => {
                self.scheduler.set_role(role);
                self.game.restart();
                self.input.velocity = match role {
                    NetworkRole::Client => Velocity::LEFT,
                    _ => Velocity::RIGHT,
                };
                notices.push(Notice::Info(format!("connected as {}", role.as_str())));
            }
            SessionEvent::Disconnected => {
                self.scheduler.set_role(NetworkRole::None);
                notices.push(Notice::Warn("peer went silent, press 'r' to search again".into()));
            }
            SessionEvent::SearchFailed(waited) => {
                notices.push(Notice::Warn(format!(
                    "no peer after {:.0}s, press 'r' to search again",
                    waited.as_secs_f32()
                )));
            }
            SessionEvent::Input(input) if role == NetworkRole::Host => {
                self.game.apply_input(1, &input);
            }
            SessionEvent::GameState(snapshot) if role == NetworkRole::Client => {
                self.game.apply_snapshot(&snapshot);
            }
            SessionEvent::SnakeState(update) if role == NetworkRole::Client => {
                self.game.apply_snake_state(&update);
            }
            SessionEvent::BoardDelta(delta) if role == NetworkRole::Client => {
                self.game.apply_board_delta(&delta);
            }
            SessionEvent::GameStart(command) if role == NetworkRole::Client => {
                // Sent more than once; restarting is idempotent until the
                // next snapshot arrives.
                self.game.restart();
                log::debug!("start command {:?}", command.kind);
            }
            other => log::trace!("ignoring {:?} as {}", other, role.as_str()),
        }
    }
}
