//! A minimal two-snake board, enough to have real state to synchronize.
//!
//! The host runs [`ToyGame::step`] and publishes the result. The client
//! only applies what it receives.

use std::collections::VecDeque;

use snakelink::{
    ActionFlags, BoardChange, BoardChangeKind, BoardDelta, CrashedPlayer, GameStateSnapshot,
    InputMessage, Location, MAX_BOARD_CHANGES, SnakeState, SnakeStateUpdate, Velocity,
};

use crate::config::GameSettings;

const START_LENGTH: i16 = 4;
const MIN_MOVE_PERIOD: f32 = 0.03;
const MAX_MOVE_PERIOD: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct Snake {
    body: VecDeque<Location>,
    velocity: Velocity,
    move_period: f32,
    timer: f32,
}

impl Snake {
    fn spawn(head: Location, velocity: Velocity, move_period: f32) -> Self {
        let body = (0..START_LENGTH)
            .map(|i| {
                Location::new(
                    head.x - i16::from(velocity.x) * i,
                    head.y - i16::from(velocity.y) * i,
                )
            })
            .collect();
        Self {
            body,
            velocity,
            move_period,
            timer: 0.0,
        }
    }

    fn from_wire(state: &SnakeState) -> Self {
        Self {
            body: state.segments.iter().copied().collect(),
            velocity: state.velocity,
            move_period: state.move_period,
            timer: 0.0,
        }
    }

    fn to_wire(&self) -> SnakeState {
        SnakeState {
            segments: self.body.iter().copied().collect(),
            velocity: self.velocity,
            move_period: self.move_period,
        }
    }

    pub fn head(&self) -> Option<Location> {
        self.body.front().copied()
    }

    pub fn body(&self) -> impl Iterator<Item = Location> + '_ {
        self.body.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }
}

pub struct ToyGame {
    settings: GameSettings,
    snakes: [Snake; 2],
    food: Vec<Location>,
    scores: [u16; 2],
    game_over: bool,
    crashed: CrashedPlayer,
    /// Board changes not yet published.
    changes: Vec<BoardChange>,
    seed: u64,
}

impl ToyGame {
    pub fn new(settings: GameSettings) -> Self {
        Self::with_seed(settings, random_seed())
    }

    pub fn with_seed(settings: GameSettings, seed: u64) -> Self {
        let mut game = Self {
            settings,
            snakes: Self::starting_snakes(&settings),
            food: Vec::new(),
            scores: [0; 2],
            game_over: false,
            crashed: CrashedPlayer::None,
            changes: Vec::new(),
            seed: seed | 1,
        };
        game.restart();
        game
    }

    fn starting_snakes(settings: &GameSettings) -> [Snake; 2] {
        let row = settings.height / 2;
        [
            Snake::spawn(
                Location::new(settings.width / 4, row),
                Velocity::RIGHT,
                settings.move_period,
            ),
            Snake::spawn(
                Location::new(settings.width * 3 / 4, row),
                Velocity::LEFT,
                settings.move_period,
            ),
        ]
    }

    pub fn restart(&mut self) {
        self.snakes = Self::starting_snakes(&self.settings);
        self.food.clear();
        self.scores = [0; 2];
        self.game_over = false;
        self.crashed = CrashedPlayer::None;
        for _ in 0..self.settings.food {
            self.spawn_food();
        }
        // A full snapshot follows a restart.
        self.changes.clear();
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn snakes(&self) -> &[Snake; 2] {
        &self.snakes
    }

    pub fn food(&self) -> &[Location] {
        &self.food
    }

    pub fn scores(&self) -> [u16; 2] {
        self.scores
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    pub fn crashed(&self) -> CrashedPlayer {
        self.crashed
    }

    /// Changes direction unless that would reverse into the snake's own neck.
    pub fn steer(&mut self, player: usize, velocity: Velocity) {
        let snake = &mut self.snakes[player];
        let reverse = Velocity::new(-snake.velocity.x, -snake.velocity.y);
        if velocity.is_moving() && velocity == reverse && snake.body.len() > 1 {
            return;
        }
        snake.velocity = velocity;
    }

    pub fn apply_input(&mut self, player: usize, input: &InputMessage) {
        self.steer(player, input.velocity);
        let snake = &mut self.snakes[player];
        if input.move_period.is_finite() {
            snake.move_period = input.move_period.clamp(MIN_MOVE_PERIOD, MAX_MOVE_PERIOD);
        }
        if input.actions.contains(ActionFlags::STALL) {
            snake.velocity = Velocity::STILL;
        }
        if input.actions.contains(ActionFlags::JUMP) {
            snake.timer = snake.move_period;
        }
    }

    pub fn step(&mut self, dt: f32) {
        if self.game_over {
            return;
        }

        let mut crashed = [false; 2];
        for player in 0..2 {
            let snake = &mut self.snakes[player];
            if !snake.velocity.is_moving() {
                continue;
            }
            snake.timer += dt;
            if snake.timer < snake.move_period {
                continue;
            }
            snake.timer -= snake.move_period;
            crashed[player] = !self.advance(player);
        }

        self.crashed = match crashed {
            [true, true] => CrashedPlayer::Both,
            [true, false] => CrashedPlayer::Player1,
            [false, true] => CrashedPlayer::Player2,
            [false, false] => CrashedPlayer::None,
        };
        self.game_over = self.crashed != CrashedPlayer::None;
    }

    /// Moves one cell. Returns false on a collision.
    fn advance(&mut self, player: usize) -> bool {
        let Some(head) = self.snakes[player].head() else {
            return true;
        };
        let next = self.wrap(head, self.snakes[player].velocity);
        if self.snakes.iter().any(|snake| snake.body.contains(&next)) {
            return false;
        }

        let eaten = self.food.iter().position(|food| *food == next);
        let snake = &mut self.snakes[player];
        snake.body.push_front(next);
        match eaten {
            Some(index) => {
                self.food.swap_remove(index);
                self.scores[player] = self.scores[player].saturating_add(1);
                self.record(BoardChangeKind::FoodRemoved, next);
                self.spawn_food();
            }
            None => {
                snake.body.pop_back();
            }
        }
        true
    }

    fn wrap(&self, at: Location, velocity: Velocity) -> Location {
        let GameSettings { width, height, .. } = self.settings;
        Location::new(
            (at.x + i16::from(velocity.x)).rem_euclid(width),
            (at.y + i16::from(velocity.y)).rem_euclid(height),
        )
    }

    fn spawn_food(&mut self) {
        for _ in 0..64 {
            let x = (self.next_random() % self.settings.width as u64) as i16;
            let y = (self.next_random() % self.settings.height as u64) as i16;
            let at = Location::new(x, y);
            let taken = self.food.contains(&at)
                || self.snakes.iter().any(|snake| snake.body.contains(&at));
            if !taken {
                self.food.push(at);
                self.record(BoardChangeKind::FoodAdded, at);
                return;
            }
        }
    }

    fn record(&mut self, kind: BoardChangeKind, at: Location) {
        self.changes.push(BoardChange { kind, at });
    }

    fn next_random(&mut self) -> u64 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed = x;
        x
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            sequence: 0,
            snakes: [self.snakes[0].to_wire(), self.snakes[1].to_wire()],
            scores: self.scores,
            game_over: self.game_over,
            crashed_player: self.crashed,
            food: self.food.iter().copied().collect(),
            poison: Default::default(),
            barriers: Default::default(),
        }
    }

    pub fn snake_update(&self) -> SnakeStateUpdate {
        SnakeStateUpdate {
            sequence: 0,
            snakes: [self.snakes[0].to_wire(), self.snakes[1].to_wire()],
            scores: self.scores,
            game_over: self.game_over,
            crashed_player: self.crashed,
        }
    }

    /// Up to one frame's worth of unpublished board changes.
    pub fn take_board_delta(&mut self) -> Option<BoardDelta> {
        if self.changes.is_empty() {
            return None;
        }
        let count = self.changes.len().min(MAX_BOARD_CHANGES);
        Some(BoardDelta {
            sequence: 0,
            changes: self.changes.drain(..count).collect(),
        })
    }

    pub fn apply_snapshot(&mut self, snapshot: &GameStateSnapshot) {
        self.apply_snake_state(&snapshot.snake_update());
        self.food = snapshot.food.to_vec();
    }

    pub fn apply_snake_state(&mut self, update: &SnakeStateUpdate) {
        self.snakes = [
            Snake::from_wire(&update.snakes[0]),
            Snake::from_wire(&update.snakes[1]),
        ];
        self.scores = update.scores;
        self.game_over = update.game_over;
        self.crashed = update.crashed_player;
    }

    pub fn apply_board_delta(&mut self, delta: &BoardDelta) {
        for change in &delta.changes {
            match change.kind {
                BoardChangeKind::FoodAdded => {
                    if !self.food.contains(&change.at) {
                        self.food.push(change.at);
                    }
                }
                BoardChangeKind::FoodRemoved => self.food.retain(|food| *food != change.at),
                // This board has no poison or barriers.
                _ => {}
            }
        }
    }
}

fn random_seed() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
    );
    hasher.finish()
}
