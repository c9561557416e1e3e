use std::time::Duration;

use super::state::NetworkRole;
use crate::config::SessionConfig;
use crate::net::{ActionFlags, Velocity};

/// Accumulates elapsed time and fires once per period.
///
/// Firing resets the accumulator to zero, so a long stall produces one late
/// fire rather than a burst.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
    elapsed: Duration,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            elapsed: Duration::ZERO,
        }
    }

    /// A cadence whose first `advance` fires.
    pub fn primed(period: Duration) -> Self {
        Self {
            period,
            elapsed: period,
        }
    }

    pub fn advance(&mut self, delta: Duration) -> bool {
        self.elapsed = self.elapsed.saturating_add(delta);
        if self.elapsed >= self.period {
            self.elapsed = Duration::ZERO;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

/// The client's control state as the game loop sees it this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub velocity: Velocity,
    /// One-shot actions pressed since the last frame.
    pub actions: ActionFlags,
    pub move_period: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncDue {
    /// Host: time to publish authoritative state.
    Snapshot,
    /// Client: send this input now.
    Input(InputState),
}

/// Decides when the game loop should send. Does no I/O itself.
///
/// The host gets [`SyncDue::Snapshot`] once per sync period. The client gets
/// [`SyncDue::Input`] whenever velocity or move period changes, whenever
/// one-shot actions are pending, and otherwise once per resend interval.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    role: NetworkRole,
    snapshot: Cadence,
    input_resend: Cadence,
    last_input: Option<InputState>,
}

impl SyncScheduler {
    pub fn new(role: NetworkRole, sync_period: Duration, input_resend: Duration) -> Self {
        Self {
            role,
            snapshot: Cadence::new(sync_period),
            input_resend: Cadence::new(input_resend),
            last_input: None,
        }
    }

    pub fn from_config(role: NetworkRole, config: &SessionConfig) -> Self {
        Self::new(role, config.sync_period(), config.input_resend_interval())
    }

    pub fn role(&self) -> NetworkRole {
        self.role
    }

    pub fn set_role(&mut self, role: NetworkRole) {
        if self.role != role {
            self.role = role;
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.snapshot.reset();
        self.input_resend.reset();
        self.last_input = None;
    }

    pub fn tick(&mut self, delta: Duration, input: &InputState) -> Option<SyncDue> {
        match self.role {
            NetworkRole::Host => self.snapshot.advance(delta).then_some(SyncDue::Snapshot),
            NetworkRole::Client => self.tick_client(delta, input),
            NetworkRole::None => None,
        }
    }

    fn tick_client(&mut self, delta: Duration, input: &InputState) -> Option<SyncDue> {
        let changed = match &self.last_input {
            Some(last) => {
                last.velocity != input.velocity || last.move_period != input.move_period
            }
            None => true,
        };
        let resend = self.input_resend.advance(delta);

        if !(changed || resend || !input.actions.is_empty()) {
            return None;
        }

        self.input_resend.reset();
        self.last_input = Some(*input);
        Some(SyncDue::Input(*input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn input(velocity: Velocity) -> InputState {
        InputState {
            velocity,
            actions: ActionFlags::empty(),
            move_period: 0.1,
        }
    }

    #[test]
    fn cadence_fires_once_and_resets() {
        let mut cadence = Cadence::new(Duration::from_millis(50));
        assert!(!cadence.advance(Duration::from_millis(30)));
        assert!(cadence.advance(Duration::from_millis(30)));
        assert!(!cadence.advance(Duration::from_millis(30)));
        // A long stall fires once, not repeatedly.
        assert!(cadence.advance(Duration::from_secs(2)));
        assert!(!cadence.advance(Duration::ZERO));
    }

    #[test]
    fn primed_cadence_fires_immediately() {
        let mut cadence = Cadence::primed(Duration::from_millis(500));
        assert!(cadence.advance(Duration::ZERO));
        assert!(!cadence.advance(Duration::from_millis(100)));
    }

    #[test]
    fn host_snapshots_at_sync_period() {
        let mut scheduler = SyncScheduler::new(
            NetworkRole::Host,
            Duration::from_millis(50),
            Duration::from_millis(500),
        );
        let idle = InputState::default();

        let due: Vec<_> = (0..10)
            .filter_map(|_| scheduler.tick(FRAME, &idle))
            .collect();
        // 160 ms of frames: fires at 64 ms and 128 ms.
        assert_eq!(due, vec![SyncDue::Snapshot, SyncDue::Snapshot]);
    }

    #[test]
    fn client_sends_on_change_and_resends_when_idle() {
        let mut scheduler = SyncScheduler::new(
            NetworkRole::Client,
            Duration::from_millis(50),
            Duration::from_millis(500),
        );
        let right = input(Velocity::RIGHT);

        assert_eq!(scheduler.tick(FRAME, &right), Some(SyncDue::Input(right)));
        assert_eq!(scheduler.tick(FRAME, &right), None);

        let up = input(Velocity::UP);
        assert_eq!(scheduler.tick(FRAME, &up), Some(SyncDue::Input(up)));

        let sent: usize = (0..40)
            .filter(|_| scheduler.tick(FRAME, &up).is_some())
            .count();
        // 640 ms unchanged: one liveness resend.
        assert_eq!(sent, 1);
    }

    #[test]
    fn client_sends_pending_actions_every_frame() {
        let mut scheduler = SyncScheduler::new(
            NetworkRole::Client,
            Duration::from_millis(50),
            Duration::from_millis(500),
        );
        let still = input(Velocity::STILL);
        scheduler.tick(FRAME, &still);

        let jump = InputState {
            actions: ActionFlags::JUMP,
            ..still
        };
        assert_eq!(scheduler.tick(FRAME, &jump), Some(SyncDue::Input(jump)));
        assert_eq!(scheduler.tick(FRAME, &jump), Some(SyncDue::Input(jump)));
        assert_eq!(scheduler.tick(FRAME, &still), None);
    }

    #[test]
    fn no_role_never_sends() {
        let mut scheduler = SyncScheduler::new(
            NetworkRole::None,
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        assert_eq!(scheduler.tick(Duration::from_secs(1), &input(Velocity::LEFT)), None);
    }

    #[test]
    fn role_change_restarts_cadences() {
        let mut scheduler = SyncScheduler::new(
            NetworkRole::None,
            Duration::from_millis(50),
            Duration::from_millis(500),
        );
        scheduler.set_role(NetworkRole::Host);
        assert_eq!(scheduler.tick(Duration::from_millis(49), &InputState::default()), None);
        assert_eq!(
            scheduler.tick(Duration::from_millis(1), &InputState::default()),
            Some(SyncDue::Snapshot)
        );
    }
}
