use std::fs;
use std::path::Path;

use std::ops::RangeInclusive;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use snakelink::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerConfig {
    pub session: SessionConfig,
    pub game: GameSettings,
    /// Accept the first peer found without asking.
    pub auto_accept: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameSettings {
    pub width: i16,
    pub height: i16,
    /// Seconds per cell at the start of a round.
    pub move_period: f32,
    pub food: usize,
    /// Every this many sync periods the host sends a full snapshot instead
    /// of a snake update plus board delta.
    pub full_snapshot_every: u32,
}

/// Board sides the toy game and the board panel can handle.
const BOARD_SIDE: RangeInclusive<i16> = 8..=200;

impl GameSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            BOARD_SIDE.contains(&self.width) && BOARD_SIDE.contains(&self.height),
            "board must be between {} and {} cells per side, got {}x{}",
            BOARD_SIDE.start(),
            BOARD_SIDE.end(),
            self.width,
            self.height
        );
        ensure!(
            self.move_period.is_finite() && self.move_period > 0.0,
            "move_period must be a positive number of seconds, got {}",
            self.move_period
        );
        Ok(())
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            width: 40,
            height: 20,
            move_period: 0.15,
            food: 5,
            full_snapshot_every: 10,
        }
    }
}

impl PeerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.game.validate()?;
        Ok(config)
    }
}
