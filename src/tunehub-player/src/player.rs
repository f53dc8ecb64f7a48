use serde::{Deserialize, Serialize};
use tunehub_core::Tags;

use crate::handle::PlayerHandle;

/// Transport state reported by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    None,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    /// Whether a `set_state` request may move a player from `self` to `target`.
    ///
    /// `None` is reachable from anywhere (the player is reset). A player that
    /// never started cannot be paused or stopped.
    pub fn can_transition_to(self, target: PlayerState) -> bool {
        use PlayerState::*;
        match (self, target) {
            (_, None) => true,
            (_, Playing) => true,
            (Playing | Paused, Paused) => true,
            (Playing | Paused | Stopped, Stopped) => true,
            _ => false,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

/// Stream state reported alongside [`PlayerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    None,
    Loading,
    Buffering,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Asset id of the player icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Last status a player reported, kept by the registry for replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub name: Option<String>,
    pub tags: Tags,
    pub state: PlayerState,
    pub stream_state: StreamState,
    /// Buffering or loading progress, 0..=100.
    pub percent: u32,
    pub position_ms: u32,
    pub duration_ms: u32,
}

/// A playback component.
///
/// Players report progress back through the [`PlayerHandle`] passed to
/// [`Player::bind`]. None of these methods are called while the core holds
/// one of its own locks, so implementations may call back into the handle.
pub trait Player: Send + Sync {
    fn info(&self) -> PlayerInfo;

    /// Start playing `path`. Returns `false` if the media cannot be played.
    fn play(&self, path: &str) -> bool;

    fn set_state(&self, state: PlayerState) -> bool;

    fn set_position(&self, _position_ms: u32) -> bool {
        false
    }

    fn position(&self) -> u32 {
        0
    }

    /// Called once after registration.
    fn bind(&self, _handle: PlayerHandle) {}

    /// Resolve an asset id (an icon or cover) to a locator.
    fn asset(&self, _id: &str) -> Option<String> {
        None
    }

    /// Apply the `[components."<id>"]` table from the configuration.
    fn configure(&self, _settings: &toml::Table) {}
}
