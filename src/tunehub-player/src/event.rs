use serde::{Deserialize, Serialize};
use tunehub_core::Tags;

use crate::player::{PlayerInfo, PlayerState, StreamState};

/// Payloads broadcast to player listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    Added {
        id: String,
        #[serde(flatten)]
        info: PlayerInfo,
    },
    Removed {
        id: String,
    },
    Media {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        tags: Tags,
    },
    Status {
        state: PlayerState,
        stream_state: StreamState,
        percent: u32,
    },
    Position {
        position_ms: u32,
        duration_ms: u32,
    },
    Volume {
        volume: f32,
        mute: bool,
    },
    PlaylistControls {
        has_prev: bool,
        has_next: bool,
    },
    Error {
        message: String,
    },
}

/// Payloads broadcast to playlist listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaylistEvent {
    /// A playlist was inserted at the head of the list.
    Added { playlist: usize },
    /// A whole playlist (`entry == None`) or one of its entries was removed.
    Removed {
        playlist: usize,
        entry: Option<usize>,
    },
    /// Two entries (or, with `playlist == None`, two playlists) swapped.
    Moved {
        playlist: Option<usize>,
        from: usize,
        to: usize,
    },
    Cleared,
    CurrentChanged {
        playlist: Option<usize>,
        entry: Option<usize>,
    },
    ControlsChanged { has_prev: bool, has_next: bool },
}

/// Transport requests addressed to the current player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PlayerRequest {
    SetState(PlayerState),
    SetPosition(u32),
    SetVolume(f32),
    SetMute(bool),
    PlayPrevious,
    PlayNext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_request_wire_format() {
        let request: PlayerRequest =
            serde_json::from_str(r#"{"type":"set_state","value":"paused"}"#).unwrap();
        assert_eq!(request, PlayerRequest::SetState(PlayerState::Paused));
        let request: PlayerRequest = serde_json::from_str(r#"{"type":"play_next"}"#).unwrap();
        assert_eq!(request, PlayerRequest::PlayNext);
    }

    #[test]
    fn status_event_shape() {
        let event = PlayerEvent::Status {
            state: PlayerState::Playing,
            stream_state: StreamState::Loading,
            percent: 0,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "event": "status",
                "state": "playing",
                "stream_state": "loading",
                "percent": 0
            })
        );
    }
}
