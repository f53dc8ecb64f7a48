use std::fmt;
use std::sync::{Arc, Weak};
use tunehub_audio::AudioSink;
use tunehub_core::Tags;

use crate::playback::{Playback, PlaybackInner};
use crate::player::{PlayerState, StreamState};
use crate::registry::PlayerSlot;

/// Handle given to a registered player for reporting progress.
///
/// Reports from a player that is not current are stored but not broadcast.
/// Once the player is removed, or the playback core is gone, every method is a
/// no-op.
#[derive(Clone)]
pub struct PlayerHandle {
    id: Arc<str>,
    slot: Weak<PlayerSlot>,
    playback: Weak<PlaybackInner>,
}

impl PlayerHandle {
    pub(crate) fn new(slot: &Arc<PlayerSlot>, playback: &Arc<PlaybackInner>) -> Self {
        Self {
            id: Arc::from(slot.id.as_str()),
            slot: Arc::downgrade(slot),
            playback: Arc::downgrade(playback),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn parts(&self) -> Option<(Arc<PlayerSlot>, Playback)> {
        let slot = self.slot.upgrade()?;
        let playback = Playback::from_inner(self.playback.upgrade()?);
        Some((slot, playback))
    }

    pub fn is_current(&self) -> bool {
        self.parts()
            .is_some_and(|(slot, playback)| playback.players().is_current(&slot))
    }

    pub fn update_media(&self, name: Option<String>, tags: Tags) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_media(&slot, name, tags);
        }
    }

    /// Merge `tags` into the current tags.
    pub fn update_tags(&self, tags: &Tags) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_tags(&slot, tags);
        }
    }

    pub fn update_state(&self, state: PlayerState) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_state(&slot, state);
        }
    }

    pub fn update_stream_state(&self, stream_state: StreamState, percent: u32) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_stream_state(&slot, stream_state, percent);
        }
    }

    pub fn update_status(&self, state: PlayerState, stream_state: StreamState, percent: u32) {
        if let Some((slot, playback)) = self.parts() {
            playback
                .players()
                .update_status(&slot, state, stream_state, percent);
        }
    }

    pub fn update_position(&self, position_ms: u32) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_position(&slot, position_ms);
        }
    }

    pub fn update_duration(&self, position_ms: u32, duration_ms: u32) {
        if let Some((slot, playback)) = self.parts() {
            playback
                .players()
                .update_duration(&slot, position_ms, duration_ms);
        }
    }

    pub fn update_volume(&self, volume: f32, mute: bool) {
        if let Some((slot, playback)) = self.parts() {
            playback.players().update_volume(&slot, volume, mute);
        }
    }

    /// End of stream: hand off to the next media in the playlist, or stop.
    pub fn eos(&self) {
        let Some((slot, playback)) = self.parts() else {
            return;
        };
        if playback.players().is_current(&slot) && playback.advance() {
            return;
        }
        playback.players().update_state(&slot, PlayerState::Stopped);
    }

    /// Report a playback error. An active current player moves on to the
    /// next media, or stops if there is none.
    pub fn error(&self, message: &str) {
        let Some((slot, playback)) = self.parts() else {
            return;
        };
        let players = playback.players();
        players.report_error(&slot, message);
        if !players.is_current(&slot) {
            return;
        }
        if matches!(slot.status().state, PlayerState::None | PlayerState::Stopped) {
            return;
        }
        if !playback.advance() {
            players.update_state(&slot, PlayerState::Stopped);
        }
    }

    /// Allocate an output sink whose volume follows the process-wide setting
    /// while this player is current.
    pub fn get_sink(&self, name: Option<&str>) -> Option<AudioSink> {
        let (slot, playback) = self.parts()?;
        Some(playback.players().get_sink(&slot, name))
    }
}

impl fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHandle").field("id", &self.id).finish()
    }
}
