use std::fmt;
use std::sync::Arc;

use crate::engine::{AudioEngine, AudioHandle, AudioResult, AudioSource, AudioState, PlaybackRequest};
use crate::volume::VolumeControl;

/// Output sink handed to a player.
///
/// The core keeps a clone of the sink's [`VolumeControl`] and drives it from
/// the process-wide volume and mute; players only push audio through
/// [`AudioSink::play`].
#[derive(Clone)]
pub struct AudioSink {
    name: String,
    volume: VolumeControl,
    engine: Arc<dyn AudioEngine>,
}

impl AudioSink {
    pub fn new(name: impl Into<String>, volume: VolumeControl, engine: Arc<dyn AudioEngine>) -> Self {
        Self {
            name: name.into(),
            volume,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    pub fn play(&self, source: AudioSource) -> AudioResult<AudioHandle> {
        self.engine.play(PlaybackRequest {
            source,
            volume: self.volume.clone(),
            on_finished: None,
        })
    }

    /// Start playback and call `on_finished` from the playback thread once
    /// the stream completes or is stopped.
    pub fn play_with<F>(&self, source: AudioSource, on_finished: F) -> AudioResult<AudioHandle>
    where
        F: FnOnce(AudioState) + Send + 'static,
    {
        self.engine.play(PlaybackRequest {
            source,
            volume: self.volume.clone(),
            on_finished: Some(Box::new(on_finished)),
        })
    }
}

impl fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSink")
            .field("name", &self.name)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}
