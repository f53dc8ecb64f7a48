mod engine;
mod sink;
mod volume;

pub use engine::{
    AudioEngine, AudioError, AudioHandle, AudioResult, AudioSource, AudioState, FinishedCallback,
    NullAudioEngine, PlaybackRequest,
};
pub use sink::AudioSink;
pub use volume::VolumeControl;
