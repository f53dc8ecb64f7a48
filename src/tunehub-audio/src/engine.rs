use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::volume::VolumeControl;

/// Audio playback errors.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio backend unavailable: {0}")]
    Backend(String),
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Abstract audio source.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// A URL (local file via `file://` or remote). Backends may support a subset.
    Url(String),
    /// A local file path.
    File(PathBuf),
}

/// Runtime playback state for a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Playing,
    Paused,
    Completed,
    Stopped,
    Error,
}

/// Invoked once from the playback thread with the terminal state.
pub type FinishedCallback = Box<dyn FnOnce(AudioState) + Send>;

/// Everything an engine needs to start one stream.
pub struct PlaybackRequest {
    pub source: AudioSource,
    pub volume: VolumeControl,
    pub on_finished: Option<FinishedCallback>,
}

impl std::fmt::Debug for PlaybackRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackRequest")
            .field("source", &self.source)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

struct Shared {
    state: Mutex<AudioState>,
    stop: AtomicBool,
    paused: AtomicBool,
    position_ms: AtomicU64,
}

/// Handle representing an in-flight playback operation.
///
/// Dropping the handle stops playback without waiting for the thread.
pub struct AudioHandle {
    shared: Arc<Shared>,
    volume: VolumeControl,
    duration_ms: u64,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioHandle")
            .field("state", &self.state())
            .field("position_ms", &self.position_ms())
            .finish_non_exhaustive()
    }
}

impl AudioHandle {
    pub(crate) fn spawn_simulated(request: PlaybackRequest, duration: Duration) -> AudioResult<Self> {
        const TICK: Duration = Duration::from_millis(50);

        let shared = Arc::new(Shared {
            state: Mutex::new(AudioState::Playing),
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            position_ms: AtomicU64::new(0),
        });
        let duration_ms = duration.as_millis() as u64;
        let worker = shared.clone();
        let on_finished = request.on_finished;

        let join = thread::Builder::new()
            .name("tunehub-audio".into())
            .spawn(move || {
                let tick_ms = TICK.as_millis() as u64;
                let outcome = loop {
                    if worker.stop.load(Ordering::SeqCst) {
                        break AudioState::Stopped;
                    }
                    thread::sleep(TICK);
                    if worker.paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    let position = worker.position_ms.fetch_add(tick_ms, Ordering::SeqCst) + tick_ms;
                    if position >= duration_ms {
                        worker.position_ms.store(duration_ms, Ordering::SeqCst);
                        break AudioState::Completed;
                    }
                };
                *worker.state.lock() = outcome;
                if let Some(callback) = on_finished {
                    callback(outcome);
                }
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        tracing::debug!(source = ?request.source, gain = request.volume.gain(), "simulated playback started");
        Ok(Self {
            shared,
            volume: request.volume,
            duration_ms,
            join: Some(join),
        })
    }

    pub fn state(&self) -> AudioState {
        *self.shared.state.lock()
    }

    pub fn position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::SeqCst)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    pub fn pause(&self) -> bool {
        let mut state = self.shared.state.lock();
        match *state {
            AudioState::Playing | AudioState::Paused => {
                self.shared.paused.store(true, Ordering::SeqCst);
                *state = AudioState::Paused;
                true
            }
            _ => false,
        }
    }

    pub fn resume(&self) -> bool {
        let mut state = self.shared.state.lock();
        match *state {
            AudioState::Playing | AudioState::Paused => {
                self.shared.paused.store(false, Ordering::SeqCst);
                *state = AudioState::Playing;
                true
            }
            _ => false,
        }
    }

    /// Jump to `position_ms`, clamped to the stream duration.
    pub fn seek(&self, position_ms: u64) -> bool {
        if matches!(self.state(), AudioState::Playing | AudioState::Paused) {
            self.shared
                .position_ms
                .store(position_ms.min(self.duration_ms), Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Stop playback and wait for the playback thread, unless called from it.
    pub fn stop(mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.thread().id() != thread::current().id() && join.join().is_err() {
                tracing::warn!("audio playback thread panicked");
            }
        }
    }
}

impl Drop for AudioHandle {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }
}

/// Audio backend interface.
pub trait AudioEngine: Send + Sync {
    fn play(&self, request: PlaybackRequest) -> AudioResult<AudioHandle>;
}

/// Engine that produces no sound and simulates a fixed stream length.
///
/// Used for tests and headless environments.
#[derive(Debug, Clone)]
pub struct NullAudioEngine {
    duration: Duration,
}

impl NullAudioEngine {
    pub fn with_duration(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::with_duration(Duration::from_millis(1000))
    }
}

impl AudioEngine for NullAudioEngine {
    fn play(&self, request: PlaybackRequest) -> AudioResult<AudioHandle> {
        if let AudioSource::Url(url) = &request.source {
            if url.is_empty() {
                return Err(AudioError::UnsupportedSource("empty url".into()));
            }
        }
        AudioHandle::spawn_simulated(request, self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn request(on_finished: Option<FinishedCallback>) -> PlaybackRequest {
        PlaybackRequest {
            source: AudioSource::Url("test".into()),
            volume: VolumeControl::default(),
            on_finished,
        }
    }

    #[test]
    fn null_engine_completes() {
        let engine = NullAudioEngine::with_duration(Duration::from_millis(200));
        let (tx, rx) = mpsc::channel();
        let handle = engine
            .play(request(Some(Box::new(move |state| {
                let _ = tx.send(state);
            }))))
            .expect("null engine should succeed");
        let finished = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(finished, AudioState::Completed);
        assert_eq!(handle.state(), AudioState::Completed);
        assert_eq!(handle.position_ms(), 200);
    }

    #[test]
    fn handle_can_stop_early() {
        let engine = NullAudioEngine::default();
        let (tx, rx) = mpsc::channel();
        let handle = engine
            .play(request(Some(Box::new(move |state| {
                let _ = tx.send(state);
            }))))
            .expect("null engine should succeed");
        handle.stop();
        assert_eq!(rx.recv().unwrap(), AudioState::Stopped);
    }

    #[test]
    fn stop_survives_a_panicking_callback() {
        let engine = NullAudioEngine::default();
        let handle = engine
            .play(request(Some(Box::new(|_| panic!("listener blew up")))))
            .unwrap();
        handle.stop();
    }

    #[test]
    fn pause_holds_position() {
        let engine = NullAudioEngine::with_duration(Duration::from_secs(5));
        let handle = engine.play(request(None)).unwrap();
        assert!(handle.pause());
        let held = handle.position_ms();
        thread::sleep(Duration::from_millis(150));
        assert!(handle.position_ms() <= held + 50);
        assert_eq!(handle.state(), AudioState::Paused);
        assert!(handle.resume());
        assert!(handle.seek(10_000));
        assert!(handle.position_ms() <= 5_000);
        handle.stop();
    }

    #[test]
    fn empty_url_rejected() {
        let engine = NullAudioEngine::default();
        let result = engine.play(PlaybackRequest {
            source: AudioSource::Url(String::new()),
            volume: VolumeControl::default(),
            on_finished: None,
        });
        assert!(matches!(result, Err(AudioError::UnsupportedSource(_))));
    }
}
