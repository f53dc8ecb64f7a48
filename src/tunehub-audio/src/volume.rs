use parking_lot::Mutex;
use std::sync::Arc;

/// Shared volume and mute for one output sink.
///
/// Clones observe the same setting, so the core can adjust a sink the player
/// is already streaming into.
#[derive(Debug, Clone)]
pub struct VolumeControl {
    inner: Arc<Mutex<Level>>,
}

#[derive(Debug, Clone, Copy)]
struct Level {
    volume: f32,
    mute: bool,
}

impl VolumeControl {
    pub fn new(volume: f32, mute: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Level {
                volume: clamp_volume(volume),
                mute,
            })),
        }
    }

    pub fn set(&self, volume: f32, mute: bool) {
        *self.inner.lock() = Level {
            volume: clamp_volume(volume),
            mute,
        };
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().mute
    }

    /// Linear gain to apply to samples.
    pub fn gain(&self) -> f32 {
        let level = *self.inner.lock();
        if level.mute {
            0.0
        } else {
            level.volume
        }
    }

    pub fn same_as(&self, other: &VolumeControl) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

/// Clamp to [0, 1]; NaN becomes silence.
pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
