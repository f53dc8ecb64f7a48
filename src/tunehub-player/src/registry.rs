//! Registry of players, the current player and the process-wide volume.
//!
//! Exactly one registered player may be *current*: it is the one whose media,
//! status and position are broadcast to listeners and whose sinks follow the
//! process-wide volume and mute. Reports from other players only update their
//! stored status.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::Arc;
use tunehub_audio::{AudioEngine, AudioSink, VolumeControl};
use tunehub_core::{ComponentKind, CoreError, CoreResult, EventSet, Listener, Message, Tags};

use crate::event::PlayerEvent;
use crate::player::{Player, PlayerInfo, PlayerState, PlayerStatus, StreamState};

pub(crate) struct PlayerSlot {
    pub(crate) id: String,
    pub(crate) player: Arc<dyn Player>,
    info: PlayerInfo,
    seq: u64,
    status: Mutex<PlayerStatus>,
    sinks: Mutex<Vec<VolumeControl>>,
}

impl PlayerSlot {
    pub(crate) fn status(&self) -> PlayerStatus {
        self.status.lock().clone()
    }
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<String, Arc<PlayerSlot>>,
    current: Option<Arc<PlayerSlot>>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Mixer {
    volume: f32,
    mute: bool,
}

pub struct PlayerRegistry {
    slots: Mutex<Slots>,
    events: EventSet,
    // Held while an update is stored and broadcast, so listeners see
    // updates in the order they were applied. Never held across calls into
    // player code.
    emit: ReentrantMutex<()>,
    mixer: Mutex<Mixer>,
    controls: Mutex<(bool, bool)>,
    engine: Arc<dyn AudioEngine>,
}

impl PlayerRegistry {
    pub fn new(engine: Arc<dyn AudioEngine>, volume: f32, mute: bool) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            events: EventSet::new(),
            emit: ReentrantMutex::new(()),
            mixer: Mutex::new(Mixer {
                volume: clamp_volume(volume),
                mute,
            }),
            controls: Mutex::new((false, false)),
            engine,
        }
    }

    pub(crate) fn insert(&self, id: &str, player: Arc<dyn Player>) -> CoreResult<Arc<PlayerSlot>> {
        if !tunehub_core::is_valid_id(id) {
            return Err(CoreError::InvalidId { id: id.to_string() });
        }
        let info = player.info();
        let _emit = self.emit.lock();
        let slot = {
            let mut slots = self.slots.lock();
            if slots.by_id.contains_key(id) {
                return Err(CoreError::AlreadyRegistered {
                    kind: ComponentKind::Player,
                    id: id.to_string(),
                });
            }
            let seq = slots.next_seq;
            slots.next_seq += 1;
            let slot = Arc::new(PlayerSlot {
                id: id.to_string(),
                player,
                info: info.clone(),
                seq,
                status: Mutex::new(PlayerStatus::default()),
                sinks: Mutex::new(Vec::new()),
            });
            slots.by_id.insert(id.to_string(), slot.clone());
            slot
        };
        tracing::info!(player_id = id, name = %info.name, "player registered");
        self.broadcast(&PlayerEvent::Added {
            id: id.to_string(),
            info,
        });
        Ok(slot)
    }

    /// Unregister a player. If it was current, no player is current afterwards.
    pub fn remove(&self, id: &str) -> CoreResult<()> {
        let _emit = self.emit.lock();
        {
            let mut slots = self.slots.lock();
            let slot = slots.by_id.remove(id).ok_or_else(|| not_registered(id))?;
            if slots
                .current
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                slots.current = None;
            }
        }
        tracing::info!(player_id = id, "player removed");
        self.broadcast(&PlayerEvent::Removed { id: id.to_string() });
        Ok(())
    }

    /// Remove every player, newest first.
    pub fn clear(&self) {
        let _emit = self.emit.lock();
        let mut ids: Vec<String> = self.ordered().into_iter().map(|slot| slot.id.clone()).collect();
        ids.reverse();
        for id in ids {
            if let Err(err) = self.remove(&id) {
                tracing::warn!(player_id = %id, error = %err, "failed to remove player");
            }
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.slots.lock().by_id.contains_key(id)
    }

    /// Run `f` with the registry locked, handing it a membership check. The
    /// playlist lock may be taken inside `f`; this fixes the lock order as
    /// registry first, playlist second.
    pub(crate) fn with_registered<R>(&self, f: impl FnOnce(&dyn Fn(&str) -> bool) -> R) -> R {
        let slots = self.slots.lock();
        f(&|id: &str| slots.by_id.contains_key(id))
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<dyn Player>> {
        self.slots.lock().by_id.get(id).map(|slot| slot.player.clone())
    }

    pub fn info(&self, id: &str) -> Option<PlayerInfo> {
        self.slots.lock().by_id.get(id).map(|slot| slot.info.clone())
    }

    /// Registered players in registration order.
    pub fn list(&self) -> Vec<(String, PlayerInfo)> {
        self.ordered()
            .into_iter()
            .map(|slot| (slot.id.clone(), slot.info.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_id(&self) -> Option<String> {
        self.slots.lock().current.as_ref().map(|slot| slot.id.clone())
    }

    pub fn status(&self, id: &str) -> Option<PlayerStatus> {
        self.slot(id).ok().map(|slot| slot.status())
    }

    pub fn current_status(&self) -> Option<PlayerStatus> {
        self.current().map(|slot| slot.status())
    }

    pub fn get_asset(&self, id: &str, asset: &str) -> Option<String> {
        let slot = self.slot(id).ok()?;
        slot.player.asset(asset)
    }

    pub fn volume(&self) -> f32 {
        self.mixer.lock().volume
    }

    pub fn mute(&self) -> bool {
        self.mixer.lock().mute
    }

    /// Set the process-wide volume, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        let _emit = self.emit.lock();
        self.mixer.lock().volume = clamp_volume(volume);
        self.apply_mixer();
    }

    pub fn set_mute(&self, mute: bool) {
        let _emit = self.emit.lock();
        self.mixer.lock().mute = mute;
        self.apply_mixer();
    }

    pub fn playlist_controls(&self) -> (bool, bool) {
        *self.controls.lock()
    }

    /// Attach a listener and replay the current state to it: one `added`
    /// per player, then media, status and position of the current player if
    /// any, then volume and playlist controls.
    pub fn add_event_listener(&self, listener: Listener) -> CoreResult<()> {
        let _emit = self.emit.lock();
        if !self.events.add(listener.clone()) {
            return Err(CoreError::ListenerAlreadyRegistered);
        }
        let mut replay: Vec<PlayerEvent> = self
            .ordered()
            .into_iter()
            .map(|slot| PlayerEvent::Added {
                id: slot.id.clone(),
                info: slot.info.clone(),
            })
            .collect();
        if let Some(status) = self.current_status() {
            replay.push(PlayerEvent::Media {
                name: status.name.clone(),
                tags: status.tags.clone(),
            });
            replay.push(status_event(&status));
            replay.push(PlayerEvent::Position {
                position_ms: status.position_ms,
                duration_ms: status.duration_ms,
            });
        }
        let mixer = *self.mixer.lock();
        replay.push(PlayerEvent::Volume {
            volume: mixer.volume,
            mute: mixer.mute,
        });
        let (has_prev, has_next) = self.playlist_controls();
        replay.push(PlayerEvent::PlaylistControls { has_prev, has_next });

        for event in replay {
            if let Some(message) = encode(&event) {
                listener.send(Some(&message));
            }
        }
        Ok(())
    }

    pub fn remove_event_listener(&self, listener: &Listener) {
        self.events.remove(listener);
    }

    /// Make `id` the current player and start `path` on it.
    ///
    /// A previously current player is reset to `None` first. The new media is
    /// announced, status becomes playing/loading and position is zeroed before
    /// the player is asked to play. Returns the player's answer.
    pub(crate) fn play_media(&self, id: &str, path: &str, name: Option<String>, tags: Tags) -> CoreResult<bool> {
        let slot = self.slot(id)?;
        let previous = {
            let _emit = self.emit.lock();
            self.slots.lock().current.replace(slot.clone())
        };
        let changed = previous
            .as_ref()
            .map_or(true, |previous| !Arc::ptr_eq(previous, &slot));
        if changed {
            if let Some(previous) = previous {
                previous.player.set_state(PlayerState::None);
                let mut status = previous.status.lock();
                status.state = PlayerState::None;
                status.stream_state = StreamState::None;
            }
        }

        self.update_media(&slot, name, tags);
        self.update_status(&slot, PlayerState::Playing, StreamState::Loading, 0);
        self.update_duration(&slot, 0, 0);
        if changed {
            let _emit = self.emit.lock();
            self.apply_mixer();
        }
        Ok(slot.player.play(path))
    }

    /// Ask the current player to change state and record it on success.
    pub(crate) fn set_current_state(&self, state: PlayerState) -> bool {
        let Some(slot) = self.current() else {
            return false;
        };
        if !slot.status().state.can_transition_to(state) {
            tracing::debug!(player_id = %slot.id, from = ?slot.status().state, to = ?state, "state change refused");
            return false;
        }
        if !slot.player.set_state(state) {
            return false;
        }
        self.update_state(&slot, state);
        true
    }

    /// Force the current player into `state`, used when the playlist runs out
    /// or is cleared.
    pub(crate) fn reset_current(&self, state: PlayerState) {
        if let Some(slot) = self.current() {
            slot.player.set_state(state);
            self.update_state(&slot, state);
        }
    }

    pub(crate) fn set_current_position(&self, position_ms: u32) -> bool {
        let Some(slot) = self.current() else {
            return false;
        };
        if !slot.player.set_position(position_ms) {
            return false;
        }
        self.update_position(&slot, position_ms);
        true
    }

    pub(crate) fn update_media(&self, slot: &Arc<PlayerSlot>, name: Option<String>, tags: Tags) {
        let _emit = self.emit.lock();
        let event = {
            let mut status = slot.status.lock();
            status.name = name;
            status.tags = tags;
            PlayerEvent::Media {
                name: status.name.clone(),
                tags: status.tags.clone(),
            }
        };
        self.broadcast_if_current(slot, &event);
    }

    pub(crate) fn update_tags(&self, slot: &Arc<PlayerSlot>, tags: &Tags) {
        let _emit = self.emit.lock();
        let event = {
            let mut status = slot.status.lock();
            status.tags.merge(tags);
            PlayerEvent::Media {
                name: status.name.clone(),
                tags: status.tags.clone(),
            }
        };
        self.broadcast_if_current(slot, &event);
    }

    pub(crate) fn update_state(&self, slot: &Arc<PlayerSlot>, state: PlayerState) {
        let _emit = self.emit.lock();
        let event = {
            let mut status = slot.status.lock();
            status.state = state;
            status_event(&status)
        };
        self.broadcast_if_current(slot, &event);
    }

    /// Record a stream state change. Percent is clamped to 100 and forced to
    /// 0 when the stream state is `None`. Leaving `Buffering` re-reads the
    /// player position.
    pub(crate) fn update_stream_state(&self, slot: &Arc<PlayerSlot>, stream_state: StreamState, percent: u32) {
        let left_buffering = {
            let _emit = self.emit.lock();
            let (event, left_buffering) = {
                let mut status = slot.status.lock();
                let left_buffering =
                    status.stream_state == StreamState::Buffering && stream_state != StreamState::Buffering;
                status.stream_state = stream_state;
                status.percent = match stream_state {
                    StreamState::None => 0,
                    _ => percent.min(100),
                };
                (status_event(&status), left_buffering)
            };
            self.broadcast_if_current(slot, &event);
            left_buffering
        };
        if left_buffering {
            let position = slot.player.position();
            self.update_position(slot, position);
        }
    }

    pub(crate) fn update_status(&self, slot: &Arc<PlayerSlot>, state: PlayerState, stream_state: StreamState, percent: u32) {
        slot.status.lock().state = state;
        self.update_stream_state(slot, stream_state, percent);
    }

    pub(crate) fn update_position(&self, slot: &Arc<PlayerSlot>, position_ms: u32) {
        let _emit = self.emit.lock();
        let event = {
            let mut status = slot.status.lock();
            status.position_ms = position_ms;
            position_event(&status)
        };
        self.broadcast_if_current(slot, &event);
    }

    pub(crate) fn update_duration(&self, slot: &Arc<PlayerSlot>, position_ms: u32, duration_ms: u32) {
        let _emit = self.emit.lock();
        let event = {
            let mut status = slot.status.lock();
            status.position_ms = position_ms;
            status.duration_ms = duration_ms;
            position_event(&status)
        };
        self.broadcast_if_current(slot, &event);
    }

    /// A player-reported volume change. Only the current player may move the
    /// process-wide volume.
    pub(crate) fn update_volume(&self, slot: &Arc<PlayerSlot>, volume: f32, mute: bool) {
        let _emit = self.emit.lock();
        if !self.is_current(slot) {
            return;
        }
        *self.mixer.lock() = Mixer {
            volume: clamp_volume(volume),
            mute,
        };
        self.apply_mixer();
    }

    pub(crate) fn report_error(&self, slot: &Arc<PlayerSlot>, message: &str) {
        tracing::warn!(player_id = %slot.id, error = message, "player error");
        let _emit = self.emit.lock();
        self.broadcast_if_current(
            slot,
            &PlayerEvent::Error {
                message: message.to_string(),
            },
        );
    }

    pub(crate) fn update_playlist_controls(&self, has_prev: bool, has_next: bool) {
        let _emit = self.emit.lock();
        {
            let mut controls = self.controls.lock();
            if *controls == (has_prev, has_next) {
                return;
            }
            *controls = (has_prev, has_next);
        }
        self.broadcast(&PlayerEvent::PlaylistControls { has_prev, has_next });
    }

    /// Allocate an output sink for `slot`, initialised to the process-wide
    /// volume and mute.
    pub(crate) fn get_sink(&self, slot: &Arc<PlayerSlot>, name: Option<&str>) -> AudioSink {
        let mixer = *self.mixer.lock();
        let control = VolumeControl::new(mixer.volume, mixer.mute);
        slot.sinks.lock().push(control.clone());
        let name = name.map_or_else(|| format!("{}-sink", slot.id), str::to_string);
        AudioSink::new(name, control, self.engine.clone())
    }

    pub(crate) fn slot(&self, id: &str) -> CoreResult<Arc<PlayerSlot>> {
        self.slots
            .lock()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| not_registered(id))
    }

    pub(crate) fn current(&self) -> Option<Arc<PlayerSlot>> {
        self.slots.lock().current.clone()
    }

    pub(crate) fn is_current(&self, slot: &Arc<PlayerSlot>) -> bool {
        self.slots
            .lock()
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn apply_mixer(&self) {
        let mixer = *self.mixer.lock();
        if let Some(current) = self.current() {
            for control in current.sinks.lock().iter() {
                control.set(mixer.volume, mixer.mute);
            }
        }
        self.broadcast(&PlayerEvent::Volume {
            volume: mixer.volume,
            mute: mixer.mute,
        });
    }

    fn ordered(&self) -> Vec<Arc<PlayerSlot>> {
        let mut slots: Vec<_> = self.slots.lock().by_id.values().cloned().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
    }

    fn broadcast_if_current(&self, slot: &Arc<PlayerSlot>, event: &PlayerEvent) {
        if self.is_current(slot) {
            self.broadcast(event);
        }
    }

    fn broadcast(&self, event: &PlayerEvent) {
        if let Some(message) = encode(event) {
            self.events.broadcast(Some(&message));
        }
    }
}

fn encode(event: &PlayerEvent) -> Option<Message> {
    match Message::from_json(event) {
        Ok(message) => Some(message),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode player event");
            None
        }
    }
}

fn status_event(status: &PlayerStatus) -> PlayerEvent {
    PlayerEvent::Status {
        state: status.state,
        stream_state: status.stream_state,
        percent: status.percent,
    }
}

fn position_event(status: &PlayerStatus) -> PlayerEvent {
    PlayerEvent::Position {
        position_ms: status.position_ms,
        duration_ms: status.duration_ms,
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn not_registered(id: &str) -> CoreError {
    CoreError::NotRegistered {
        kind: ComponentKind::Player,
        id: id.to_string(),
    }
}
