//! The playlist state machine and its coupling to the player registry.

use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use tunehub_audio::AudioEngine;
use tunehub_core::{CoreError, CoreResult, EventSet, Listener, Media, Message};

use crate::event::{PlayerRequest, PlaylistEvent};
use crate::handle::PlayerHandle;
use crate::player::{Player, PlayerState};
use crate::playlist::{Playlist, PlaylistError, PlaylistList, PlaylistResult, Target};
use crate::registry::PlayerRegistry;

/// Players plus the global playlist list.
///
/// Cheap to clone; clones share state. Locks are never held while calling
/// into player code. A navigation picks its target and moves the cursor
/// under one playlist lock, so an `add_list` or `remove` racing an
/// end-of-stream cannot shift indices between the two. When both are
/// needed the player registry lock is taken before the playlist lock.
#[derive(Clone)]
pub struct Playback {
    inner: Arc<PlaybackInner>,
}

pub(crate) struct PlaybackInner {
    players: PlayerRegistry,
    playlists: Mutex<PlaylistList>,
    events: EventSet,
    emit: ReentrantMutex<()>,
}

impl Playback {
    pub fn new(engine: Arc<dyn AudioEngine>, volume: f32, mute: bool) -> Self {
        Self {
            inner: Arc::new(PlaybackInner {
                players: PlayerRegistry::new(engine, volume, mute),
                playlists: Mutex::new(PlaylistList::default()),
                events: EventSet::new(),
                emit: ReentrantMutex::new(()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<PlaybackInner>) -> Self {
        Self { inner }
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.inner.players
    }

    /// Register a player and hand it its [`PlayerHandle`].
    pub fn add_player(&self, id: &str, player: Arc<dyn Player>) -> CoreResult<()> {
        let slot = self.inner.players.insert(id, player.clone())?;
        player.bind(PlayerHandle::new(&slot, &self.inner));
        Ok(())
    }

    pub fn remove_player(&self, id: &str) -> CoreResult<()> {
        self.inner.players.remove(id)?;
        self.refresh_controls();
        Ok(())
    }

    /// Apply a JSON [`PlayerRequest`] to the current player.
    ///
    /// On success the listener receives the end-of-request marker. Returns
    /// `false` for undecodable or refused requests.
    pub fn handle_request(&self, message: &Message, listener: &Listener) -> bool {
        let request: PlayerRequest = match message.parse_json() {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "undecodable player request");
                return false;
            }
        };
        let players = &self.inner.players;
        let handled = match request {
            PlayerRequest::SetState(state) => players.set_current_state(state),
            PlayerRequest::SetPosition(position) => players.set_current_position(position),
            PlayerRequest::SetVolume(volume) => {
                players.set_volume(volume);
                true
            }
            PlayerRequest::SetMute(mute) => {
                players.set_mute(mute);
                true
            }
            PlayerRequest::PlayPrevious => self
                .navigate(|list| {
                    list.previous_target(false)
                        .or_else(|| list.previous_target(true))
                        .ok_or(PlaylistError::EndOfPlaylist)
                })
                .is_ok(),
            PlayerRequest::PlayNext => self.advance(),
        };
        if handled {
            listener.send(None);
        }
        handled
    }

    /// Prepend a singleton playlist for `media` and play it.
    pub fn play_media(&self, media: Media) -> PlaylistResult<()> {
        self.add_media(media)?;
        self.play(0, None)
    }

    /// Prepend a playlist of `entries` under `parent` and play its first entry.
    pub fn play_list(&self, parent: Media, entries: Vec<Media>) -> PlaylistResult<()> {
        self.add_list(parent, entries)?;
        self.play(0, None)
    }

    pub fn add_media(&self, media: Media) -> PlaylistResult<()> {
        self.add_list(media, Vec::new())
    }

    pub fn add_list(&self, parent: Media, entries: Vec<Media>) -> PlaylistResult<()> {
        self.require_player(&parent.player_id)?;
        let playlist = Playlist::new(parent, entries)?;
        self.inner.playlists.lock().push_front(playlist);
        self.emit(PlaylistEvent::Added { playlist: 0 });
        self.refresh_controls();
        Ok(())
    }

    /// Swap two entries of the current playlist.
    pub fn swap(&self, src: usize, dst: usize) -> PlaylistResult<()> {
        let index = self
            .inner
            .playlists
            .lock()
            .current_index()
            .ok_or(PlaylistError::NoCurrentPlaylist)?;
        self.swap_in(index, src, dst)
    }

    pub fn swap_in(&self, playlist: usize, src: usize, dst: usize) -> PlaylistResult<()> {
        self.inner.playlists.lock().swap_entries(playlist, src, dst)?;
        self.emit(PlaylistEvent::Moved {
            playlist: Some(playlist),
            from: src,
            to: dst,
        });
        self.refresh_controls();
        Ok(())
    }

    pub fn swap_playlists(&self, src: usize, dst: usize) -> PlaylistResult<()> {
        self.inner.playlists.lock().swap_playlists(src, dst)?;
        self.emit(PlaylistEvent::Moved {
            playlist: None,
            from: src,
            to: dst,
        });
        self.refresh_controls();
        Ok(())
    }

    /// Remove one entry, or the whole playlist when `entry` is `None`.
    ///
    /// Removing what is playing hands off to whatever took its place in the
    /// playlist, else to the next playlist. If there is none the current
    /// player is stopped and the cursor stays parked.
    pub fn remove(&self, playlist: usize, entry: Option<usize>) -> PlaylistResult<()> {
        let (removal, handoff) = self.inner.players.with_registered(|registered| {
            let mut list = self.inner.playlists.lock();
            let removal = match entry {
                Some(entry) => list.remove_entry(playlist, entry)?,
                None => list.remove_playlist(playlist)?,
            };
            let handoff = if removal.was_playing {
                let successor = match entry {
                    Some(entry) => list.successor_of_removed_entry(playlist, entry),
                    None => list.successor_of_removed(playlist),
                };
                successor.and_then(|target| select(&mut *list, target, registered).ok())
            } else {
                None
            };
            Ok::<_, PlaylistError>((removal, handoff))
        })?;
        self.emit(PlaylistEvent::Removed { playlist, entry });

        if removal.was_playing {
            let handed_off = handoff.is_some_and(|(target, media)| self.begin(target, media).is_ok());
            if !handed_off {
                self.stop_parked();
            }
        }
        self.refresh_controls();
        Ok(())
    }

    /// Jump to `entry` of `playlist`; with no entry, start at its first entry
    /// or at its parent when it has none.
    pub fn play(&self, playlist: usize, entry: Option<usize>) -> PlaylistResult<()> {
        self.navigate(|list| list.resolve(playlist, entry))
    }

    /// Move forward. Without `parent` only within the current playlist.
    ///
    /// When nothing follows in any playlist the current player is stopped.
    pub fn next(&self, parent: bool) -> bool {
        let mut exhausted = false;
        let moved = self.navigate(|list| {
            exhausted = list.exhausted();
            list.next_target(parent).ok_or(PlaylistError::EndOfPlaylist)
        });
        match moved {
            Ok(()) => true,
            Err(_) => {
                if exhausted {
                    self.inner.players.reset_current(PlayerState::Stopped);
                }
                false
            }
        }
    }

    /// Move back. Without `parent` only within the current playlist.
    pub fn previous(&self, parent: bool) -> bool {
        self.navigate(|list| list.previous_target(parent).ok_or(PlaylistError::EndOfPlaylist))
            .is_ok()
    }

    /// Drop every playlist and reset the current player.
    pub fn clear(&self) {
        self.inner.playlists.lock().clear();
        self.emit(PlaylistEvent::Cleared);
        self.inner.players.reset_current(PlayerState::None);
        self.refresh_controls();
    }

    /// Clear playlists and unregister every player.
    pub fn shutdown(&self) {
        self.clear();
        self.inner.players.clear();
    }

    pub fn get_playlist(&self, index: usize) -> Option<Playlist> {
        self.inner.playlists.lock().get(index).cloned()
    }

    pub fn get_current_playlist(&self) -> Option<Playlist> {
        self.inner.playlists.lock().current().cloned()
    }

    pub fn get_current_playlist_index(&self) -> Option<usize> {
        self.inner.playlists.lock().current_index()
    }

    pub fn get_playlist_count(&self) -> usize {
        self.inner.playlists.lock().len()
    }

    /// Number of entries in the current playlist.
    pub fn get_count(&self) -> usize {
        self.inner
            .playlists
            .lock()
            .current()
            .map_or(0, Playlist::len)
    }

    /// Entry `index` of the current playlist.
    pub fn get_media(&self, index: usize) -> Option<Media> {
        self.inner
            .playlists
            .lock()
            .current()
            .and_then(|playlist| playlist.get(index).cloned())
    }

    /// The media the cursor points at.
    pub fn get_current(&self) -> Option<Media> {
        self.inner
            .playlists
            .lock()
            .current()
            .map(|playlist| playlist.playing().clone())
    }

    pub fn add_event_listener(&self, listener: Listener) -> CoreResult<()> {
        if self.inner.events.add(listener) {
            Ok(())
        } else {
            Err(CoreError::ListenerAlreadyRegistered)
        }
    }

    pub fn remove_event_listener(&self, listener: &Listener) {
        self.inner.events.remove(listener);
    }

    /// Hand off after end-of-stream or an error: next entry, else next
    /// playlist.
    pub(crate) fn advance(&self) -> bool {
        self.navigate(|list| {
            list.next_target(false)
                .or_else(|| list.next_target(true))
                .ok_or(PlaylistError::EndOfPlaylist)
        })
        .is_ok()
    }

    /// Pick a target and move the cursor to it under one playlist lock, then
    /// start it.
    fn navigate<F>(&self, pick: F) -> PlaylistResult<()>
    where
        F: FnOnce(&PlaylistList) -> PlaylistResult<Target>,
    {
        let (target, media) = self.inner.players.with_registered(|registered| {
            let mut list = self.inner.playlists.lock();
            let target = pick(&*list)?;
            select(&mut *list, target, registered)
        })?;
        self.begin(target, media)
    }

    fn begin(&self, target: Target, media: Media) -> PlaylistResult<()> {
        self.emit(PlaylistEvent::CurrentChanged {
            playlist: Some(target.playlist),
            entry: target.entry,
        });
        self.refresh_controls();

        tracing::debug!(player_id = %media.player_id, path = %media.path, "starting media");
        match self
            .inner
            .players
            .play_media(&media.player_id, &media.path, media.name.clone(), media.tags.clone())
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(PlaylistError::PlaybackFailed {
                id: media.player_id,
                path: media.path,
            }),
            Err(CoreError::NotRegistered { id, .. }) => Err(PlaylistError::PlayerUnavailable { id }),
            Err(err) => Err(err.into()),
        }
    }

    fn stop_parked(&self) {
        self.inner.players.reset_current(PlayerState::Stopped);
        let current = {
            let mut list = self.inner.playlists.lock();
            list.park();
            list.current_index()
        };
        self.emit(PlaylistEvent::CurrentChanged {
            playlist: current,
            entry: None,
        });
    }

    fn require_player(&self, id: &str) -> PlaylistResult<()> {
        if self.inner.players.has(id) {
            Ok(())
        } else {
            tracing::error!(player_id = id, "player is not available");
            Err(PlaylistError::PlayerUnavailable { id: id.to_string() })
        }
    }

    fn refresh_controls(&self) {
        let (has_prev, has_next) = self.inner.playlists.lock().controls();
        if self.inner.players.playlist_controls() == (has_prev, has_next) {
            return;
        }
        self.emit(PlaylistEvent::ControlsChanged { has_prev, has_next });
        self.inner.players.update_playlist_controls(has_prev, has_next);
    }

    fn emit(&self, event: PlaylistEvent) {
        let _emit = self.inner.emit.lock();
        match Message::from_json(&event) {
            Ok(message) => self.inner.events.broadcast(Some(&message)),
            Err(err) => tracing::error!(error = %err, "failed to encode playlist event"),
        }
    }
}

fn select(
    list: &mut PlaylistList,
    target: Target,
    registered: &dyn Fn(&str) -> bool,
) -> PlaylistResult<(Target, Media)> {
    if let Some(playlist) = list.get(target.playlist) {
        let id = playlist.player_id();
        if !registered(id) {
            tracing::error!(player_id = id, "player is not available");
            return Err(PlaylistError::PlayerUnavailable { id: id.to_string() });
        }
    }
    Ok((target, list.select(target)?))
}
