use serde::Serialize;
use thiserror::Error;
use tunehub_core::{CoreError, Media};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("playlist index {index} out of range ({len} playlists)")]
    InvalidPlaylist { index: usize, len: usize },
    #[error("media index {index} out of range ({len} entries)")]
    InvalidIndex { index: usize, len: usize },
    #[error("no current playlist")]
    NoCurrentPlaylist,
    #[error("playlist has no entries")]
    EmptyPlaylist,
    #[error("nothing to move to")]
    EndOfPlaylist,
    #[error("media for player {found} mixed into a playlist for {expected}")]
    MixedPlayers { expected: String, found: String },
    #[error("player {id} is not registered")]
    PlayerUnavailable { id: String },
    #[error("player {id} refused to play {path}")]
    PlaybackFailed { id: String, path: String },
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type PlaylistResult<T> = Result<T, PlaylistError>;

/// A parent media and its ordered entries.
///
/// The cursor is either parked on the parent (`None`) or points at an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    parent: Media,
    entries: Vec<Media>,
    current: Option<usize>,
}

impl Playlist {
    pub(crate) fn new(parent: Media, entries: Vec<Media>) -> PlaylistResult<Self> {
        if let Some(stray) = entries.iter().find(|m| m.player_id != parent.player_id) {
            return Err(PlaylistError::MixedPlayers {
                expected: parent.player_id.clone(),
                found: stray.player_id.clone(),
            });
        }
        Ok(Self {
            parent,
            entries,
            current: None,
        })
    }

    pub fn parent(&self) -> &Media {
        &self.parent
    }

    pub fn player_id(&self) -> &str {
        &self.parent.player_id
    }

    pub fn entries(&self) -> &[Media] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Media> {
        self.entries.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The media that plays when this playlist is current.
    pub fn playing(&self) -> &Media {
        self.current
            .and_then(|index| self.entries.get(index))
            .unwrap_or(&self.parent)
    }

    fn check_entry(&self, index: usize) -> PlaylistResult<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(PlaylistError::InvalidIndex {
                index,
                len: self.entries.len(),
            })
        }
    }

    fn swap(&mut self, src: usize, dst: usize) -> PlaylistResult<()> {
        if self.entries.is_empty() {
            return Err(PlaylistError::EmptyPlaylist);
        }
        self.check_entry(src)?;
        self.check_entry(dst)?;
        self.entries.swap(src, dst);
        self.current = follow(self.current, src, dst);
        Ok(())
    }

    /// Remove an entry. Returns `true` if the cursor was on it, in which case
    /// the cursor is parked on the parent.
    fn remove(&mut self, index: usize) -> PlaylistResult<bool> {
        self.check_entry(index)?;
        self.entries.remove(index);
        let was_current = match self.current {
            Some(current) if current == index => {
                self.current = None;
                true
            }
            Some(current) if index < current => {
                self.current = Some(current - 1);
                false
            }
            _ => false,
        };
        Ok(was_current)
    }
}

/// Where playback should go: a playlist and an entry, or its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Target {
    pub playlist: usize,
    pub entry: Option<usize>,
}

impl Target {
    fn start_of(playlist: usize, list: &Playlist) -> Self {
        Self {
            playlist,
            entry: if list.is_empty() { None } else { Some(0) },
        }
    }

    fn end_of(playlist: usize, list: &Playlist) -> Self {
        Self {
            playlist,
            entry: list.len().checked_sub(1),
        }
    }
}

/// Outcome of a structural removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Removal {
    /// The removed item was what the current player was playing.
    pub was_playing: bool,
}

/// The global list of playlists.
///
/// Index 0 is the most recently added playlist. Moving "next" across
/// playlists walks toward index 0, so playlists added after the current one
/// play after it.
#[derive(Debug, Default)]
pub(crate) struct PlaylistList {
    playlists: Vec<Playlist>,
    current: Option<usize>,
}

impl PlaylistList {
    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn get(&self, index: usize) -> Option<&Playlist> {
        self.playlists.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Playlist> {
        self.current.and_then(|index| self.playlists.get(index))
    }

    pub fn push_front(&mut self, playlist: Playlist) {
        self.playlists.insert(0, playlist);
        if let Some(current) = self.current.as_mut() {
            *current += 1;
        }
    }

    /// Point both cursors at `target` and return the media to play.
    pub fn select(&mut self, target: Target) -> PlaylistResult<Media> {
        let len = self.playlists.len();
        let playlist = self
            .playlists
            .get_mut(target.playlist)
            .ok_or(PlaylistError::InvalidPlaylist {
                index: target.playlist,
                len,
            })?;
        if let Some(entry) = target.entry {
            playlist.check_entry(entry)?;
        }
        playlist.current = target.entry;
        let media = playlist.playing().clone();
        self.current = Some(target.playlist);
        Ok(media)
    }

    /// Resolve `play(index, media_index)`: with no entry, start at entry 0 or
    /// the parent if the playlist has no entries.
    pub fn resolve(&self, playlist: usize, entry: Option<usize>) -> PlaylistResult<Target> {
        let list = self.check_playlist(playlist)?;
        match entry {
            Some(entry) => {
                list.check_entry(entry)?;
                Ok(Target {
                    playlist,
                    entry: Some(entry),
                })
            }
            None => Ok(Target::start_of(playlist, list)),
        }
    }

    pub fn next_target(&self, parent: bool) -> Option<Target> {
        let index = self.current?;
        let list = self.playlists.get(index)?;
        if !parent {
            return match list.current {
                Some(entry) if entry + 1 < list.len() => Some(Target {
                    playlist: index,
                    entry: Some(entry + 1),
                }),
                None if !list.is_empty() => Some(Target::start_of(index, list)),
                _ => None,
            };
        }
        let next = index.checked_sub(1)?;
        Some(Target::start_of(next, &self.playlists[next]))
    }

    pub fn previous_target(&self, parent: bool) -> Option<Target> {
        let index = self.current?;
        let list = self.playlists.get(index)?;
        if !parent {
            return match list.current {
                Some(entry) if entry > 0 => Some(Target {
                    playlist: index,
                    entry: Some(entry - 1),
                }),
                _ => None,
            };
        }
        let previous = index + 1;
        self.playlists
            .get(previous)
            .map(|list| Target::end_of(previous, list))
    }

    /// No entry follows the cursor in any playlist.
    pub fn exhausted(&self) -> bool {
        self.next_target(false).is_none() && self.next_target(true).is_none()
    }

    /// `(has_prev, has_next)` for the current cursor.
    pub fn controls(&self) -> (bool, bool) {
        let has_prev = self.previous_target(false).is_some() || self.previous_target(true).is_some();
        let has_next = self.next_target(false).is_some() || self.next_target(true).is_some();
        (has_prev, has_next)
    }

    pub fn swap_entries(&mut self, playlist: usize, src: usize, dst: usize) -> PlaylistResult<()> {
        self.check_playlist(playlist)?;
        self.playlists[playlist].swap(src, dst)
    }

    pub fn swap_playlists(&mut self, src: usize, dst: usize) -> PlaylistResult<()> {
        self.check_playlist(src)?;
        self.check_playlist(dst)?;
        self.playlists.swap(src, dst);
        self.current = follow(self.current, src, dst);
        Ok(())
    }

    pub fn remove_entry(&mut self, playlist: usize, entry: usize) -> PlaylistResult<Removal> {
        self.check_playlist(playlist)?;
        let on_entry = self.playlists[playlist].remove(entry)?;
        Ok(Removal {
            was_playing: on_entry && self.current == Some(playlist),
        })
    }

    /// Remove a whole playlist. When it was current no playlist is current
    /// afterwards; [`PlaylistList::successor_of_removed`] gives where to go.
    pub fn remove_playlist(&mut self, playlist: usize) -> PlaylistResult<Removal> {
        self.check_playlist(playlist)?;
        self.playlists.remove(playlist);
        let was_playing = match self.current {
            Some(current) if current == playlist => {
                self.current = None;
                true
            }
            Some(current) if playlist < current => {
                self.current = Some(current - 1);
                false
            }
            _ => false,
        };
        Ok(Removal { was_playing })
    }

    /// Target that follows the playing entry `removed` of `playlist` once it
    /// is gone: whatever slid into its place, else the next playlist.
    pub fn successor_of_removed_entry(&self, playlist: usize, removed: usize) -> Option<Target> {
        let list = self.playlists.get(playlist)?;
        if removed < list.len() {
            return Some(Target {
                playlist,
                entry: Some(removed),
            });
        }
        let next = playlist.checked_sub(1)?;
        self.playlists
            .get(next)
            .map(|list| Target::start_of(next, list))
    }

    /// Target that follows a removed current playlist at `removed`.
    pub fn successor_of_removed(&self, removed: usize) -> Option<Target> {
        let next = removed.checked_sub(1)?;
        self.playlists
            .get(next)
            .map(|list| Target::start_of(next, list))
    }

    /// Park the cursor of the current playlist on its parent.
    pub fn park(&mut self) {
        if let Some(index) = self.current {
            if let Some(list) = self.playlists.get_mut(index) {
                list.current = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.playlists.clear();
        self.current = None;
    }

    fn check_playlist(&self, index: usize) -> PlaylistResult<&Playlist> {
        self.playlists.get(index).ok_or(PlaylistError::InvalidPlaylist {
            index,
            len: self.playlists.len(),
        })
    }
}

/// Keep a cursor on the same item across a swap of `a` and `b`.
fn follow(cursor: Option<usize>, a: usize, b: usize) -> Option<usize> {
    match cursor {
        Some(c) if c == a => Some(b),
        Some(c) if c == b => Some(a),
        other => other,
    }
}
