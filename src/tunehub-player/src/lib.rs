//! Players, the current-player tracking around them, and the global playlist.
//!
//! [`Playback`] is the entry point: it owns the [`PlayerRegistry`] and the
//! playlist list, registers players and drives them from playlist navigation.
//! Player implementations report back through the [`PlayerHandle`] they are
//! bound to.

mod event;
mod handle;
mod playback;
mod player;
mod playlist;
mod registry;

pub use event::{PlayerEvent, PlayerRequest, PlaylistEvent};
pub use handle::PlayerHandle;
pub use playback::Playback;
pub use player::{Player, PlayerInfo, PlayerState, PlayerStatus, StreamState};
pub use playlist::{Playlist, PlaylistError, PlaylistResult};
pub use registry::PlayerRegistry;
