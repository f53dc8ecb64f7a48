//! Local files for Tunehub: a browser over a music directory and a player
//! for the files it lists.
//!
//! The browser is configured with a `root` setting:
//!
//! ```toml
//! [components."com.tunehub.files.browser"]
//! root = "/srv/music"
//! ```
//!
//! Requests are either a plain relative path to list, or JSON:
//! `{"op": "list", "path": "Artist/Album"}` or
//! `{"op": "search", "query": "intro", "limit": 20}`. Audio entries carry a
//! `media` object ready to be queued on the playlist.

mod scan;
mod tags;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tunehub_audio::{AudioHandle, AudioSource, AudioState};
use tunehub_core::{Browser, BrowserInfo, Message, Request};
use tunehub_player::{Player, PlayerHandle, PlayerInfo, PlayerState, StreamState};
use tunehub_plugin::manifest::DEFAULT_ENTRY_POINT;
use tunehub_plugin::{Plugin, PluginKind, PluginManifest, RUNTIME_VERSION};

pub use scan::{Entry, EntryKind};
pub use tags::{read_tags, ParsedTags, COVER_ASSET};

pub const BROWSER_ID: &str = "com.tunehub.files.browser";
pub const PLAYER_ID: &str = "com.tunehub.files.player";

const SINK_NAME: &str = "files";
const DEFAULT_SEARCH_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum FilesRequest {
    List {
        #[serde(default)]
        path: String,
    },
    Search {
        query: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

impl FilesRequest {
    fn parse(message: &Message) -> Self {
        message.parse_json().unwrap_or_else(|_| FilesRequest::List {
            path: message.to_text().trim().to_string(),
        })
    }
}

/// Browses the directory tree under the configured root.
pub struct FilesBrowser {
    root: RwLock<Option<PathBuf>>,
    player_id: String,
}

impl FilesBrowser {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            root: RwLock::new(None),
            player_id: player_id.into(),
        }
    }

    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        *self.root.write() = Some(root.into());
        self
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().clone()
    }

    fn list(&self, root: &std::path::Path, path: &str, request: &Request) -> bool {
        match scan::list_dir(root, path, &self.player_id) {
            Ok(entries) => respond(request, &json!({ "path": path, "entries": entries })),
            Err(err) => {
                tracing::warn!(path, error = %err, "cannot list directory");
                false
            }
        }
    }

    fn search(&self, root: PathBuf, query: String, limit: usize, request: Request) -> bool {
        let player_id = self.player_id.clone();
        let spawned = std::thread::Builder::new()
            .name("files-search".into())
            .spawn(move || {
                let entries = scan::search(&root, &query, limit, &player_id, || !request.is_canceled());
                if request.is_canceled() {
                    return;
                }
                if !respond(&request, &json!({ "query": query, "entries": entries })) {
                    request.cancel();
                }
            });
        match spawned {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(error = %err, "cannot start search");
                false
            }
        }
    }
}

fn respond(request: &Request, body: &serde_json::Value) -> bool {
    match Message::from_json(body) {
        Ok(message) => {
            request.complete(message);
            true
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode response");
            false
        }
    }
}

impl Browser for FilesBrowser {
    fn info(&self) -> BrowserInfo {
        BrowserInfo {
            name: "Files".into(),
            description: "Music files on this machine".into(),
            icon: None,
            supports_search: true,
        }
    }

    fn handle_request(&self, request: Request) -> bool {
        let Some(root) = self.root() else {
            tracing::warn!("files browser has no root configured");
            return false;
        };
        match FilesRequest::parse(request.message()) {
            FilesRequest::List { path } => self.list(&root, &path, &request),
            FilesRequest::Search { query, limit } => self.search(root, query, limit, request),
        }
    }

    fn configure(&self, settings: &toml::Table) {
        match settings.get("root").and_then(toml::Value::as_str) {
            Some(root) => {
                tracing::debug!(root, "files browser root set");
                *self.root.write() = Some(PathBuf::from(root));
            }
            None => tracing::warn!("files browser settings have no `root`"),
        }
    }
}

struct Stream {
    path: PathBuf,
    audio: AudioHandle,
}

/// Plays local files through the sink handed out by the core.
#[derive(Default)]
pub struct FilesPlayer {
    handle: Mutex<Option<PlayerHandle>>,
    stream: Mutex<Option<Stream>>,
    last_path: Mutex<Option<String>>,
    generation: Arc<AtomicU64>,
}

impl FilesPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn stop_stream(&self) {
        let stream = self.stream.lock().take();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(stream) = stream {
            stream.audio.stop();
        }
    }
}

impl Player for FilesPlayer {
    fn info(&self) -> PlayerInfo {
        PlayerInfo {
            name: "Files".into(),
            description: "Local audio files".into(),
            icon: None,
        }
    }

    fn play(&self, path: &str) -> bool {
        let Some(handle) = self.handle.lock().clone() else {
            tracing::warn!(path, "files player is not bound");
            return false;
        };
        let file = PathBuf::from(path);
        if !file.is_file() {
            tracing::warn!(path, "not a file");
            return false;
        }
        self.stop_stream();
        let Some(sink) = handle.get_sink(Some(SINK_NAME)) else {
            return false;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let reporter = handle.clone();
        let started = sink.play_with(AudioSource::File(file.clone()), move |state| {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            match state {
                AudioState::Completed => reporter.eos(),
                AudioState::Error => reporter.error("audio stream failed"),
                _ => {}
            }
        });
        let audio = match started {
            Ok(audio) => audio,
            Err(err) => {
                tracing::warn!(path, error = %err, "cannot start stream");
                return false;
            }
        };

        let parsed = read_tags(&file);
        let duration_ms = parsed
            .duration_ms
            .unwrap_or_else(|| u32::try_from(audio.duration_ms()).unwrap_or(u32::MAX));
        {
            let mut stream = self.stream.lock();
            if self.generation.load(Ordering::SeqCst) == generation {
                *stream = Some(Stream {
                    path: file,
                    audio,
                });
            }
        }
        *self.last_path.lock() = Some(path.to_string());
        handle.update_tags(&parsed.tags);
        handle.update_stream_state(StreamState::None, 0);
        handle.update_duration(0, duration_ms);
        true
    }

    fn set_state(&self, state: PlayerState) -> bool {
        match state {
            PlayerState::Playing => {
                if let Some(stream) = self.stream.lock().as_ref() {
                    return stream.audio.resume();
                }
                let last = self.last_path.lock().clone();
                last.is_some_and(|path| self.play(&path))
            }
            PlayerState::Paused => self
                .stream
                .lock()
                .as_ref()
                .is_some_and(|stream| stream.audio.pause()),
            PlayerState::Stopped | PlayerState::None => {
                self.stop_stream();
                true
            }
        }
    }

    fn set_position(&self, position_ms: u32) -> bool {
        self.stream
            .lock()
            .as_ref()
            .is_some_and(|stream| stream.audio.seek(u64::from(position_ms)))
    }

    fn position(&self) -> u32 {
        self.stream.lock().as_ref().map_or(0, |stream| {
            u32::try_from(stream.audio.position_ms()).unwrap_or(u32::MAX)
        })
    }

    fn bind(&self, handle: PlayerHandle) {
        *self.handle.lock() = Some(handle);
    }

    fn asset(&self, id: &str) -> Option<String> {
        if id != COVER_ASSET {
            return None;
        }
        let stream = self.stream.lock();
        let cover = tags::find_cover(&stream.as_ref()?.path)?;
        Some(format!("file://{}", cover.display()))
    }
}

/// Manifest used when the plugin is linked into the binary.
pub fn manifest() -> PluginManifest {
    PluginManifest {
        name: "files".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        min_runtime_version: RUNTIME_VERSION.into(),
        kind: PluginKind::Native,
        artifact_filename: format!(
            "{}files_plugin{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_SUFFIX
        ),
        entry_point: DEFAULT_ENTRY_POINT.into(),
    }
}

/// Register the files browser and player.
pub fn register(plugin: &Plugin) -> bool {
    let added = plugin
        .add_player(PLAYER_ID, Arc::new(FilesPlayer::new()))
        .and_then(|()| plugin.add_browser(BROWSER_ID, Arc::new(FilesBrowser::new(PLAYER_ID))));
    match added {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(plugin = plugin.name(), error = %err, "files plugin registration failed");
            false
        }
    }
}

tunehub_plugin::export_plugin!(register);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};
    use tunehub_audio::NullAudioEngine;
    use tunehub_core::browser_contract::{run_browser_contract, BrowserContractExpectations};
    use tunehub_core::{BrowserRegistry, Listener, Media};
    use tunehub_player::Playback;
    use tunehub_plugin::PluginHost;

    fn library() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Artist").join("Album");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("01 Intro.flac"), b"x").unwrap();
        std::fs::write(album.join("02 Song.mp3"), b"x").unwrap();
        std::fs::write(album.join("cover.jpg"), b"jpeg").unwrap();
        dir
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[derive(Clone, Default)]
    struct Frames(Arc<Mutex<Vec<Option<String>>>>);

    impl Frames {
        fn listener(&self) -> Listener {
            let frames = self.0.clone();
            Listener::new(move |msg| {
                frames.lock().push(msg.map(Message::to_text));
                true
            })
        }
    }

    #[test]
    fn browser_passes_contract() {
        let lib = library();
        let browser = Arc::new(FilesBrowser::new(PLAYER_ID).with_root(lib.path()));
        let mut expectations = BrowserContractExpectations::new(BROWSER_ID, Message::from("Artist"));
        expectations.response_contains = Some("Album".into());
        run_browser_contract(browser, &expectations).unwrap();
    }

    #[test]
    fn browser_without_root_rejects() {
        let registry = BrowserRegistry::new();
        registry
            .add(BROWSER_ID, Arc::new(FilesBrowser::new(PLAYER_ID)))
            .unwrap();
        let frames = Frames::default();
        assert!(registry
            .handle_request(BROWSER_ID, Message::from(""), frames.listener())
            .is_err());
        assert_eq!(*frames.0.lock(), vec![None]);
    }

    #[test]
    fn configure_sets_root_and_search_runs_in_background() {
        let lib = library();
        let browser = FilesBrowser::new(PLAYER_ID);
        let mut settings = toml::Table::new();
        settings.insert(
            "root".into(),
            toml::Value::String(lib.path().to_string_lossy().into_owned()),
        );
        browser.configure(&settings);
        assert_eq!(browser.root().as_deref(), Some(lib.path()));

        let registry = BrowserRegistry::new();
        registry.add(BROWSER_ID, Arc::new(browser)).unwrap();
        let frames = Frames::default();
        registry
            .handle_request(
                BROWSER_ID,
                Message::from(r#"{"op":"search","query":"intro"}"#),
                frames.listener(),
            )
            .unwrap();
        assert!(wait_for(|| frames.0.lock().contains(&None)));

        let frames = frames.0.lock().clone();
        let body: serde_json::Value = serde_json::from_str(frames[0].as_deref().unwrap()).unwrap();
        assert_eq!(body["entries"][0]["name"], "01 Intro.flac");
        assert_eq!(body["entries"][0]["media"]["player_id"], PLAYER_ID);
    }

    #[test]
    fn player_plays_until_end_of_stream() {
        let lib = library();
        let song = lib.path().join("Artist/Album/02 Song.mp3");
        let playback = Playback::new(
            Arc::new(NullAudioEngine::with_duration(Duration::from_millis(100))),
            1.0,
            false,
        );
        let player = Arc::new(FilesPlayer::new());
        playback.add_player(PLAYER_ID, player.clone()).unwrap();

        playback
            .play_media(Media::new(PLAYER_ID, song.to_string_lossy()))
            .unwrap();
        let status = playback.players().current_status().unwrap();
        assert_eq!(status.state, PlayerState::Playing);
        assert_eq!(status.stream_state, StreamState::None);
        assert_eq!(status.duration_ms, 100);
        assert_eq!(status.tags.cover.as_deref(), Some(COVER_ASSET));
        assert!(player.asset(COVER_ASSET).unwrap().ends_with("cover.jpg"));

        assert!(wait_for(|| {
            playback
                .players()
                .current_status()
                .is_some_and(|status| status.state == PlayerState::Stopped)
        }));
    }

    #[test]
    fn player_refuses_missing_files_and_pauses() {
        let lib = library();
        let song = lib.path().join("Artist/Album/01 Intro.flac");
        let playback = Playback::new(Arc::new(NullAudioEngine::default()), 1.0, false);
        let player = Arc::new(FilesPlayer::new());
        playback.add_player(PLAYER_ID, player.clone()).unwrap();

        assert!(playback
            .play_media(Media::new(PLAYER_ID, "/no/such/file.mp3"))
            .is_err());
        playback
            .play_media(Media::new(PLAYER_ID, song.to_string_lossy()))
            .unwrap();
        assert!(player.set_state(PlayerState::Paused));
        assert!(player.set_position(400));
        assert_eq!(player.position(), 400);
        assert!(player.set_state(PlayerState::Stopped));
        assert!(!player.set_state(PlayerState::Paused));
        assert!(player.set_state(PlayerState::Playing));
        assert!(player.set_state(PlayerState::None));
    }

    #[test]
    fn register_adds_both_components_with_settings() {
        let lib = library();
        let mut settings = toml::Table::new();
        settings.insert(
            "root".into(),
            toml::Value::String(lib.path().to_string_lossy().into_owned()),
        );
        let host = PluginHost::new(
            Arc::new(BrowserRegistry::new()),
            Playback::new(Arc::new(NullAudioEngine::default()), 1.0, false),
            BTreeMap::from([(BROWSER_ID.to_string(), settings)]),
        );
        let plugin = Plugin::new(manifest(), lib.path(), host.clone());
        assert!(register(&plugin));
        assert!(host.playback().players().has(PLAYER_ID));

        let frames = Frames::default();
        host.browsers()
            .handle_request(BROWSER_ID, Message::from("Artist/Album"), frames.listener())
            .unwrap();
        let frames = frames.0.lock().clone();
        assert!(frames[0].as_deref().unwrap().contains("02 Song.mp3"));

        assert!(!register(&plugin));
    }
}
