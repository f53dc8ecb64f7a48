use crate::manifest::PluginManifest;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tunehub_core::{Browser, BrowserRegistry, ComponentKind, CoreResult};
use tunehub_player::{Playback, Player};

/// What a plugin may register into: the browser registry, the playback core
/// and the per-component settings tables.
#[derive(Clone)]
pub struct PluginHost {
    browsers: Arc<BrowserRegistry>,
    playback: Playback,
    settings: Arc<BTreeMap<String, toml::Table>>,
}

impl PluginHost {
    pub fn new(
        browsers: Arc<BrowserRegistry>,
        playback: Playback,
        settings: BTreeMap<String, toml::Table>,
    ) -> Self {
        Self {
            browsers,
            playback,
            settings: Arc::new(settings),
        }
    }

    pub fn browsers(&self) -> &Arc<BrowserRegistry> {
        &self.browsers
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }
}

/// Capability handed to a plugin entry point.
///
/// Registrations take effect immediately. Components registered through a
/// plugin whose entry point then fails are removed again.
#[derive(Clone)]
pub struct Plugin {
    manifest: Arc<PluginManifest>,
    dir: PathBuf,
    host: PluginHost,
    registered: Arc<Mutex<Vec<(ComponentKind, String)>>>,
}

impl Plugin {
    pub fn new(manifest: PluginManifest, dir: &Path, host: PluginHost) -> Self {
        Self {
            manifest: Arc::new(manifest),
            dir: dir.to_path_buf(),
            host,
            registered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Directory the plugin was loaded from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The `[components."<id>"]` table, if configured.
    pub fn settings(&self, id: &str) -> Option<&toml::Table> {
        self.host.settings.get(id)
    }

    pub fn add_browser(&self, id: &str, browser: Arc<dyn Browser>) -> CoreResult<()> {
        if let Some(settings) = self.settings(id) {
            browser.configure(settings);
        }
        if let Err(err) = self.host.browsers.add(id, browser) {
            tracing::error!(plugin = %self.name(), browser_id = id, error = %err, "failed to add browser");
            return Err(err);
        }
        self.registered
            .lock()
            .push((ComponentKind::Browser, id.to_string()));
        Ok(())
    }

    pub fn remove_browser(&self, id: &str) -> CoreResult<()> {
        self.host.browsers.remove(id)?;
        self.forget(ComponentKind::Browser, id);
        Ok(())
    }

    pub fn add_player(&self, id: &str, player: Arc<dyn Player>) -> CoreResult<()> {
        if let Some(settings) = self.settings(id) {
            player.configure(settings);
        }
        if let Err(err) = self.host.playback.add_player(id, player) {
            tracing::error!(plugin = %self.name(), player_id = id, error = %err, "failed to add player");
            return Err(err);
        }
        self.registered
            .lock()
            .push((ComponentKind::Player, id.to_string()));
        Ok(())
    }

    pub fn remove_player(&self, id: &str) -> CoreResult<()> {
        self.host.playback.remove_player(id)?;
        self.forget(ComponentKind::Player, id);
        Ok(())
    }

    /// Components currently registered through this plugin, oldest first.
    pub fn registrations(&self) -> Vec<(ComponentKind, String)> {
        self.registered.lock().clone()
    }

    /// Undo every registration, newest first.
    pub(crate) fn rollback(&self) {
        let registered = std::mem::take(&mut *self.registered.lock());
        for (kind, id) in registered.into_iter().rev() {
            let result = match kind {
                ComponentKind::Browser => self.host.browsers.remove(&id),
                ComponentKind::Player => self.host.playback.remove_player(&id),
            };
            if let Err(err) = result {
                tracing::warn!(plugin = %self.name(), %kind, id = %id, error = %err, "rollback failed");
            }
        }
    }

    fn forget(&self, kind: ComponentKind, id: &str) {
        self.registered
            .lock()
            .retain(|(k, registered)| !(*k == kind && registered == id));
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.manifest.name)
            .field("dir", &self.dir)
            .finish()
    }
}
