use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tunehub_audio::{AudioEngine, NullAudioEngine};
use tunehub_core::{BrowserRegistry, Config, ConfigError, LoggingError};
use tunehub_player::Playback;
use tunehub_plugin::{
    LoadReport, LoadedPlugin, Plugin, PluginError, PluginHost, PluginLoader, PluginManifest,
};

static RUNNING: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum HubError {
    #[error("a hub is already running in this process")]
    AlreadyRunning,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Settings used to build a [`Hub`].
pub struct HubOptions {
    pub volume: f32,
    pub mute: bool,
    /// `[components."<id>"]` tables handed to components on registration.
    pub components: BTreeMap<String, toml::Table>,
    pub engine: Arc<dyn AudioEngine>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            mute: false,
            components: BTreeMap::new(),
            engine: Arc::new(NullAudioEngine::default()),
        }
    }
}

impl HubOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            volume: config.playback.volume,
            mute: config.playback.mute,
            components: config.components.clone(),
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.engine = engine;
        self
    }
}

/// The coordinator: owns the browser registry, the playback core, the script
/// runtime and every loaded plugin.
///
/// At most one hub exists per process. Dropping it removes every component,
/// then unloads plugins newest first.
pub struct Hub {
    browsers: Arc<BrowserRegistry>,
    playback: Playback,
    loader: PluginLoader,
    plugins: Mutex<Vec<LoadedPlugin>>,
}

impl Hub {
    pub fn new(options: HubOptions) -> Result<Self, HubError> {
        if RUNNING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HubError::AlreadyRunning);
        }
        let browsers = Arc::new(BrowserRegistry::new());
        let playback = Playback::new(options.engine, options.volume, options.mute);
        let host = PluginHost::new(browsers.clone(), playback.clone(), options.components);
        tracing::debug!("hub started");
        Ok(Self {
            browsers,
            playback,
            loader: PluginLoader::new(host),
            plugins: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, HubError> {
        Self::new(HubOptions::from_config(config))
    }

    pub fn browsers(&self) -> &Arc<BrowserRegistry> {
        &self.browsers
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Load every plugin under `root`. Failures are logged and reported,
    /// never fatal.
    pub fn load_plugins(&self, root: &Path) -> LoadReport {
        let (loaded, report) = self.loader.load_dir(root);
        self.plugins.lock().extend(loaded);
        report
    }

    /// Load a single plugin directory after startup. Returns its name.
    pub fn load_plugin(&self, dir: &Path) -> Result<String, HubError> {
        let plugin = self.loader.load_plugin(dir)?;
        let name = plugin.name().to_string();
        self.plugins.lock().push(plugin);
        Ok(name)
    }

    /// Register a statically linked plugin.
    pub fn register_builtin<F>(&self, manifest: PluginManifest, register: F) -> Result<(), HubError>
    where
        F: FnOnce(&Plugin) -> bool,
    {
        self.loader
            .register_builtin(manifest, Path::new("."), register)?;
        Ok(())
    }

    /// Names of the loaded plugins, in load order.
    pub fn plugins(&self) -> Vec<String> {
        self.plugins
            .lock()
            .iter()
            .map(|plugin| plugin.name().to_string())
            .collect()
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.playback.shutdown();
        self.browsers.clear();
        let mut plugins = std::mem::take(&mut *self.plugins.lock());
        while let Some(plugin) = plugins.pop() {
            tracing::debug!(plugin = plugin.name(), "unloading plugin");
            drop(plugin);
        }
        RUNNING.store(false, Ordering::SeqCst);
        tracing::debug!("hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunehub_core::{Browser, BrowserInfo, Request};
    use tunehub_plugin::PluginKind;

    // Hubs are process-wide; tests creating one take this lock.
    static HUB_LOCK: Mutex<()> = Mutex::new(());

    struct Idle;

    impl Browser for Idle {
        fn info(&self) -> BrowserInfo {
            BrowserInfo {
                name: "Idle".into(),
                ..BrowserInfo::default()
            }
        }

        fn handle_request(&self, _request: Request) -> bool {
            false
        }
    }

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest {
            name: name.into(),
            version: "1.0.0".into(),
            min_runtime_version: "0.1".into(),
            kind: PluginKind::Native,
            artifact_filename: String::new(),
            entry_point: "entry_point".into(),
        }
    }

    #[test]
    fn only_one_hub_at_a_time() {
        let _guard = HUB_LOCK.lock();
        let hub = Hub::new(HubOptions::default()).unwrap();
        assert!(matches!(
            Hub::new(HubOptions::default()),
            Err(HubError::AlreadyRunning)
        ));
        drop(hub);
        assert!(Hub::new(HubOptions::default()).is_ok());
    }

    #[test]
    fn teardown_removes_components() {
        let _guard = HUB_LOCK.lock();
        let hub = Hub::new(HubOptions::default()).unwrap();
        hub.register_builtin(manifest("idle"), |plugin| {
            plugin.add_browser("com.test.idle", Arc::new(Idle)).is_ok()
        })
        .unwrap();
        let browsers = hub.browsers().clone();
        assert!(browsers.has("com.test.idle"));
        drop(hub);
        assert!(browsers.is_empty());
    }

    #[test]
    fn config_seeds_volume_and_settings() {
        let _guard = HUB_LOCK.lock();
        let config: Config = toml::from_str(
            r#"
[playback]
volume = 0.4
mute = true

[components."com.test.idle"]
root = "/srv"
"#,
        )
        .unwrap();
        let hub = Hub::from_config(&config).unwrap();
        assert_eq!(hub.playback().players().volume(), 0.4);
        assert!(hub.playback().players().mute());
        hub.register_builtin(manifest("idle"), |plugin| {
            plugin.settings("com.test.idle").is_some()
        })
        .unwrap();
    }

    #[test]
    fn plugins_directory_is_loaded() {
        let _guard = HUB_LOCK.lock();
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("hello");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("manifest.toml"),
            r#"
name = "hello"
version = "0.1.0"
min_runtime_version = "0.1"
kind = "embedded"
artifact_filename = "hello.rhai"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("hello.rhai"),
            r#"
fn entry_point(plugin) {
    plugin.add_browser("com.test.hello", #{ name: "Hello", handle_request: |payload| "hello" })
}
"#,
        )
        .unwrap();

        let hub = Hub::new(HubOptions::default()).unwrap();
        let report = hub.load_plugins(root.path());
        assert_eq!(report.loaded, vec!["hello".to_string()]);
        assert_eq!(hub.plugins(), vec!["hello".to_string()]);
        assert!(hub.browsers().has("com.test.hello"));
        assert!(matches!(hub.load_plugin(&dir), Err(HubError::Plugin(_))));
    }
}
