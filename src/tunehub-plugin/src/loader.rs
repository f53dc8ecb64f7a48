use crate::error::PluginError;
use crate::manifest::{PluginKind, PluginManifest, RuntimeVersion};
use crate::native::{load_native, NativeLibrary};
use crate::plugin::{Plugin, PluginHost};
use crate::script::{ScriptModule, ScriptRuntime};
use std::path::{Path, PathBuf};

/// A plugin kept alive for as long as its components may be used.
#[derive(Debug)]
pub enum LoadedPlugin {
    Native(NativeLibrary),
    Embedded(ScriptModule),
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        match self {
            LoadedPlugin::Native(lib) => lib.name(),
            LoadedPlugin::Embedded(module) => module.name(),
        }
    }
}

/// Outcome of loading a plugins directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of the plugins that loaded, in load order.
    pub loaded: Vec<String>,
    /// Plugin directories that failed, with the reason.
    pub errors: Vec<(PathBuf, PluginError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Loads plugin directories into a [`PluginHost`].
pub struct PluginLoader {
    host: PluginHost,
    scripts: ScriptRuntime,
    running: RuntimeVersion,
}

impl PluginLoader {
    pub fn new(host: PluginHost) -> Self {
        Self {
            host,
            scripts: ScriptRuntime::new(),
            running: RuntimeVersion::current(),
        }
    }

    /// Pretend to be another runtime version when checking manifests.
    pub fn with_runtime_version(mut self, running: RuntimeVersion) -> Self {
        self.running = running;
        self
    }

    pub fn host(&self) -> &PluginHost {
        &self.host
    }

    /// Load every plugin directory directly under `root`, in name order.
    ///
    /// A missing root is not an error. Failures are logged and reported;
    /// they never stop the remaining plugins from loading.
    pub fn load_dir(&self, root: &Path) -> (Vec<LoadedPlugin>, LoadReport) {
        let mut plugins = Vec::new();
        let mut report = LoadReport::default();

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %root.display(), "no plugin to load");
                return (plugins, report);
            }
            Err(err) => {
                tracing::warn!(path = %root.display(), error = %err, "cannot read plugins directory");
                return (plugins, report);
            }
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match self.load_plugin(&dir) {
                Ok(plugin) => {
                    report.loaded.push(plugin.name().to_string());
                    plugins.push(plugin);
                }
                Err(err) => report.errors.push((dir, err)),
            }
        }
        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.errors.len(),
            "plugin loading finished"
        );
        (plugins, report)
    }

    /// Load the plugin in `dir`.
    pub fn load_plugin(&self, dir: &Path) -> Result<LoadedPlugin, PluginError> {
        let result = self.try_load(dir);
        if let Err(err) = &result {
            tracing::error!(path = %dir.display(), error = %err, "failed to load plugin");
        }
        result
    }

    /// Run a statically linked plugin's registration function as if it had
    /// been loaded from `dir`.
    pub fn register_builtin<F>(
        &self,
        manifest: PluginManifest,
        dir: &Path,
        register: F,
    ) -> Result<(), PluginError>
    where
        F: FnOnce(&Plugin) -> bool,
    {
        let plugin = Plugin::new(manifest, dir, self.host.clone());
        if register(&plugin) {
            tracing::info!(plugin = %plugin.name(), "built-in plugin registered");
            return Ok(());
        }
        plugin.rollback();
        let err = PluginError::EntryPointFailed {
            name: plugin.name().to_string(),
        };
        tracing::error!(error = %err, "failed to register built-in plugin");
        Err(err)
    }

    fn try_load(&self, dir: &Path) -> Result<LoadedPlugin, PluginError> {
        let manifest = PluginManifest::load(dir)?;
        manifest.check_runtime(&self.running)?;
        tracing::info!(plugin = %manifest.name, version = %manifest.version, kind = ?manifest.kind, "loading plugin");

        let kind = manifest.kind;
        let plugin = Plugin::new(manifest, dir, self.host.clone());
        match kind {
            PluginKind::Native => load_native(&plugin).map(LoadedPlugin::Native),
            PluginKind::Embedded => self.scripts.load(&plugin).map(LoadedPlugin::Embedded),
        }
    }
}
