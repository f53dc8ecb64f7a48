//! Plugin support for Tunehub.
//!
//! Plugins live in sub-directories of a plugins root, each described by a
//! `manifest.toml` (see [`PluginManifest`]). A plugin is either a native
//! shared library exporting an entry point (see [`export_plugin!`]) or a
//! Rhai script run by the embedded [`ScriptRuntime`]. Either way the entry
//! point receives a [`Plugin`] through which it registers browsers and
//! players.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tunehub_plugin::{PluginHost, PluginLoader};
//!
//! let loader = PluginLoader::new(PluginHost::new(browsers, playback, settings));
//! let (plugins, report) = loader.load_dir(&plugins_dir);
//! for (dir, err) in &report.errors {
//!     eprintln!("{}: {err}", dir.display());
//! }
//! ```

mod error;
mod loader;
pub mod manifest;
mod native;
mod plugin;
mod script;

pub use error::PluginError;
pub use loader::{LoadReport, LoadedPlugin, PluginLoader};
pub use manifest::{PluginKind, PluginManifest, RuntimeVersion, MANIFEST_FILE, RUNTIME_VERSION};
pub use native::{NativeLibrary, PluginEntryPoint};
pub use plugin::{Plugin, PluginHost};
pub use script::{ScriptLogLevel, ScriptModule, ScriptRuntime, SCRIPT_LOG_TARGET};
