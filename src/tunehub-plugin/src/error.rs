use std::path::PathBuf;
use thiserror::Error;

/// Reasons a single plugin failed to load.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no manifest.toml in {dir}")]
    MissingManifest { dir: PathBuf },
    #[error("plugin requires runtime {required}, running {running}")]
    UnsupportedRuntime { required: String, running: String },
    #[error("invalid version string {value:?}")]
    InvalidVersion { value: String },
    #[error("plugin artifact not found: {path}")]
    ArtifactMissing { path: PathBuf },
    #[error("failed to open library {path}: {source}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("missing entry point symbol `{symbol}`: {source}")]
    SymbolMissing {
        symbol: String,
        #[source]
        source: libloading::Error,
    },
    #[error("failed to compile script {path}: {message}")]
    ScriptCompile { path: PathBuf, message: String },
    #[error("script entry point `{name}` failed: {message}")]
    ScriptEntryPoint { name: String, message: String },
    #[error("entry point of plugin {name} returned false")]
    EntryPointFailed { name: String },
}
