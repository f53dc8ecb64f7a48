//! Plugin manifests and runtime version checks.
//!
//! Every plugin directory carries a `manifest.toml`:
//!
//! ```toml
//! name = "files"
//! version = "1.0.0"
//! min_runtime_version = "0.1"
//! kind = "native"              # or "embedded"
//! artifact_filename = "libfiles_plugin.so"
//! entry_point = "entry_point"  # optional
//! ```

use crate::error::PluginError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MANIFEST_FILE: &str = "manifest.toml";
pub const DEFAULT_ENTRY_POINT: &str = "entry_point";

/// Version of the running plugin runtime.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// A shared library exporting the entry point symbol.
    Native,
    /// A script run by the embedded interpreter.
    Embedded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub min_runtime_version: String,
    pub kind: PluginKind,
    #[serde(alias = "filename")]
    pub artifact_filename: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl PluginManifest {
    pub fn parse(text: &str, path: &Path) -> Result<Self, PluginError> {
        toml::from_str(text).map_err(|source| PluginError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `manifest.toml` from a plugin directory.
    pub fn load(dir: &Path) -> Result<Self, PluginError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PluginError::MissingManifest {
                dir: dir.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|source| PluginError::ManifestRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text, &path)
    }

    /// Reject plugins that need a newer runtime than `running`.
    pub fn check_runtime(&self, running: &RuntimeVersion) -> Result<(), PluginError> {
        let required: RuntimeVersion = self.min_runtime_version.parse()?;
        if required > *running {
            return Err(PluginError::UnsupportedRuntime {
                required: required.to_string(),
                running: running.to_string(),
            });
        }
        Ok(())
    }

    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.artifact_filename)
    }
}

/// A `major[.minor[.patch]]` version. Pre-release and build suffixes are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuntimeVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        RUNTIME_VERSION.parse().unwrap_or(Self::new(0, 0, 0))
    }
}

impl FromStr for RuntimeVersion {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PluginError::InvalidVersion {
            value: s.to_string(),
        };
        let core = s
            .trim()
            .split(['-', '+'])
            .next()
            .filter(|core| !core.is_empty())
            .ok_or_else(invalid)?;
        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in core.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
