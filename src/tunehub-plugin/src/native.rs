//! Native plugins: shared libraries exporting an entry point.
//!
//! The entry point receives a `&Plugin` and returns `true` on success. Both
//! sides must be built against the same `tunehub-plugin`; use
//! [`export_plugin!`](crate::export_plugin) to emit the symbol.

use crate::error::PluginError;
use crate::plugin::Plugin;
use libloading::{Library, Symbol};
use std::fmt;
use std::path::{Path, PathBuf};

/// Signature of the symbol named by the manifest's `entry_point`.
pub type PluginEntryPoint = unsafe extern "C" fn(plugin: &Plugin) -> bool;

/// An opened plugin library. Dropping it unloads the library, so it must
/// outlive every component the plugin registered.
pub struct NativeLibrary {
    name: String,
    path: PathBuf,
    _lib: Library,
}

impl NativeLibrary {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

pub(crate) fn load_native(plugin: &Plugin) -> Result<NativeLibrary, PluginError> {
    let manifest = plugin.manifest();
    let path = manifest.artifact_path(plugin.dir());
    if !path.is_file() {
        return Err(PluginError::ArtifactMissing { path });
    }

    // SAFETY: opening a library runs its initialisers; plugin directories are
    // trusted by configuration.
    let lib = unsafe { Library::new(&path) }.map_err(|source| PluginError::LibraryOpen {
        path: path.clone(),
        source,
    })?;

    let accepted = {
        // SAFETY: the entry point type is fixed by `export_plugin!`.
        let entry: Symbol<PluginEntryPoint> =
            unsafe { lib.get(manifest.entry_point.as_bytes()) }.map_err(|source| {
                PluginError::SymbolMissing {
                    symbol: manifest.entry_point.clone(),
                    source,
                }
            })?;
        tracing::debug!(plugin = %manifest.name, path = %path.display(), "calling native entry point");
        // SAFETY: `plugin` outlives the call and the symbol stays valid while
        // `lib` is loaded.
        unsafe { entry(plugin) }
    };

    if !accepted {
        plugin.rollback();
        return Err(PluginError::EntryPointFailed {
            name: manifest.name.clone(),
        });
    }
    Ok(NativeLibrary {
        name: manifest.name.clone(),
        path,
        _lib: lib,
    })
}

/// Export `$register: fn(&Plugin) -> bool` as the default `entry_point`
/// symbol of a native plugin. Panics are caught and reported as failure.
#[macro_export]
macro_rules! export_plugin {
    ($register:path) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn entry_point(plugin: &$crate::Plugin) -> bool {
            ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $register(plugin)))
                .unwrap_or(false)
        }
    };
}
