//! Dynamic library loading.
//!
//! `LibraryLoader` is the extension point the resolver drives; `RuntimeLibrary` is what a
//! successful load hands to the host controller. The native implementations wrap
//! `dlopen`/`dlsym` (Unix) and `LoadLibraryExW`/`GetProcAddress` (Windows).

use std::path::{Path, PathBuf};

use crate::error::{HResult, LoadError};
use crate::host::RuntimeHost;

#[cfg(unix)]
mod unix;
#[cfg(target_os = "windows")]
pub(crate) mod windows;

#[cfg(unix)]
pub use unix::{DlLoader as NativeLoader, DlModule as NativeModule};
#[cfg(target_os = "windows")]
pub use windows::{WindowsLoader as NativeLoader, WindowsModule as NativeModule};

/// Loads candidate library paths for the resolver.
pub trait LibraryLoader {
    type Library;

    /// Register `dir` with the OS loader and restrict default dependency search to
    /// system and user-added directories.
    fn restrict_search_path(&self, dir: &Path) -> Result<(), LoadError>;

    /// Load `path`. A bare file name goes through the OS standard search.
    fn load(&self, path: &Path) -> Result<Self::Library, LoadError>;
}

/// A loaded runtime library.
pub trait RuntimeLibrary {
    type Host: RuntimeHost;

    /// Absolute path of the loaded module, as the OS sees it.
    fn module_path(&self) -> Result<PathBuf, LoadError>;

    /// Keep the module mapped for the rest of the process. CoreCLR does not support
    /// unload followed by reload.
    fn pin(&self) -> Result<(), LoadError>;

    /// Resolve `export` and call it to obtain the hosting interface.
    /// `None` when the export does not exist; `Some(Err(hr))` when the factory fails.
    fn create_host(&self, export: &str) -> Option<Result<Self::Host, HResult>>;
}
