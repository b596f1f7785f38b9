//! dlopen-based loader.

use std::ffi::{c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use super::{LibraryLoader, RuntimeLibrary};
use crate::error::{HResult, LoadError};
use crate::native_host::{ClrRuntimeHost, GetClrRuntimeHostFn};

#[derive(Debug, Clone, Copy, Default)]
pub struct DlLoader;

/// A `dlopen` handle. Closed on drop; a pinned module stays mapped regardless.
#[derive(Debug)]
pub struct DlModule {
    handle: *mut c_void,
    requested: PathBuf,
}

fn c_path(path: &Path) -> Result<CString, LoadError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| LoadError::InvalidPath(path.into()))
}

fn last_dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown dlopen error".to_string()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

impl LibraryLoader for DlLoader {
    type Library = DlModule;

    fn restrict_search_path(&self, dir: &Path) -> Result<(), LoadError> {
        // dlopen with an absolute path never searches the application directory;
        // dependencies follow the library's own rpath.
        tracing::debug!("search path restricted to {}", dir.display());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<DlModule, LoadError> {
        let c = c_path(path)?;
        let handle = unsafe { libc::dlopen(c.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: last_dl_error(),
            });
        }
        Ok(DlModule {
            handle,
            requested: path.to_path_buf(),
        })
    }
}

/// Absolute form of `path` as given. Symlinks are kept so a linked library still reports
/// the directory it was requested from.
fn absolute_without_resolving(path: &Path) -> Result<PathBuf, LoadError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| LoadError::ModulePath(e.to_string()))?;
    Ok(cwd.join(path))
}

impl DlModule {
    fn symbol(&self, name: &str) -> Option<*mut c_void> {
        let c = CString::new(name).ok()?;
        let sym = unsafe { libc::dlsym(self.handle, c.as_ptr()) };
        (!sym.is_null()).then_some(sym)
    }
}

impl RuntimeLibrary for DlModule {
    type Host = ClrRuntimeHost;

    fn module_path(&self) -> Result<PathBuf, LoadError> {
        if self.requested.components().count() > 1 {
            return absolute_without_resolving(&self.requested);
        }
        // Bare name: ask the dynamic linker where the factory export came from.
        let sym = self
            .symbol(crate::host::HOST_FACTORY_EXPORT)
            .ok_or_else(|| LoadError::ModulePath(last_dl_error()))?;
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::dladdr(sym as *const c_void, &mut info) };
        if ret == 0 || info.dli_fname.is_null() {
            return Err(LoadError::ModulePath(format!(
                "dladdr failed for {}",
                self.requested.display()
            )));
        }
        let fname = unsafe { CStr::from_ptr(info.dli_fname) };
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(fname.to_bytes())))
    }

    fn pin(&self) -> Result<(), LoadError> {
        let path = self.module_path()?;
        let c = c_path(&path)?;
        let pinned = unsafe {
            libc::dlopen(
                c.as_ptr(),
                libc::RTLD_NOW | libc::RTLD_NOLOAD | libc::RTLD_NODELETE,
            )
        };
        if pinned.is_null() {
            return Err(LoadError::Pin {
                path,
                reason: last_dl_error(),
            });
        }
        // The extra reference is never released.
        Ok(())
    }

    fn create_host(&self, export: &str) -> Option<Result<ClrRuntimeHost, HResult>> {
        let sym = self.symbol(export)?;
        let factory: GetClrRuntimeHostFn = unsafe { std::mem::transmute(sym) };
        Some(unsafe { ClrRuntimeHost::from_factory(factory) })
    }
}

impl Drop for DlModule {
    fn drop(&mut self) {
        unsafe { libc::dlclose(self.handle) };
    }
}
