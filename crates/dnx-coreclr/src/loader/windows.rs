//! LoadLibraryExW-based loader.
//!
//! `AddDllDirectory` / `SetDefaultDllDirectories` and `SetProcessMitigationPolicy` are
//! resolved at run time: they are missing on older Windows versions.

use std::ffi::{c_void, OsStr, OsString};
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use windows_sys::Win32::Foundation::{BOOL, HMODULE};
use windows_sys::Win32::System::LibraryLoader::{
    FreeLibrary, GetModuleFileNameW, GetModuleHandleExW, GetProcAddress, LoadLibraryExW,
    GET_MODULE_HANDLE_EX_FLAG_PIN, LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
    LOAD_LIBRARY_SEARCH_USER_DIRS,
};

use super::{LibraryLoader, RuntimeLibrary};
use crate::error::{HResult, LoadError};
use crate::native_host::{ClrRuntimeHost, GetClrRuntimeHostFn};

/// Modules that may export the DLL-directory functions, in lookup order.
const OS_LOADER_MODULES: &[&str] = &["api-ms-win-core-libraryloader-l1-1-1.dll", "kernel32.dll"];

type AddDllDirectoryFn = unsafe extern "system" fn(new_directory: *const u16) -> *mut c_void;
type SetDefaultDllDirectoriesFn = unsafe extern "system" fn(directory_flags: u32) -> BOOL;

/// Longest path GetModuleFileNameW can return.
const MAX_LONG_PATH: usize = 32 * 1024;

pub(crate) fn to_wide(s: &OsStr) -> Result<Vec<u16>, LoadError> {
    let mut wide: Vec<u16> = s.encode_wide().collect();
    if wide.contains(&0) {
        return Err(LoadError::InvalidPath(PathBuf::from(s)));
    }
    wide.push(0);
    Ok(wide)
}

/// An `HMODULE` owned by this process. Freed on drop; a pinned module stays loaded.
#[derive(Debug)]
pub struct WindowsModule {
    handle: HMODULE,
    name: String,
}

impl WindowsModule {
    fn open(path: &Path, flags: u32) -> Result<Self, LoadError> {
        let wide = to_wide(path.as_os_str())?;
        let handle = unsafe { LoadLibraryExW(wide.as_ptr(), std::ptr::null_mut(), flags) };
        if handle.is_null() {
            return Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(Self {
            handle,
            name: path.display().to_string(),
        })
    }

    pub(crate) fn proc_address(&self, symbol: &str) -> Result<*const c_void, LoadError> {
        let missing = || LoadError::MissingSymbol {
            symbol: symbol.to_string(),
            module: self.name.clone(),
        };
        let mut ascii = symbol.as_bytes().to_vec();
        ascii.push(0);
        let proc = unsafe { GetProcAddress(self.handle, ascii.as_ptr()) };
        proc.map(|f| f as *const c_void).ok_or_else(missing)
    }
}

impl Drop for WindowsModule {
    fn drop(&mut self) {
        unsafe { FreeLibrary(self.handle) };
    }
}

/// Load the first of `modules` that exports `symbol`, restricting the search to the
/// default (system) directories. Returns the module so it stays loaded while the
/// function pointer is in use.
pub(crate) fn resolve_os_function(
    modules: &[&str],
    symbol: &str,
) -> Result<(WindowsModule, *const c_void), LoadError> {
    let mut last_err = None;
    for name in modules {
        match WindowsModule::open(Path::new(name), LOAD_LIBRARY_SEARCH_DEFAULT_DIRS) {
            Ok(module) => match module.proc_address(symbol) {
                Ok(f) => return Ok((module, f)),
                Err(e) => {
                    crate::verbose_log!("{}", e);
                    last_err = Some(e);
                }
            },
            Err(e) => {
                crate::verbose_log!("{}", e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LoadError::MissingSymbol {
        symbol: symbol.to_string(),
        module: modules.join(", "),
    }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsLoader;

impl LibraryLoader for WindowsLoader {
    type Library = WindowsModule;

    fn restrict_search_path(&self, dir: &Path) -> Result<(), LoadError> {
        let (module, add_ptr) = resolve_os_function(OS_LOADER_MODULES, "AddDllDirectory")?;
        let set_ptr = module.proc_address("SetDefaultDllDirectories").map_err(|e| {
            crate::verbose_log!("{}", e);
            e
        })?;

        let add: AddDllDirectoryFn = unsafe { std::mem::transmute(add_ptr) };
        let set: SetDefaultDllDirectoriesFn = unsafe { std::mem::transmute(set_ptr) };

        let wide = to_wide(dir.as_os_str())?;
        unsafe {
            add(wide.as_ptr());
            // Dependencies of the runtime are found in the override directory, never
            // next to the application.
            set(LOAD_LIBRARY_SEARCH_DEFAULT_DIRS | LOAD_LIBRARY_SEARCH_USER_DIRS);
        }
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<WindowsModule, LoadError> {
        WindowsModule::open(path, 0)
    }
}

impl RuntimeLibrary for WindowsModule {
    type Host = ClrRuntimeHost;

    fn module_path(&self) -> Result<PathBuf, LoadError> {
        let mut buf: Vec<u16> = vec![0; 260];
        loop {
            let len = unsafe { GetModuleFileNameW(self.handle, buf.as_mut_ptr(), buf.len() as u32) }
                as usize;
            if len == 0 {
                return Err(LoadError::ModulePath(
                    std::io::Error::last_os_error().to_string(),
                ));
            }
            if len < buf.len() {
                return Ok(PathBuf::from(OsString::from_wide(&buf[..len])));
            }
            if buf.len() >= MAX_LONG_PATH {
                return Err(LoadError::ModulePath(format!(
                    "module path of {} exceeds {} characters",
                    self.name, MAX_LONG_PATH
                )));
            }
            buf.resize(buf.len() * 2, 0);
        }
    }

    fn pin(&self) -> Result<(), LoadError> {
        let path = self.module_path()?;
        let wide = to_wide(path.as_os_str())?;
        let mut ignored: HMODULE = std::ptr::null_mut();
        let ok = unsafe {
            GetModuleHandleExW(GET_MODULE_HANDLE_EX_FLAG_PIN, wide.as_ptr(), &mut ignored)
        };
        if ok == 0 {
            return Err(LoadError::Pin {
                path,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(())
    }

    fn create_host(&self, export: &str) -> Option<Result<ClrRuntimeHost, HResult>> {
        let ptr = self.proc_address(export).ok()?;
        let factory: GetClrRuntimeHostFn = unsafe { std::mem::transmute(ptr) };
        Some(unsafe { ClrRuntimeHost::from_factory(factory) })
    }
}
