//! Error types for the handoff.
//!
//! Every fatal stage has its own `HostError` variant so the printed diagnostic says which
//! step failed. The underlying HRESULT is carried through unmodified and becomes the
//! process exit status.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// COM-style status code returned by the hosting interface.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    /// HRESULT_FROM_WIN32(ERROR_INSUFFICIENT_BUFFER)
    pub const E_INSUFFICIENT_BUFFER: HResult = HResult(0x8007_007A_u32 as i32);

    pub fn succeeded(self) -> bool {
        self.0 >= 0
    }

    /// `Ok(())` for success codes, `Err(self)` otherwise.
    pub fn ok(self) -> Result<(), HResult> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0 as u32)
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult(0x{:08x})", self.0 as u32)
    }
}

/// OS loader failures (dlopen / LoadLibraryExW and friends).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load: {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Failed to find function {symbol} in {module}")]
    MissingSymbol { symbol: String, module: String },

    #[error("Failed to query module path: {0}")]
    ModulePath(String),

    #[error("Failed to pin {path}: {reason}")]
    Pin { path: PathBuf, reason: String },

    #[error("Path contains an interior NUL: {0}")]
    InvalidPath(PathBuf),
}

/// Fatal handoff failures. Best-effort failures (hardening) never become a `HostError`.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to locate coreclr.")]
    RuntimeNotFound,

    #[error("Failed to get coreclr module path: {0}")]
    ModulePath(#[source] LoadError),

    #[error("Failed to pin coreclr: {0}")]
    Pin(#[source] LoadError),

    #[error("Failed to determine the host directory: {0}")]
    HostDirectory(#[source] std::io::Error),

    #[error("Failed to find export {0}.")]
    ExportNotFound(&'static str),

    #[error("Failed to get IID_ICLRRuntimeHost2 ({0}).")]
    HostInterface(HResult),

    #[error("Failed to Authenticate() ({0}).")]
    Authenticate(HResult),

    #[error("Failed to Start() ({0}).")]
    Start(HResult),

    #[error("Failed to find files in the coreclr directory: {}", directory.display())]
    RuntimeFilesMissing { directory: PathBuf },

    #[error("{what} exceeds the {limit} character limit")]
    BufferOverflow { what: &'static str, limit: usize },

    #[error("TPA      {} {tpa}\nAppPaths {app_paths}\nFailed to create app domain ({hr}).", tpa.len())]
    CreateDomain {
        hr: HResult,
        tpa: String,
        app_paths: String,
    },

    #[error("Failed to create main delegate ({0}).")]
    CreateEntryPoint(HResult),
}

impl HostError {
    /// Status code handed back to the process caller.
    pub fn hresult(&self) -> HResult {
        match self {
            HostError::HostInterface(hr)
            | HostError::Authenticate(hr)
            | HostError::Start(hr)
            | HostError::CreateEntryPoint(hr)
            | HostError::CreateDomain { hr, .. } => *hr,
            HostError::BufferOverflow { .. } => HResult::E_INSUFFICIENT_BUFFER,
            HostError::RuntimeNotFound
            | HostError::ModulePath(_)
            | HostError::Pin(_)
            | HostError::HostDirectory(_)
            | HostError::ExportNotFound(_)
            | HostError::RuntimeFilesMissing { .. } => HResult::E_FAIL,
        }
    }
}
