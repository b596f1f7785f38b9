//! Opt-in process hardening: disallow a broad class of privileged system calls.
//!
//! Best effort. Nothing here can fail the handoff: a missing OS facility or a rejected
//! policy is logged and startup continues unhardened.

use std::io;

use serde::Serialize;

use dnx_core::config::env_keys::security;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HardeningOutcome {
    Applied,
    /// Not opted in.
    NotApplicable,
    /// Opted in, but the OS facility is missing or refused the policy.
    Unavailable,
}

/// A process-wide mitigation that can be switched on once and never off.
pub trait MitigationPolicy {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    fn apply(&self) -> io::Result<()>;
}

/// Platform mitigation: Win32k system-call disable on Windows, a seccomp filter on Linux.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMitigationPolicy;

impl MitigationPolicy for NativeMitigationPolicy {
    fn name(&self) -> &str {
        #[cfg(target_os = "windows")]
        return "ProcessSystemCallDisablePolicy";
        #[cfg(target_os = "linux")]
        return "seccomp";
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        return "unsupported";
    }

    fn apply(&self) -> io::Result<()> {
        #[cfg(target_os = "windows")]
        return win32k::disable_win32k_system_calls();
        #[cfg(target_os = "linux")]
        return crate::seccomp::apply_privileged_syscall_filter();
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no system-call mitigation on this platform",
        ))
    }
}

/// Apply `policy` when `opt_in` is exactly `"1"`.
pub fn apply(opt_in: Option<&str>, policy: &dyn MitigationPolicy) -> HardeningOutcome {
    if opt_in != Some(security::HARDENING_ENABLE_VALUE) {
        return HardeningOutcome::NotApplicable;
    }
    match policy.apply() {
        Ok(()) => {
            println!("{} successful.", security::DNX_WIN32K_DISABLE);
            tracing::debug!("mitigation {} applied", policy.name());
            HardeningOutcome::Applied
        }
        Err(e) => {
            tracing::warn!(
                "{} requested but {} could not be applied: {}",
                security::DNX_WIN32K_DISABLE,
                policy.name(),
                e
            );
            HardeningOutcome::Unavailable
        }
    }
}

#[cfg(target_os = "windows")]
mod win32k {
    use std::ffi::c_void;
    use std::io;

    use crate::loader::windows::resolve_os_function;

    const PROCESS_THREADS_MODULES: &[&str] = &["api-ms-win-core-processthreads-l1-1-1.dll"];

    /// PROCESS_MITIGATION_POLICY::ProcessSystemCallDisablePolicy
    const PROCESS_SYSTEM_CALL_DISABLE_POLICY: i32 = 4;
    const DISALLOW_WIN32K_SYSTEM_CALLS: u32 = 0x1;

    #[repr(C)]
    struct SystemCallDisablePolicy {
        flags: u32,
    }

    type SetProcessMitigationPolicyFn =
        unsafe extern "system" fn(policy: i32, buffer: *const c_void, length: usize) -> i32;

    pub(super) fn disable_win32k_system_calls() -> io::Result<()> {
        let (_module, ptr) =
            resolve_os_function(PROCESS_THREADS_MODULES, "SetProcessMitigationPolicy")
                .map_err(|e| io::Error::new(io::ErrorKind::Unsupported, e.to_string()))?;
        let set_policy: SetProcessMitigationPolicyFn = unsafe { std::mem::transmute(ptr) };

        let policy = SystemCallDisablePolicy {
            flags: DISALLOW_WIN32K_SYSTEM_CALLS,
        };
        let ok = unsafe {
            set_policy(
                PROCESS_SYSTEM_CALL_DISABLE_POLICY,
                &policy as *const SystemCallDisablePolicy as *const c_void,
                std::mem::size_of::<SystemCallDisablePolicy>(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
