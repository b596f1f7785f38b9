//! Runtime host controller.
//!
//! `RuntimeHost` is the narrow capability surface of `ICLRRuntimeHost2`; the COM vtable
//! lives in [`crate::native_host`]. [`start_runtime`] runs the one-shot initialization
//! sequence and hands back a [`StartedRuntime`] guard that stops the runtime on drop.
//! Domains created from it are [`Domain`] guards that unload on drop.

use std::ops::BitOr;

use crate::domain::PropertyBag;
use crate::error::{HResult, HostError};
use crate::loader::RuntimeLibrary;

/// Export that hands out the hosting interface.
pub const HOST_FACTORY_EXPORT: &str = "GetCLRRuntimeHost";

/// CORECLR_HOST_AUTHENTICATION_KEY from the hosting contract.
pub const CORECLR_HOST_AUTHENTICATION_KEY: u64 = 0x1C6C_A6F9_4025_800;

/// STARTUP_FLAGS bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StartupFlags(pub u32);

impl StartupFlags {
    pub const LOADER_OPTIMIZATION_SINGLE_DOMAIN: StartupFlags = StartupFlags(0x2);
    pub const SERVER_GC: StartupFlags = StartupFlags(0x1000);
    pub const SINGLE_APPDOMAIN: StartupFlags = StartupFlags(0x80_0000);

    /// Flags every dnx host starts with. Server GC is unsupported by CoreCLR on 32-bit ARM.
    pub fn host_default() -> Self {
        let flags = Self::LOADER_OPTIMIZATION_SINGLE_DOMAIN | Self::SINGLE_APPDOMAIN;
        #[cfg(not(target_arch = "arm"))]
        let flags = flags | Self::SERVER_GC;
        flags
    }
}

impl BitOr for StartupFlags {
    type Output = StartupFlags;
    fn bitor(self, rhs: Self) -> Self {
        StartupFlags(self.0 | rhs.0)
    }
}

/// APPDOMAIN_* creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DomainFlags(pub u32);

impl DomainFlags {
    pub const ENABLE_PINVOKE_AND_CLASSIC_COMINTEROP: DomainFlags = DomainFlags(0x10);
    pub const ENABLE_PLATFORM_SPECIFIC_APPS: DomainFlags = DomainFlags(0x40);
    pub const DISABLE_TRANSPARENCY_ENFORCEMENT: DomainFlags = DomainFlags(0x100);
}

impl BitOr for DomainFlags {
    type Output = DomainFlags;
    fn bitor(self, rhs: Self) -> Self {
        DomainFlags(self.0 | rhs.0)
    }
}

/// Runtime-assigned AppDomain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(pub u32);

/// Fully qualified location of a static managed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPointTarget {
    pub assembly: &'static str,
    pub type_name: &'static str,
    pub method: &'static str,
}

/// A callable managed entry point: `int Execute(int argc, string[] argv)`.
pub trait EntryPoint {
    fn invoke(&self, argv: &[String]) -> i32;
}

/// Hosting interface of a loaded runtime. One instance per process.
pub trait RuntimeHost {
    type EntryPoint: EntryPoint;

    fn set_startup_flags(&mut self, flags: StartupFlags) -> Result<(), HResult>;
    fn authenticate(&mut self, key: u64) -> Result<(), HResult>;
    fn start(&mut self) -> Result<(), HResult>;
    fn create_domain(
        &mut self,
        friendly_name: &str,
        flags: DomainFlags,
        properties: &PropertyBag,
    ) -> Result<DomainId, HResult>;
    fn create_entry_point(
        &mut self,
        domain: DomainId,
        target: &EntryPointTarget,
    ) -> Result<Self::EntryPoint, HResult>;
    fn unload_domain(&mut self, domain: DomainId, wait_until_done: bool) -> Result<(), HResult>;
    fn stop(&mut self) -> Result<(), HResult>;
}

/// Obtain the hosting interface from `library`, configure, authenticate and start it.
///
/// Every step is a one-time, non-idempotent call: any failure is fatal and returned as-is.
pub fn start_runtime<L: RuntimeLibrary>(
    library: &L,
) -> Result<StartedRuntime<L::Host>, HostError> {
    let mut host = match library.create_host(HOST_FACTORY_EXPORT) {
        None => return Err(HostError::ExportNotFound(HOST_FACTORY_EXPORT)),
        Some(Err(hr)) => return Err(HostError::HostInterface(hr)),
        Some(Ok(host)) => host,
    };

    let flags = StartupFlags::host_default();
    if let Err(hr) = host.set_startup_flags(flags) {
        tracing::warn!("SetStartupFlags(0x{:x}) failed ({}), continuing", flags.0, hr);
    }

    host.authenticate(CORECLR_HOST_AUTHENTICATION_KEY)
        .map_err(HostError::Authenticate)?;
    host.start().map_err(HostError::Start)?;
    tracing::debug!("runtime started");

    Ok(StartedRuntime { host })
}

/// A runtime whose `Start()` succeeded. Dropping it calls `Stop()`.
pub struct StartedRuntime<H: RuntimeHost> {
    host: H,
}

impl<H: RuntimeHost> StartedRuntime<H> {
    /// Create the single execution domain for this process.
    pub fn create_domain(
        &mut self,
        friendly_name: &str,
        flags: DomainFlags,
        properties: &PropertyBag,
    ) -> Result<Domain<'_, H>, HResult> {
        let id = self.host.create_domain(friendly_name, flags, properties)?;
        tracing::debug!("created domain {} ({})", friendly_name, id.0);
        Ok(Domain { runtime: self, id })
    }
}

impl<H: RuntimeHost> Drop for StartedRuntime<H> {
    fn drop(&mut self) {
        if let Err(hr) = self.host.stop() {
            tracing::warn!("Stop() failed ({})", hr);
        }
    }
}

/// A live execution domain. Dropping it unloads the domain and waits for completion.
pub struct Domain<'a, H: RuntimeHost> {
    runtime: &'a mut StartedRuntime<H>,
    id: DomainId,
}

impl<H: RuntimeHost> Domain<'_, H> {
    pub fn id(&self) -> DomainId {
        self.id
    }

    pub fn entry_point(&mut self, target: &EntryPointTarget) -> Result<H::EntryPoint, HResult> {
        self.runtime.host.create_entry_point(self.id, target)
    }
}

impl<H: RuntimeHost> Drop for Domain<'_, H> {
    fn drop(&mut self) {
        if let Err(hr) = self.runtime.host.unload_domain(self.id, true) {
            tracing::warn!("UnloadAppDomain({}) failed ({})", self.id.0, hr);
        }
    }
}
