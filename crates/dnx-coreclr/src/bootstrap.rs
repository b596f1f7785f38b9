//! The handoff, start to finish.

use std::path::{Path, PathBuf};

use dnx_core::config::HostConfig;

use crate::call_data::CallData;
use crate::domain;
use crate::error::HostError;
use crate::hardening::{self, MitigationPolicy, NativeMitigationPolicy};
use crate::host::start_runtime;
use crate::loader::{LibraryLoader, NativeLoader, RuntimeLibrary};
use crate::resolver::{LibraryResolver, RuntimeLayout};
use crate::tpa::TrustedAssemblyManifest;

/// Everything the handoff needs besides the call data.
pub struct Bootstrap<L, P> {
    pub loader: L,
    pub policy: P,
    pub config: HostConfig,
    pub layout: RuntimeLayout,
}

impl Bootstrap<NativeLoader, NativeMitigationPolicy> {
    pub fn native(config: HostConfig) -> Self {
        Self {
            loader: NativeLoader::default(),
            policy: NativeMitigationPolicy,
            config,
            layout: RuntimeLayout::native(),
        }
    }
}

impl<L, P> Bootstrap<L, P>
where
    L: LibraryLoader,
    L::Library: RuntimeLibrary,
    P: MitigationPolicy,
{
    /// Run one handoff. On success `data.exit_code` holds the entry point's return value.
    ///
    /// The runtime and the domain are torn down before this returns, on every path that
    /// got far enough to create them.
    pub fn run(&self, data: &mut CallData) -> Result<(), HostError> {
        data.exit_code = None;

        let outcome = hardening::apply(self.config.hardening_opt_in.as_deref(), &self.policy);
        tracing::debug!("hardening: {:?}", outcome);

        let runtime_dir = data.effective_runtime_directory()?;

        let resolved = LibraryResolver::new(&self.loader, &self.layout)
            .resolve(self.config.coreclr_dir.as_deref())?;
        let module_path = resolved
            .library
            .module_path()
            .map_err(HostError::ModulePath)?;
        let clr_dir = module_dir(&module_path);
        crate::verbose_log!("coreclr: {}", module_path.display());

        resolved.library.pin().map_err(HostError::Pin)?;

        let mut runtime = start_runtime(&resolved.library)?;
        let manifest = TrustedAssemblyManifest::build_preferring_native(&clr_dir)?;
        tracing::debug!(
            "using {:?} images from {} ({} assemblies)",
            manifest.kind(),
            clr_dir.display(),
            manifest.paths().len()
        );

        domain::execute(&mut runtime, data, manifest, &runtime_dir, &clr_dir)
    }
}

fn module_dir(module_path: &Path) -> PathBuf {
    module_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Locate and start CoreCLR, then run the managed entry point with `data.argv`.
///
/// Configuration comes from the process environment (`CORECLR_DIR`, `DNX_TRACE`,
/// `DNX_WIN32K_DISABLE`).
pub fn call_application_main(data: &mut CallData) -> Result<(), HostError> {
    Bootstrap::native(HostConfig::from_env()).run(data)
}
