//! Execution domain setup and the handoff itself.

use std::path::{Path, PathBuf};

use dnx_core::config::{env_keys, set_env_var};

use crate::call_data::CallData;
use crate::error::HostError;
use crate::host::{DomainFlags, EntryPoint, EntryPointTarget, RuntimeHost, StartedRuntime};
use crate::tpa::{BoundedString, TrustedAssemblyManifest};

/// Friendly name of the domain and simple name of the managed domain-manager assembly.
pub const DOMAIN_MANAGER_ASSEMBLY: &str = "dnx.coreclr.managed";
pub const DOMAIN_MANAGER_FILE: &str = "dnx.coreclr.managed.dll";

pub const MAIN_ENTRY_POINT: EntryPointTarget = EntryPointTarget {
    assembly: "dnx.coreclr.managed, Version=0.1.0.0",
    type_name: "DomainManager",
    method: "Execute",
};

/// Value exported as `DNX_FRAMEWORK` before the entry point runs.
pub const FRAMEWORK_MARKER: &str = "dnxcore50";

pub const APP_PATHS_LIMIT: usize = 260;

pub const PROP_APPBASE: &str = "APPBASE";
pub const PROP_TRUSTED_PLATFORM_ASSEMBLIES: &str = "TRUSTED_PLATFORM_ASSEMBLIES";
pub const PROP_APP_PATHS: &str = "APP_PATHS";
pub const PROP_COMPAT_SWITCH: &str = "AppDomainCompatSwitch";
pub const COMPAT_SWITCH_VALUE: &str = "UseLatestBehaviorWhenTFMNotSpecified";

pub fn domain_flags() -> DomainFlags {
    DomainFlags::ENABLE_PLATFORM_SPECIFIC_APPS
        | DomainFlags::ENABLE_PINVOKE_AND_CLASSIC_COMINTEROP
        | DomainFlags::DISABLE_TRANSPARENCY_ENFORCEMENT
}

/// Domain properties as two index-aligned sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag {
    keys: Vec<String>,
    values: Vec<String>,
}

impl PropertyBag {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.push(key.into());
        self.values.push(value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.values[i].as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `<application base>;<runtime library directory>;`, bounded to `APP_PATHS_LIMIT`.
pub fn app_paths(application_base: &Path, clr_dir: &Path) -> Result<String, HostError> {
    let mut paths = BoundedString::new(PROP_APP_PATHS, APP_PATHS_LIMIT);
    for dir in [application_base, clr_dir] {
        paths.push_str(&dir.display().to_string())?;
        paths.push_str(";")?;
    }
    Ok(paths.into_string())
}

pub fn build_property_bag(
    application_base: &Path,
    tpa: &str,
    app_paths: &str,
) -> PropertyBag {
    let mut bag = PropertyBag::default();
    bag.push(PROP_APPBASE, application_base.display().to_string());
    bag.push(PROP_TRUSTED_PLATFORM_ASSEMBLIES, tpa);
    bag.push(PROP_APP_PATHS, app_paths);
    bag.push(PROP_COMPAT_SWITCH, COMPAT_SWITCH_VALUE);
    bag
}

/// Create the domain, run the managed entry point and record its exit code in `data`.
///
/// The domain is unloaded when this returns, whether or not the entry point was reached.
pub fn execute<H: RuntimeHost>(
    runtime: &mut StartedRuntime<H>,
    data: &mut CallData,
    mut manifest: TrustedAssemblyManifest,
    runtime_dir: &Path,
    clr_dir: &Path,
) -> Result<(), HostError> {
    let manager: PathBuf = runtime_dir.join(DOMAIN_MANAGER_FILE);
    manifest.push(manager)?;
    let tpa = manifest.into_string();
    let app_paths = app_paths(&data.application_base, clr_dir)?;
    let properties = build_property_bag(&data.application_base, &tpa, &app_paths);

    let mut domain = runtime
        .create_domain(DOMAIN_MANAGER_ASSEMBLY, domain_flags(), &properties)
        .map_err(|hr| HostError::CreateDomain {
            hr,
            tpa: tpa.clone(),
            app_paths: app_paths.clone(),
        })?;

    let entry = domain
        .entry_point(&MAIN_ENTRY_POINT)
        .map_err(HostError::CreateEntryPoint)?;

    set_env_var(env_keys::runtime::DNX_FRAMEWORK, FRAMEWORK_MARKER);
    crate::verbose_log!(
        "invoking {}::{} in domain {}",
        MAIN_ENTRY_POINT.type_name,
        MAIN_ENTRY_POINT.method,
        domain.id().0
    );
    let code = entry.invoke(&data.argv);
    tracing::debug!("entry point returned {}", code);
    data.exit_code = Some(code);

    drop(domain);
    Ok(())
}
