//! Recording fakes for the loader, host and mitigation seams.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::domain::PropertyBag;
use crate::error::{HResult, LoadError};
use crate::hardening::MitigationPolicy;
use crate::host::{DomainFlags, DomainId, EntryPoint, EntryPointTarget, RuntimeHost, StartupFlags};
use crate::loader::{LibraryLoader, RuntimeLibrary};
use crate::tpa::{required_assemblies, ImageKind};

/// Create empty files for every assembly `kind` requires.
pub fn populate_runtime_dir(dir: &Path, kind: ImageKind) {
    for name in required_assemblies(kind) {
        std::fs::write(dir.join(name), b"").unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Pin(PathBuf),
    SetStartupFlags(StartupFlags),
    Authenticate(u64),
    Start,
    CreateDomain {
        name: String,
        flags: DomainFlags,
        keys: Vec<String>,
        values: Vec<String>,
    },
    CreateEntryPoint(DomainId, String),
    Invoke(Vec<String>),
    UnloadDomain(DomainId, bool),
    Stop,
}

/// Scripted behavior plus a shared call log. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    pub missing_export: bool,
    pub factory_fails: Option<HResult>,
    pub pin_fails: bool,
    pub startup_flags_fail: Option<HResult>,
    pub authenticate_fails: Option<HResult>,
    pub start_fails: Option<HResult>,
    pub create_domain_fails: Option<HResult>,
    pub entry_point_fails: Option<HResult>,
    pub exit_code: i32,
    pub(crate) log: Rc<RefCell<Vec<HostCall>>>,
}

impl HostScript {
    pub fn calls(&self) -> Vec<HostCall> {
        self.log.borrow().clone()
    }

    fn record(&self, call: HostCall) {
        self.log.borrow_mut().push(call);
    }
}

fn scripted(failure: Option<HResult>) -> Result<(), HResult> {
    failure.map_or(Ok(()), Err)
}

pub struct FakeLoader {
    script: HostScript,
    loadable: HashSet<PathBuf>,
    restrict_fails: bool,
    attempts: RefCell<Vec<PathBuf>>,
    restricted: RefCell<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn new(script: HostScript) -> Self {
        Self {
            script,
            loadable: HashSet::new(),
            restrict_fails: false,
            attempts: RefCell::new(Vec::new()),
            restricted: RefCell::new(Vec::new()),
        }
    }

    pub fn with_loadable(mut self, path: impl AsRef<Path>) -> Self {
        self.loadable.insert(path.as_ref().to_path_buf());
        self
    }

    pub fn failing_restrict(mut self) -> Self {
        self.restrict_fails = true;
        self
    }

    pub fn attempts(&self) -> Vec<PathBuf> {
        self.attempts.borrow().clone()
    }

    pub fn restricted(&self) -> Vec<PathBuf> {
        self.restricted.borrow().clone()
    }
}

impl LibraryLoader for FakeLoader {
    type Library = FakeLibrary;

    fn restrict_search_path(&self, dir: &Path) -> Result<(), LoadError> {
        if self.restrict_fails {
            return Err(LoadError::MissingSymbol {
                symbol: "AddDllDirectory".to_string(),
                module: "kernel32.dll".to_string(),
            });
        }
        self.restricted.borrow_mut().push(dir.to_path_buf());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<FakeLibrary, LoadError> {
        self.attempts.borrow_mut().push(path.to_path_buf());
        if self.loadable.contains(path) {
            Ok(FakeLibrary::new(path, self.script.clone()))
        } else {
            Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: "not found".to_string(),
            })
        }
    }
}

#[derive(Debug)]
pub struct FakeLibrary {
    path: PathBuf,
    script: HostScript,
}

impl FakeLibrary {
    pub fn new(path: impl Into<PathBuf>, script: HostScript) -> Self {
        Self {
            path: path.into(),
            script,
        }
    }
}

impl RuntimeLibrary for FakeLibrary {
    type Host = FakeHost;

    fn module_path(&self) -> Result<PathBuf, LoadError> {
        Ok(self.path.clone())
    }

    fn pin(&self) -> Result<(), LoadError> {
        self.script.record(HostCall::Pin(self.path.clone()));
        if self.script.pin_fails {
            return Err(LoadError::Pin {
                path: self.path.clone(),
                reason: "refused".to_string(),
            });
        }
        Ok(())
    }

    fn create_host(&self, _export: &str) -> Option<Result<FakeHost, HResult>> {
        if self.script.missing_export {
            return None;
        }
        Some(match self.script.factory_fails {
            Some(hr) => Err(hr),
            None => Ok(FakeHost {
                script: self.script.clone(),
                next_domain: 1,
            }),
        })
    }
}

pub struct FakeHost {
    script: HostScript,
    next_domain: u32,
}

impl RuntimeHost for FakeHost {
    type EntryPoint = FakeEntryPoint;

    fn set_startup_flags(&mut self, flags: StartupFlags) -> Result<(), HResult> {
        self.script.record(HostCall::SetStartupFlags(flags));
        scripted(self.script.startup_flags_fail)
    }

    fn authenticate(&mut self, key: u64) -> Result<(), HResult> {
        self.script.record(HostCall::Authenticate(key));
        scripted(self.script.authenticate_fails)
    }

    fn start(&mut self) -> Result<(), HResult> {
        self.script.record(HostCall::Start);
        scripted(self.script.start_fails)
    }

    fn create_domain(
        &mut self,
        friendly_name: &str,
        flags: DomainFlags,
        properties: &PropertyBag,
    ) -> Result<DomainId, HResult> {
        self.script.record(HostCall::CreateDomain {
            name: friendly_name.to_string(),
            flags,
            keys: properties.keys().map(str::to_string).collect(),
            values: properties.values().map(str::to_string).collect(),
        });
        scripted(self.script.create_domain_fails)?;
        let id = DomainId(self.next_domain);
        self.next_domain += 1;
        Ok(id)
    }

    fn create_entry_point(
        &mut self,
        domain: DomainId,
        target: &EntryPointTarget,
    ) -> Result<FakeEntryPoint, HResult> {
        self.script.record(HostCall::CreateEntryPoint(
            domain,
            format!("{}::{}", target.type_name, target.method),
        ));
        scripted(self.script.entry_point_fails)?;
        Ok(FakeEntryPoint {
            script: self.script.clone(),
        })
    }

    fn unload_domain(&mut self, domain: DomainId, wait_until_done: bool) -> Result<(), HResult> {
        self.script.record(HostCall::UnloadDomain(domain, wait_until_done));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HResult> {
        self.script.record(HostCall::Stop);
        Ok(())
    }
}

pub struct FakeEntryPoint {
    script: HostScript,
}

impl EntryPoint for FakeEntryPoint {
    fn invoke(&self, argv: &[String]) -> i32 {
        self.script.record(HostCall::Invoke(argv.to_vec()));
        self.script.exit_code
    }
}

#[derive(Debug, Default)]
pub struct FakePolicy {
    fails: bool,
    applied: Cell<usize>,
}

impl FakePolicy {
    pub fn failing() -> Self {
        Self {
            fails: true,
            applied: Cell::new(0),
        }
    }

    /// Number of `apply` calls, successful or not.
    pub fn applied(&self) -> usize {
        self.applied.get()
    }
}

impl MitigationPolicy for FakePolicy {
    fn name(&self) -> &str {
        "fake"
    }

    fn apply(&self) -> io::Result<()> {
        self.applied.set(self.applied.get() + 1);
        if self.fails {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "fake refusal"));
        }
        Ok(())
    }
}
