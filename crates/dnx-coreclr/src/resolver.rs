//! Runtime library discovery.
//!
//! Candidates are tried in a fixed order and the first one that loads wins:
//! `CORECLR_DIR` override, then the development-tree layout, then the bare library name
//! through the OS search. Each candidate is attempted at most once.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::HostError;
use crate::loader::LibraryLoader;

#[cfg(target_os = "windows")]
pub const CORECLR_LIBRARY_NAME: &str = "coreclr.dll";
#[cfg(target_os = "macos")]
pub const CORECLR_LIBRARY_NAME: &str = "libcoreclr.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const CORECLR_LIBRARY_NAME: &str = "libcoreclr.so";

#[cfg(target_pointer_width = "64")]
const DEV_ARCH_DIR: &str = "amd64";
#[cfg(not(target_pointer_width = "64"))]
const DEV_ARCH_DIR: &str = "x86";

/// Where a runtime library is looked for on this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    pub library_name: &'static str,
    /// Relative to the working directory, as the OS loader resolves it.
    pub dev_path: PathBuf,
}

impl RuntimeLayout {
    pub fn native() -> Self {
        Self::with_library_name(CORECLR_LIBRARY_NAME)
    }

    pub fn with_library_name(library_name: &'static str) -> Self {
        let dev_path = ["..", "..", "..", "artifacts", "build", "ProjectK", "Runtime"]
            .iter()
            .collect::<PathBuf>()
            .join(DEV_ARCH_DIR)
            .join(library_name);
        Self {
            library_name,
            dev_path,
        }
    }

    /// Candidates in search order.
    pub fn candidates(&self, override_dir: Option<&Path>) -> Vec<LibraryCandidate> {
        let mut out = Vec::with_capacity(3);
        if let Some(dir) = override_dir {
            out.push(LibraryCandidate {
                source: CandidateSource::Override,
                path: dir.join(self.library_name),
            });
        }
        out.push(LibraryCandidate {
            source: CandidateSource::DevelopmentTree,
            path: self.dev_path.clone(),
        });
        out.push(LibraryCandidate {
            source: CandidateSource::SystemSearch,
            path: PathBuf::from(self.library_name),
        });
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Override,
    DevelopmentTree,
    SystemSearch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryCandidate {
    pub source: CandidateSource,
    pub path: PathBuf,
}

/// A loaded (not yet pinned) runtime library and where it came from.
#[derive(Debug)]
pub struct Resolved<Lib> {
    pub source: CandidateSource,
    pub path: PathBuf,
    pub library: Lib,
}

pub struct LibraryResolver<'a, L: LibraryLoader> {
    loader: &'a L,
    layout: &'a RuntimeLayout,
}

impl<'a, L: LibraryLoader> LibraryResolver<'a, L> {
    pub fn new(loader: &'a L, layout: &'a RuntimeLayout) -> Self {
        Self { loader, layout }
    }

    pub fn resolve(&self, override_dir: Option<&Path>) -> Result<Resolved<L::Library>, HostError> {
        for candidate in self.layout.candidates(override_dir) {
            if let (CandidateSource::Override, Some(dir)) = (candidate.source, override_dir) {
                if let Err(e) = self.loader.restrict_search_path(dir) {
                    crate::verbose_log!("{}", e);
                    continue;
                }
            }
            match self.loader.load(&candidate.path) {
                Ok(library) => {
                    tracing::debug!(
                        "loaded {} ({:?})",
                        candidate.path.display(),
                        candidate.source
                    );
                    return Ok(Resolved {
                        source: candidate.source,
                        path: candidate.path,
                        library,
                    });
                }
                Err(e) => crate::verbose_log!("{}", e),
            }
        }
        Err(HostError::RuntimeNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLoader, HostScript};

    fn layout() -> RuntimeLayout {
        RuntimeLayout::with_library_name("libcoreclr.so")
    }

    #[test]
    fn test_dev_path_layout() {
        let layout = layout();
        let expected: PathBuf = [
            "..", "..", "..", "artifacts", "build", "ProjectK", "Runtime", DEV_ARCH_DIR,
            "libcoreclr.so",
        ]
        .iter()
        .collect();
        assert_eq!(layout.dev_path, expected);
    }

    #[test]
    fn test_override_wins_and_restricts_search() {
        let layout = layout();
        let loader = FakeLoader::new(HostScript::default())
            .with_loadable("/opt/clr/libcoreclr.so")
            .with_loadable(&layout.dev_path);
        let resolved = LibraryResolver::new(&loader, &layout)
            .resolve(Some(Path::new("/opt/clr")))
            .unwrap();
        assert_eq!(resolved.source, CandidateSource::Override);
        assert_eq!(resolved.path, PathBuf::from("/opt/clr/libcoreclr.so"));
        assert_eq!(loader.restricted(), vec![PathBuf::from("/opt/clr")]);
        assert_eq!(loader.attempts().len(), 1);
    }

    #[test]
    fn test_trailing_separator_is_normalised() {
        let layout = layout();
        let with = layout.candidates(Some(Path::new("/opt/clr/")));
        let without = layout.candidates(Some(Path::new("/opt/clr")));
        assert_eq!(with[0].path, without[0].path);
    }

    #[test]
    fn test_failed_override_falls_through_to_dev_tree() {
        let layout = layout();
        let loader = FakeLoader::new(HostScript::default()).with_loadable(&layout.dev_path);
        let resolved = LibraryResolver::new(&loader, &layout)
            .resolve(Some(Path::new("/opt/missing")))
            .unwrap();
        assert_eq!(resolved.source, CandidateSource::DevelopmentTree);
        assert_eq!(
            loader.attempts(),
            vec![PathBuf::from("/opt/missing/libcoreclr.so"), layout.dev_path.clone()]
        );
    }

    #[test]
    fn test_missing_loader_helpers_skip_override() {
        let layout = layout();
        let loader = FakeLoader::new(HostScript::default())
            .with_loadable("/opt/clr/libcoreclr.so")
            .with_loadable("libcoreclr.so")
            .failing_restrict();
        let resolved = LibraryResolver::new(&loader, &layout)
            .resolve(Some(Path::new("/opt/clr")))
            .unwrap();
        assert_eq!(resolved.source, CandidateSource::SystemSearch);
        assert!(!loader
            .attempts()
            .contains(&PathBuf::from("/opt/clr/libcoreclr.so")));
    }

    #[test]
    fn test_bare_name_attempted_exactly_once() {
        let layout = layout();
        let loader = FakeLoader::new(HostScript::default()).with_loadable("libcoreclr.so");
        let resolved = LibraryResolver::new(&loader, &layout).resolve(None).unwrap();
        assert_eq!(resolved.source, CandidateSource::SystemSearch);
        let attempts = loader.attempts();
        assert_eq!(attempts, vec![layout.dev_path.clone(), PathBuf::from("libcoreclr.so")]);
        assert!(loader.restricted().is_empty());
    }

    #[test]
    fn test_nothing_loadable_is_fatal() {
        let layout = layout();
        let loader = FakeLoader::new(HostScript::default());
        let err = LibraryResolver::new(&loader, &layout)
            .resolve(Some(Path::new("/opt/clr")))
            .unwrap_err();
        assert!(matches!(err, HostError::RuntimeNotFound));
        assert_eq!(err.to_string(), "Failed to locate coreclr.");
        let bare = loader
            .attempts()
            .iter()
            .filter(|p| p.as_path() == Path::new("libcoreclr.so"))
            .count();
        assert_eq!(bare, 1);
    }
}
