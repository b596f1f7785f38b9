//! `dnx --probe`: dry-run discovery report.
//!
//! Walks the same candidate order as the real handoff but only checks that files exist.
//! Nothing is loaded and no mitigation is applied.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use dnx_core::config::HostConfig;
use dnx_coreclr::hardening::{MitigationPolicy, NativeMitigationPolicy};
use dnx_coreclr::loader::LibraryLoader;
use dnx_coreclr::resolver::{CandidateSource, LibraryCandidate, LibraryResolver, RuntimeLayout};
use dnx_coreclr::tpa::{ImageKind, TrustedAssemblyManifest};
use dnx_coreclr::LoadError;

/// "Loads" a path by checking it is a regular file. Bare names cannot be checked without
/// asking the OS loader, so they are accepted unverified.
struct ExistenceLoader;

impl LibraryLoader for ExistenceLoader {
    type Library = bool;

    fn restrict_search_path(&self, _dir: &Path) -> Result<(), LoadError> {
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<bool, LoadError> {
        if path.components().count() <= 1 {
            return Ok(false);
        }
        if path.is_file() {
            Ok(true)
        } else {
            Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LibraryReport {
    pub source: CandidateSource,
    pub path: PathBuf,
    /// False for the bare-name OS search, which can only be checked by loading.
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct HardeningReport {
    pub requested: bool,
    pub policy: String,
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub candidates: Vec<LibraryCandidate>,
    pub library: Option<LibraryReport>,
    /// Complete trusted-assembly form next to the chosen library, if any.
    pub image_kind: Option<ImageKind>,
    pub hardening: HardeningReport,
    pub verbose_trace: bool,
}

pub fn probe(config: &HostConfig, layout: &RuntimeLayout) -> Result<ProbeReport> {
    let override_dir = config.coreclr_dir.as_deref();
    let library = LibraryResolver::new(&ExistenceLoader, layout)
        .resolve(override_dir)
        .ok()
        .map(|resolved| LibraryReport {
            source: resolved.source,
            path: resolved.path,
            verified: resolved.library,
        });

    let image_kind = match library.as_ref() {
        Some(lib) if lib.verified => complete_image_kind(lib.path.parent())?,
        _ => None,
    };

    Ok(ProbeReport {
        candidates: layout.candidates(override_dir),
        library,
        image_kind,
        hardening: HardeningReport {
            requested: config.hardening_requested(),
            policy: NativeMitigationPolicy.name().to_string(),
        },
        verbose_trace: dnx_core::observability::is_verbose(),
    })
}

fn complete_image_kind(dir: Option<&Path>) -> Result<Option<ImageKind>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    for kind in [ImageKind::Native, ImageKind::Il] {
        if TrustedAssemblyManifest::build(dir, kind)?.is_some() {
            return Ok(Some(kind));
        }
    }
    Ok(None)
}
