//! Trusted platform assemblies (TPA).
//!
//! The runtime trusts exactly the files listed here without further verification, so the
//! list is all-or-nothing: if one required assembly is missing in a form, that form is
//! rejected outright. The rendered `;`-separated string has a hard ceiling; running past it
//! is an error rather than a silent truncation.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::HostError;

/// Character ceiling for the rendered manifest, terminator included.
pub const TPA_BUFFER_LIMIT: usize = 63 * 1024;

/// Framework assemblies; shipped both as IL and as native (crossgen/ngen) images.
const PLATFORM_ASSEMBLIES: &[&str] = &[
    "mscorlib",
    "System",
    "System.AppContext",
    "System.Collections",
    "System.Collections.Concurrent",
    "System.ComponentModel",
    "System.Console",
    "System.Diagnostics.Debug",
    "System.Diagnostics.Tracing",
    "System.Globalization",
    "System.IO",
    "System.IO.FileSystem",
    "System.IO.FileSystem.Primitives",
    "System.Linq",
    "System.Reflection",
    "System.Reflection.Extensions",
    "System.Reflection.Primitives",
    "System.Resources.ResourceManager",
    "System.Runtime",
    "System.Runtime.Extensions",
    "System.Runtime.Handles",
    "System.Runtime.InteropServices",
    "System.Runtime.Loader",
    "System.Text.Encoding",
    "System.Text.Encoding.Extensions",
    "System.Threading",
    "System.Threading.Tasks",
    "System.Threading.Thread",
];

/// dnx host assemblies; never native-imaged.
const HOST_ASSEMBLIES: &[&str] = &[
    "Microsoft.Dnx.Host",
    "Microsoft.Dnx.Host.CoreClr",
    "Microsoft.Dnx.Loader",
];

const IL_EXTENSION: &str = ".dll";
const NATIVE_IMAGE_EXTENSION: &str = ".ni.dll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Pre-compiled native images; faster to load.
    Native,
    /// Plain intermediate-language assemblies.
    Il,
}

/// File names required in the runtime directory for `kind`, in manifest order.
pub fn required_assemblies(kind: ImageKind) -> Vec<String> {
    let platform_ext = match kind {
        ImageKind::Native => NATIVE_IMAGE_EXTENSION,
        ImageKind::Il => IL_EXTENSION,
    };
    PLATFORM_ASSEMBLIES
        .iter()
        .map(|name| format!("{}{}", name, platform_ext))
        .chain(
            HOST_ASSEMBLIES
                .iter()
                .map(|name| format!("{}{}", name, IL_EXTENSION)),
        )
        .collect()
}

/// Growable string with a fixed character ceiling (UTF-16 units, terminator included).
#[derive(Debug, Clone)]
pub struct BoundedString {
    buf: String,
    units: usize,
    limit: usize,
    what: &'static str,
}

impl BoundedString {
    pub fn new(what: &'static str, limit: usize) -> Self {
        Self {
            buf: String::new(),
            units: 0,
            limit,
            what,
        }
    }

    /// Append `s`; fails without modifying the buffer if the result would not fit.
    pub fn push_str(&mut self, s: &str) -> Result<(), HostError> {
        let added = s.encode_utf16().count();
        if self.units + added + 1 > self.limit {
            return Err(HostError::BufferOverflow {
                what: self.what,
                limit: self.limit,
            });
        }
        self.buf.push_str(s);
        self.units += added;
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Ordered, duplicate-free list of existing assembly paths plus its rendered form.
#[derive(Debug, Clone)]
pub struct TrustedAssemblyManifest {
    kind: ImageKind,
    paths: Vec<PathBuf>,
    rendered: BoundedString,
}

impl TrustedAssemblyManifest {
    /// Build the manifest for `directory` in form `kind`.
    ///
    /// `Ok(None)` when any required file is missing; `Err` only on overflow.
    pub fn build(directory: &Path, kind: ImageKind) -> Result<Option<Self>, HostError> {
        Self::build_with_limit(directory, kind, TPA_BUFFER_LIMIT)
    }

    pub(crate) fn build_with_limit(
        directory: &Path,
        kind: ImageKind,
        limit: usize,
    ) -> Result<Option<Self>, HostError> {
        let candidates: Vec<PathBuf> = required_assemblies(kind)
            .iter()
            .map(|name| directory.join(name))
            .collect();

        if let Some(missing) = candidates.iter().find(|p| !p.is_file()) {
            tracing::debug!("{:?} manifest incomplete: {} not found", kind, missing.display());
            return Ok(None);
        }

        let mut manifest = Self {
            kind,
            paths: Vec::with_capacity(candidates.len() + 1),
            rendered: BoundedString::new("TRUSTED_PLATFORM_ASSEMBLIES", limit),
        };
        for path in candidates {
            manifest.push(path)?;
        }
        Ok(Some(manifest))
    }

    /// Native images first; IL only when the native set is incomplete.
    pub fn build_preferring_native(directory: &Path) -> Result<Self, HostError> {
        select_manifest(|kind| Self::build(directory, kind))?.ok_or_else(|| {
            HostError::RuntimeFilesMissing {
                directory: directory.to_path_buf(),
            }
        })
    }

    /// Append `path` (e.g. the domain-manager assembly). Duplicates are ignored.
    pub fn push(&mut self, path: PathBuf) -> Result<(), HostError> {
        if self.paths.contains(&path) {
            return Ok(());
        }
        let entry = format!("{};", path.display());
        self.rendered.push_str(&entry)?;
        self.paths.push(path);
        Ok(())
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn as_str(&self) -> &str {
        self.rendered.as_str()
    }

    pub fn into_string(self) -> String {
        self.rendered.into_string()
    }
}

/// Try `build` for the native form, then for IL only if native produced nothing.
pub(crate) fn select_manifest<M, F>(mut build: F) -> Result<Option<M>, HostError>
where
    F: FnMut(ImageKind) -> Result<Option<M>, HostError>,
{
    if let Some(manifest) = build(ImageKind::Native)? {
        return Ok(Some(manifest));
    }
    build(ImageKind::Il)
}
