use std::path::{Path, PathBuf};

use crate::error::HostError;

/// Input to the handoff, filled in by the front end and updated with the outcome.
///
/// `exit_code` is only meaningful when [`crate::call_application_main`] returned `Ok`.
#[derive(Debug, Clone, Default)]
pub struct CallData {
    /// Forwarded verbatim to the managed entry point.
    pub argv: Vec<String>,
    /// Becomes `APPBASE` in the domain's property bag.
    pub application_base: PathBuf,
    /// Where the domain-manager assembly lives. Defaults to the host binary's directory.
    pub runtime_directory: Option<PathBuf>,
    /// Entry point return value; `None` until a handoff succeeds.
    pub exit_code: Option<i32>,
}

impl CallData {
    pub fn new(argv: Vec<String>, application_base: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            application_base: application_base.into(),
            runtime_directory: None,
            exit_code: None,
        }
    }

    pub fn with_runtime_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_directory = Some(dir.into());
        self
    }

    /// The explicit runtime directory, or the directory containing the running binary.
    pub fn effective_runtime_directory(&self) -> Result<PathBuf, HostError> {
        if let Some(ref dir) = self.runtime_directory {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().map_err(HostError::HostDirectory)?;
        Ok(exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_runtime_directory_wins() {
        let data = CallData::new(vec![], "/app").with_runtime_directory("/opt/dnx/bin");
        assert_eq!(
            data.effective_runtime_directory().unwrap(),
            PathBuf::from("/opt/dnx/bin")
        );
    }

    #[test]
    fn test_default_runtime_directory_is_binary_dir() {
        let data = CallData::new(vec![], "/app");
        let dir = data.effective_runtime_directory().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(Some(dir.as_path()), exe.parent());
        assert_eq!(data.exit_code, None);
    }
}
