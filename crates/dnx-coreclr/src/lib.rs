//! CoreCLR discovery and handoff.
//!
//! Stages run strictly in order on the calling thread:
//! hardening → library resolution → host start → trusted assemblies → domain → invoke → teardown.

pub mod log;

pub mod bootstrap;
pub mod call_data;
pub mod domain;
pub mod error;
pub mod hardening;
pub mod host;
pub mod loader;
pub mod native_host;
pub mod resolver;
pub mod tpa;

#[cfg(target_os = "linux")]
pub mod seccomp;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{call_application_main, Bootstrap};
pub use call_data::CallData;
pub use error::{HResult, HostError, LoadError};
