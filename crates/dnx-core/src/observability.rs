//! Observability: tracing init.
//!
//! Uses config::ObservabilityConfig for DNX_QUIET, DNX_LOG_LEVEL, DNX_LOG_JSON and DNX_TRACE.
//! Logs go to stderr; stdout belongs to the managed application.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize tracing. Call at process startup.
/// When DNX_QUIET=1, only ERROR is logged regardless of DNX_TRACE.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "dnx=error,dnx_coreclr=error".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

/// Whether verbose host diagnostics (DNX_TRACE) are on.
pub fn is_verbose() -> bool {
    ObservabilityConfig::from_env().verbose
}
