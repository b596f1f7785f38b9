//! DNX_TRACE-aware logging. Secondary diagnostics (optional OS helpers that could not be
//! resolved, candidate paths that failed to load) are only emitted when DNX_TRACE is set.
//! Uses `tracing::info!` so output is captured by the tracing subscriber.

#[macro_export]
macro_rules! verbose_log {
    ($($arg:tt)*) => {{
        if $crate::log::is_verbose() {
            tracing::info!($($arg)*);
        }
    }};
}

pub fn is_verbose() -> bool {
    dnx_core::observability::is_verbose()
}
