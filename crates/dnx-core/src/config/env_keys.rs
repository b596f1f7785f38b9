//! 环境变量 key 常量与别名定义
//!
//! 宿主协议相关的变量名（`CORECLR_DIR`、`DNX_*`）是与托管侧共享的外部约定，不可改名。

/// 运行时定位
pub mod runtime {
    /// Directory holding the CoreCLR library. Forces the override search step.
    pub const CORECLR_DIR: &str = "CORECLR_DIR";

    /// Set just before the entry point runs so managed code can tell which
    /// runtime flavor hosts it.
    pub const DNX_FRAMEWORK: &str = "DNX_FRAMEWORK";
}

/// 安全加固
pub mod security {
    /// Must equal exactly `1` to apply the syscall mitigation policy.
    pub const DNX_WIN32K_DISABLE: &str = "DNX_WIN32K_DISABLE";
    pub const HARDENING_ENABLE_VALUE: &str = "1";
}

/// 可观测性与日志
pub mod observability {
    /// Any non-empty value turns on verbose host diagnostics.
    pub const DNX_TRACE: &str = "DNX_TRACE";

    pub const DNX_QUIET: &str = "DNX_QUIET";
    pub const DNX_LOG_LEVEL: &str = "DNX_LOG_LEVEL";
    pub const DNX_LOG_JSON: &str = "DNX_LOG_JSON";
}
