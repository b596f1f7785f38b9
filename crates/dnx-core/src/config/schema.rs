//! 按领域分组的配置结构体
//!
//! 从环境变量加载，统一 fallback 逻辑。

use super::env_keys::{observability as obv_keys, runtime, security};
use super::loader::{env_bool, env_or, env_raw};
use std::path::PathBuf;

/// 宿主启动配置：运行时目录覆盖、安全加固开关
///
/// verbose trace 不在这里：统一由 [`ObservabilityConfig::verbose`] 提供。
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// `CORECLR_DIR`：强制从该目录加载运行时库（原样使用，不 trim）
    pub coreclr_dir: Option<PathBuf>,
    /// `DNX_WIN32K_DISABLE` 原始值，只有精确等于 `1` 才生效
    pub hardening_opt_in: Option<String>,
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self::from_values(
            env_raw(runtime::CORECLR_DIR),
            env_raw(security::DNX_WIN32K_DISABLE),
        )
    }

    /// 由原始值构造；空的 `CORECLR_DIR` 视为未设置
    pub fn from_values(coreclr_dir: Option<String>, hardening_opt_in: Option<String>) -> Self {
        Self {
            coreclr_dir: coreclr_dir.filter(|v| !v.is_empty()).map(PathBuf::from),
            hardening_opt_in,
        }
    }

    pub fn hardening_requested(&self) -> bool {
        self.hardening_opt_in.as_deref() == Some(security::HARDENING_ENABLE_VALUE)
    }
}

/// 可观测性配置：quiet、log_level、log_json、verbose trace
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub verbose: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            let verbose = env_raw(obv_keys::DNX_TRACE).is_some_and(|v| !v.is_empty());
            let quiet = env_bool(obv_keys::DNX_QUIET, &[], false);
            let log_level = env_or(obv_keys::DNX_LOG_LEVEL, &[], || {
                Self::default_level(verbose).to_string()
            });
            let log_json = env_bool(obv_keys::DNX_LOG_JSON, &[], false);
            Self {
                quiet,
                verbose,
                log_level,
                log_json,
            }
        })
    }

    fn default_level(verbose: bool) -> &'static str {
        if verbose {
            "dnx=debug,dnx_coreclr=debug"
        } else {
            "dnx=warn,dnx_coreclr=warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardening_requires_exact_one() {
        let mut cfg = HostConfig::default();
        assert!(!cfg.hardening_requested());
        for value in ["0", "true", " 1", "1 ", "11", ""] {
            cfg.hardening_opt_in = Some(value.to_string());
            assert!(!cfg.hardening_requested(), "{value:?} must not enable hardening");
        }
        cfg.hardening_opt_in = Some("1".to_string());
        assert!(cfg.hardening_requested());
    }

    #[test]
    fn test_coreclr_dir_is_taken_verbatim() {
        let cfg = HostConfig::from_values(Some(" /opt/clr ".to_string()), None);
        assert_eq!(cfg.coreclr_dir, Some(PathBuf::from(" /opt/clr ")));
        assert_eq!(HostConfig::from_values(Some(String::new()), None).coreclr_dir, None);
        assert_eq!(HostConfig::from_values(None, None).coreclr_dir, None);
    }

    #[test]
    fn test_default_level_follows_trace() {
        assert!(ObservabilityConfig::default_level(true).contains("debug"));
        assert!(ObservabilityConfig::default_level(false).contains("warn"));
    }
}
