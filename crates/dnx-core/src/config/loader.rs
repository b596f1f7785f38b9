//! 统一环境变量加载逻辑
//!
//! 集中维护 fallback 链，避免在宿主代码中重复 `or_else` 调用。

use std::env;

/// 从主变量或别名链读取环境变量，失败时使用默认值
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// 原样读取（不 trim、不过滤空值）。用于需要精确比较的开关，例如 `DNX_WIN32K_DISABLE`。
pub fn env_raw(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// 解析布尔型环境变量：1/true/yes 为 true，0/false/no 为 false
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

// ─── 集中式 env::set_var 包装 ─────────────────────────────────
//
// SAFETY 约定：宿主是单线程启动流程，调用发生在进入托管代码之前。

/// 设置单个环境变量（unsafe 集中在此处）
#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}
