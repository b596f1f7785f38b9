//! dnx 统一配置层
//!
//! 所有环境变量读取集中在此模块，宿主代码通过结构化配置访问，避免直接 `std::env::var`。
//!
//! - `loader`：env_or、env_raw、env_bool 等辅助函数
//! - `schema`：HostConfig、ObservabilityConfig
//! - `env_keys`：key 常量

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_or, env_raw, set_env_var};
pub use schema::{HostConfig, ObservabilityConfig};
