//! Application configuration module / 应用配置模块
//!
//! Configuration is read from environment variables once and cached in a
//! global instance. Call `init_config()` early; accessors fall back to a
//! lazy load so library code keeps working in tests.

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server listen port / 服务器端口
    pub port: u16,
    /// SQLite database file path / 数据库文件路径
    pub db_path: PathBuf,
    /// Bearer token for admin endpoints / 管理接口令牌
    pub admin_token: String,
    /// jieba user dictionary path / 用户词典路径
    pub userdict_path: PathBuf,
    /// Base URL the sync CLI posts to / 同步工具目标地址
    pub api_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3456,
            db_path: PathBuf::from("./data/specfusion.db"),
            admin_token: "dev-token".to_string(),
            userdict_path: PathBuf::from("./data/userdict.txt"),
            api_url: "http://127.0.0.1:3456".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment / 从环境变量加载配置
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            admin_token: std::env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            userdict_path: std::env::var("USERDICT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.userdict_path),
            api_url: std::env::var("SPECFUSION_API_URL").unwrap_or(defaults.api_url),
        }
    }

    /// Get the SQLite connection URL / 获取数据库连接URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path.to_string_lossy())
    }

    /// Get the server bind address / 获取服务器绑定地址
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config() -> Arc<RwLock<AppConfig>> {
    CONFIG
        .get_or_init(|| Arc::new(RwLock::new(AppConfig::from_env())))
        .clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    init_config().read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 3456);
        assert_eq!(cfg.admin_token, "dev-token");
        assert!(cfg.database_url().starts_with("sqlite:"));
    }
}
