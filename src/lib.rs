pub mod browser;
pub mod config;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
pub mod summary;
pub mod sync;
pub mod utils;

// Adapter modules (point to project root adapters via path attribute) / 适配器模块
#[path = "../adapters/mod.rs"]
pub mod adapters;

/// Register every built-in platform adapter / 注册所有内置平台适配器
pub async fn register_source_adapters(registry: &adapters::AdapterRegistry) {
    adapters::register_builtin(registry).await;
}
