//! Source adapters / 平台适配器
//!
//! Each third-party platform is one adapter implementing the same three
//! operations: enumerate the catalog, fetch one document as Markdown, and
//! report what changed. Adapters are registered through factories so
//! OpenAPI sources can be added at runtime.

pub mod common;

pub mod dingtalk;
pub mod douyin;
pub mod feishu;
pub mod openapi;
pub mod pinduoduo;
pub mod taobao;
pub mod wechat_miniprogram;
pub mod wechat_shop;
pub mod wecom;
pub mod xiaohongshu;
pub mod youzan;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use common::ExtractedErrorCode;
use crate::models::{DevMode, DocType};

/// Default content-fetch pool width / 默认内容拉取并发数
pub const DEFAULT_FETCH_CONCURRENCY: usize = 6;

/// One catalog entry / 目录中的一条文档
#[derive(Debug, Clone)]
pub struct DocEntry {
    /// Hierarchical slash-delimited path / 层级路径
    pub path: String,
    pub title: String,
    pub api_path: Option<String>,
    pub dev_mode: Option<DevMode>,
    pub doc_type: DocType,
    pub source_url: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Platform's own stable id, needed to fetch content / 平台侧文档ID
    pub platform_id: String,
}

impl DocEntry {
    pub fn new(path: impl Into<String>, title: impl Into<String>, platform_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            api_path: None,
            dev_mode: None,
            doc_type: DocType::ApiReference,
            source_url: None,
            last_updated: None,
            platform_id: platform_id.into(),
        }
    }
}

/// Fetched document content / 拉取到的文档内容
#[derive(Debug, Clone, Default)]
pub struct DocContent {
    /// Normalized Markdown / 规范化后的Markdown
    pub markdown: String,
    /// api_path extracted from the body wins over the catalog entry
    /// / 正文提取的接口路径优先于目录
    pub api_path: Option<String>,
    pub error_codes: Vec<ExtractedErrorCode>,
    pub metadata: Option<Value>,
}

/// Quality-gate verdict before deletions are allowed / 质量闸结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityGate {
    Pass,
    /// Suspicious growth, run continues / 可疑增长，仅警告
    Warn(String),
    /// Likely silent data loss, abort and keep everything / 疑似数据丢失，中止
    Reject(String),
}

/// Adapter interface / 适配器接口
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source identifier / 来源标识
    fn source_id(&self) -> &str;

    /// Display name / 展示名称
    fn display_name(&self) -> &str;

    /// Enumerate every document the source currently exposes / 枚举目录
    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>>;

    /// Fetch one document as normalized Markdown / 拉取单篇内容
    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent>;

    /// Entries believed changed since the instant / 增量目录
    ///
    /// The default walks the full catalog; unchanged content is skipped
    /// later by hash comparison.
    async fn detect_updates(&self, since: DateTime<Utc>) -> Result<Vec<DocEntry>> {
        let _ = since;
        self.fetch_catalog().await
    }

    /// Catalog shrink/growth check before deletions / 删除前的数量检查
    fn check_quality_gate(&self, current: usize, last: usize) -> QualityGate {
        common::default_quality_gate(current, last)
    }

    /// Content-fetch pool width the runner may use / 内容拉取并发上限
    ///
    /// Browser-driven adapters drop this to 1: one page cannot `goto`
    /// two places at once.
    fn max_concurrency(&self) -> usize {
        DEFAULT_FETCH_CONCURRENCY
    }
}

/// Adapter factory / 适配器工厂
pub trait AdapterFactory: Send + Sync {
    fn adapter_type(&self) -> &'static str;
    fn create(&self, config: Value) -> Result<Arc<dyn SourceAdapter>>;
}

/// Registered source: which factory plus which config / 已注册来源
#[derive(Clone)]
struct SourceRegistration {
    adapter_type: String,
    config: Value,
}

/// Maps source identifiers to adapter factories / 来源注册表
#[derive(Clone)]
pub struct AdapterRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn AdapterFactory>>>>,
    sources: Arc<RwLock<HashMap<String, SourceRegistration>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register_factory(&self, factory: Arc<dyn AdapterFactory>) {
        let adapter_type = factory.adapter_type().to_string();
        self.factories.write().await.insert(adapter_type.clone(), factory);
        tracing::debug!("Adapter factory registered: {}", adapter_type);
    }

    /// Register a source backed by an existing factory / 注册来源
    pub async fn register_source(&self, source_id: &str, adapter_type: &str, config: Value) {
        self.sources.write().await.insert(
            source_id.to_string(),
            SourceRegistration {
                adapter_type: adapter_type.to_string(),
                config,
            },
        );
    }

    /// Register an OpenAPI source declared at runtime / 动态注册OpenAPI来源
    pub async fn register_openapi(&self, id: &str, name: &str, spec_url: &str) {
        self.register_source(
            id,
            "openapi",
            serde_json::json!({
                "id": id,
                "name": name,
                "spec_url": spec_url,
            }),
        )
        .await;
    }

    /// Create the adapter for a source id / 按来源创建适配器
    pub async fn create(&self, source_id: &str) -> Result<Arc<dyn SourceAdapter>> {
        let registration = self
            .sources
            .read()
            .await
            .get(source_id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown source: {}", source_id))?;
        let factory = self
            .factories
            .read()
            .await
            .get(&registration.adapter_type)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown adapter type: {}", registration.adapter_type))?;
        factory.create(registration.config)
    }

    /// All registered source ids / 所有已注册来源
    pub async fn list_sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the built-in platform adapters / 注册内置平台适配器
pub async fn register_builtin(registry: &AdapterRegistry) {
    registry.register_factory(Arc::new(wecom::WecomFactory)).await;
    registry.register_factory(Arc::new(feishu::FeishuFactory)).await;
    registry.register_factory(Arc::new(dingtalk::DingtalkFactory)).await;
    registry.register_factory(Arc::new(xiaohongshu::XiaohongshuFactory)).await;
    registry.register_factory(Arc::new(douyin::DouyinFactory)).await;
    registry.register_factory(Arc::new(taobao::TaobaoFactory)).await;
    registry.register_factory(Arc::new(youzan::YouzanFactory)).await;
    registry
        .register_factory(Arc::new(wechat_miniprogram::WechatMiniprogramFactory))
        .await;
    registry.register_factory(Arc::new(wechat_shop::WechatShopFactory)).await;
    registry.register_factory(Arc::new(pinduoduo::PinduoduoFactory)).await;
    registry.register_factory(Arc::new(openapi::OpenApiFactory)).await;

    // 内置平台的来源ID与适配器类型一致
    for source in [
        "wecom",
        "feishu",
        "dingtalk",
        "xiaohongshu",
        "douyin",
        "taobao",
        "youzan",
        "wechat_miniprogram",
        "wechat_shop",
        "pinduoduo",
    ] {
        registry
            .register_source(source, source, Value::Object(Default::default()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_builtin_and_openapi() {
        let registry = AdapterRegistry::new();
        register_builtin(&registry).await;

        let sources = registry.list_sources().await;
        assert!(sources.contains(&"wecom".to_string()));
        assert!(sources.contains(&"taobao".to_string()));

        registry
            .register_openapi("petstore", "Petstore", "https://example.com/openapi.json")
            .await;
        let adapter = registry.create("petstore").await.unwrap();
        assert_eq!(adapter.source_id(), "petstore");
    }

    #[tokio::test]
    async fn test_unknown_source_rejected() {
        let registry = AdapterRegistry::new();
        assert!(registry.create("nope").await.is_err());
    }
}
