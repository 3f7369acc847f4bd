//! Core data model / 核心数据模型
//!
//! Documents are content-addressed: the id is derived from the source and
//! logical path, and the content hash drives incremental upserts. The same
//! `(source_id, path)` always yields the same id across re-syncs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Document category / 文档类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    ApiReference,
    Guide,
    ErrorCode,
    Event,
    CardTemplate,
    Changelog,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiReference => "api_reference",
            Self::Guide => "guide",
            Self::ErrorCode => "error_code",
            Self::Event => "event",
            Self::CardTemplate => "card_template",
            Self::Changelog => "changelog",
        }
    }

    /// Unknown values do not round-trip / 未知值不做兼容
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api_reference" => Some(Self::ApiReference),
            "guide" => Some(Self::Guide),
            "error_code" => Some(Self::ErrorCode),
            "event" => Some(Self::Event),
            "card_template" => Some(Self::CardTemplate),
            "changelog" => Some(Self::Changelog),
            _ => None,
        }
    }
}

impl Default for DocType {
    fn default() -> Self {
        Self::ApiReference
    }
}

/// 企业微信开发模式 / Wecom development mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevMode {
    Internal,
    ThirdParty,
    ServiceProvider,
}

impl DevMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::ThirdParty => "third_party",
            Self::ServiceProvider => "service_provider",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Self::Internal),
            "third_party" => Some(Self::ThirdParty),
            "service_provider" => Some(Self::ServiceProvider),
            _ => None,
        }
    }

    /// 中文标签 / Chinese label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Internal => "自建应用",
            Self::ThirdParty => "第三方应用",
            Self::ServiceProvider => "服务商代开发",
        }
    }
}

/// One stored article / 一篇入库文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    /// Hierarchical slash-delimited path / 层级路径
    pub path: String,
    pub path_depth: i64,
    pub title: String,
    /// HTTP method + route extracted from content / 从正文提取的接口路径
    pub api_path: Option<String>,
    pub dev_mode: Option<DevMode>,
    pub doc_type: DocType,
    /// Full normalized Markdown / 规范化后的完整 Markdown
    pub content: String,
    pub content_hash: String,
    pub prev_content_hash: Option<String>,
    pub source_url: Option<String>,
    /// Opaque JSON metadata (locale, event name, labels, ...) / 附加元数据
    pub metadata: Option<String>,
    pub tokenized_title: String,
    pub tokenized_content: String,
    /// Platform's own revision date / 平台侧更新时间
    pub last_updated: Option<DateTime<Utc>>,
    /// Our write time / 本服务写入时间
    pub synced_at: DateTime<Utc>,
}

/// Upsert request payload / 入库请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertInput {
    pub source_id: String,
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub api_path: Option<String>,
    #[serde(default)]
    pub dev_mode: Option<DevMode>,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Result of an upsert / 入库动作结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// An ingested platform / 一个已接入的平台
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub base_url: Option<String>,
    pub doc_count: i64,
    pub last_synced: Option<DateTime<Utc>>,
    pub config: Option<String>,
}

/// 错误码条目 / Error code entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCode {
    pub source_id: String,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Document that introduces this code / 引入该错误码的文档
    #[serde(default)]
    pub doc_id: Option<String>,
}

/// Sync run status / 同步运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Per-run sync record / 单次同步记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub source_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub deleted: i64,
    pub error: Option<String>,
}

/// Aggregated counts reported back by a sync run / 同步结果计数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCounts {
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub deleted: i64,
    pub errors: i64,
}

/// Derive the stable document id / 计算稳定文档ID
///
/// `{source_id}_{first 12 hex chars of SHA-256(path)}`
pub fn document_id(source_id: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", source_id, &digest[..12])
}

/// SHA-256 of document content / 正文哈希
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Count non-empty path segments, minimum 1 / 非空路径段数
pub fn path_depth(path: &str) -> i64 {
    let n = path.split('/').filter(|s| !s.is_empty()).count();
    n.max(1) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable() {
        let a = document_id("wecom", "api/90000/90135/90664");
        let b = document_id("wecom", "api/90000/90135/90664");
        assert_eq!(a, b);
        assert!(a.starts_with("wecom_"));
        assert_eq!(a.len(), "wecom_".len() + 12);
    }

    #[test]
    fn test_document_id_varies_by_path() {
        assert_ne!(document_id("wecom", "a/b"), document_id("wecom", "a/c"));
    }

    #[test]
    fn test_content_hash_matches_sha256() {
        // SHA-256("") 的已知值
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_path_depth() {
        assert_eq!(path_depth("a/b/c"), 3);
        assert_eq!(path_depth("/a/b/"), 2);
        assert_eq!(path_depth(""), 1);
        assert_eq!(path_depth("single"), 1);
    }

    #[test]
    fn test_doc_type_rejects_unknown() {
        assert_eq!(DocType::parse("api_reference"), Some(DocType::ApiReference));
        assert_eq!(DocType::parse("weird"), None);
    }

    #[test]
    fn test_dev_mode_round_trip() {
        for mode in [DevMode::Internal, DevMode::ThirdParty, DevMode::ServiceProvider] {
            assert_eq!(DevMode::parse(mode.as_str()), Some(mode));
        }
    }
}
