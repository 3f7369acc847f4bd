//! 飞书开放平台适配器 / Feishu adapter
//!
//! The doc portal serves its navigation tree and document bodies as JSON.
//! Routes look like `/open-apis/...` and carry explicit HTTP methods.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use super::common::{
    classify_doc_type, extract_error_codes, extract_feishu_api_path, html_to_text, http_client,
    polite_delay,
};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};

const BASE_URL: &str = "https://open.feishu.cn";
const DELAY_MS: u64 = 800;
const JITTER_MS: u64 = 400;

/// Navigation node of the doc portal / 文档门户导航节点
#[derive(Debug, Clone, Deserialize)]
struct NavNode {
    #[serde(default)]
    node_token: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    has_child: bool,
    #[serde(default)]
    children: Vec<NavNode>,
    #[serde(default)]
    update_time: Option<i64>,
}

pub struct FeishuAdapter {
    client: reqwest::Client,
}

impl FeishuAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(20),
        }
    }

    async fn fetch_nav_tree(&self) -> Result<Vec<NavNode>> {
        let url = format!("{}/document_portal/v1/catalog", BASE_URL);
        let value: Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("feishu catalog request")?
            .json()
            .await
            .context("feishu catalog is not JSON")?;
        let nodes = value
            .pointer("/data/nodes")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("feishu catalog payload missing nodes"))?;
        Ok(nodes
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect())
    }

    fn flatten(nodes: &[NavNode], prefix: &[String], out: &mut Vec<DocEntry>) {
        for node in nodes {
            if node.title.is_empty() {
                continue;
            }
            let mut segments = prefix.to_vec();
            segments.push(node.title.clone());

            if node.has_child || !node.children.is_empty() {
                Self::flatten(&node.children, &segments, out);
                continue;
            }
            if node.node_token.is_empty() {
                continue;
            }

            let mut entry = DocEntry::new(
                segments.join("/"),
                node.title.clone(),
                node.node_token.clone(),
            );
            entry.doc_type = classify_doc_type(&entry.title, &entry.path);
            entry.source_url = Some(format!("{}/document/{}", BASE_URL, node.node_token));
            entry.last_updated = node
                .update_time
                .and_then(|ts| DateTime::from_timestamp(ts, 0));
            out.push(entry);
        }
    }
}

impl Default for FeishuAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for FeishuAdapter {
    fn source_id(&self) -> &str {
        "feishu"
    }

    fn display_name(&self) -> &str {
        "飞书开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let tree = self.fetch_nav_tree().await?;
        let mut entries = Vec::new();
        Self::flatten(&tree, &[], &mut entries);
        tracing::info!("飞书目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let url = format!(
            "{}/document_portal/v1/document/{}",
            BASE_URL, entry.platform_id
        );
        let value: Value = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("feishu doc {}", entry.platform_id))?
            .json()
            .await
            .context("feishu doc is not JSON")?;

        let body = value
            .pointer("/data/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("feishu doc {} has no content", entry.platform_id))?;

        // 正文字段是HTML还是Markdown由内容类型标记决定
        let content_type = value
            .pointer("/data/content_type")
            .and_then(|v| v.as_str())
            .unwrap_or("html");
        let mut md = format!("# {}\n\n", entry.title);
        if content_type == "markdown" {
            md.push_str(body);
        } else {
            md.push_str(&html_to_text(body));
        }

        Ok(DocContent {
            api_path: extract_feishu_api_path(&md),
            error_codes: extract_error_codes(&md),
            markdown: md,
            metadata: value
                .pointer("/data/locale")
                .map(|l| serde_json::json!({ "locale": l })),
        })
    }
}

pub struct FeishuFactory;

impl AdapterFactory for FeishuFactory {
    fn adapter_type(&self) -> &'static str {
        "feishu"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(FeishuAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_skips_folders_and_joins_paths() {
        let tree = vec![NavNode {
            node_token: String::new(),
            title: "服务端API".into(),
            has_child: true,
            children: vec![NavNode {
                node_token: "tok123".into(),
                title: "发送消息".into(),
                has_child: false,
                children: vec![],
                update_time: Some(1700000000),
            }],
            update_time: None,
        }];
        let mut entries = Vec::new();
        FeishuAdapter::flatten(&tree, &[], &mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "服务端API/发送消息");
        assert_eq!(entries[0].platform_id, "tok123");
        assert!(entries[0].last_updated.is_some());
    }
}
