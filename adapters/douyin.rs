//! 抖音开放平台适配器 / Douyin adapter
//!
//! Straightforward JSON portal: one request for the doc tree, one per
//! document body.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::common::{classify_doc_type, extract_error_codes, html_to_text, http_client, polite_delay};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};

const BASE_URL: &str = "https://developer.open-douyin.com";
const DELAY_MS: u64 = 1000;
const JITTER_MS: u64 = 500;

pub struct DouyinAdapter {
    client: reqwest::Client,
}

impl DouyinAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(20),
        }
    }

    fn flatten(nodes: &[Value], prefix: &[String], out: &mut Vec<DocEntry>) {
        for node in nodes {
            let title = node.get("title").and_then(|v| v.as_str()).unwrap_or("");
            if title.is_empty() {
                continue;
            }
            let mut segments = prefix.to_vec();
            segments.push(title.to_string());

            if let Some(children) = node.get("children").and_then(|v| v.as_array()) {
                if !children.is_empty() {
                    Self::flatten(children, &segments, out);
                    continue;
                }
            }
            let Some(article_id) = node.get("articleId").and_then(|v| v.as_str()) else {
                continue;
            };
            let mut entry = DocEntry::new(segments.join("/"), title, article_id);
            entry.doc_type = classify_doc_type(&entry.title, &entry.path);
            entry.source_url = Some(format!("{}/docs/resource/{}", BASE_URL, article_id));
            out.push(entry);
        }
    }
}

impl Default for DouyinAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for DouyinAdapter {
    fn source_id(&self) -> &str {
        "douyin"
    }

    fn display_name(&self) -> &str {
        "抖音开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let value: Value = self
            .client
            .get(format!("{}/api/docs/tree", BASE_URL))
            .send()
            .await
            .context("douyin catalog request")?
            .json()
            .await
            .context("douyin catalog is not JSON")?;
        let nodes = value
            .pointer("/data/tree")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("douyin catalog payload missing tree"))?;

        let mut entries = Vec::new();
        Self::flatten(nodes, &[], &mut entries);
        tracing::info!("抖音目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let value: Value = self
            .client
            .get(format!(
                "{}/api/docs/article/{}",
                BASE_URL, entry.platform_id
            ))
            .send()
            .await
            .with_context(|| format!("douyin doc {}", entry.platform_id))?
            .json()
            .await
            .context("douyin doc is not JSON")?;

        let html = value
            .pointer("/data/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("douyin doc {} has no content", entry.platform_id))?;

        let mut md = format!("# {}\n\n", entry.title);
        md.push_str(&html_to_text(html));

        Ok(DocContent {
            error_codes: extract_error_codes(&md),
            api_path: value
                .pointer("/data/apiPath")
                .and_then(|v| v.as_str())
                .map(String::from),
            markdown: md,
            metadata: None,
        })
    }
}

pub struct DouyinFactory;

impl AdapterFactory for DouyinFactory {
    fn adapter_type(&self) -> &'static str {
        "douyin"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(DouyinAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_tree() {
        let tree = vec![json!({
            "title": "小程序",
            "children": [
                { "title": "登录", "articleId": "art-1" },
                { "title": "空目录", "children": [] }
            ]
        })];
        let mut entries = Vec::new();
        DouyinAdapter::flatten(&tree, &[], &mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "小程序/登录");
    }
}
