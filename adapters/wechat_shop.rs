//! 微信小店适配器 / WeChat shop adapter
//!
//! Shares the docs-site conventions with the miniprogram adapter but walks
//! the channels/shop tree, which nests two levels deep.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::common::{
    classify_doc_type, extract_error_codes, extract_weixin_api_path, html_to_text, http_client,
    polite_delay,
};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};

const BASE_URL: &str = "https://developers.weixin.qq.com";
const ROOT: &str = "doc/store/shop";
const DELAY_MS: u64 = 1000;
const JITTER_MS: u64 = 500;

pub struct WechatShopAdapter {
    client: reqwest::Client,
}

impl WechatShopAdapter {
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

            if let Some(children) = node.get("items").and_then(|v| v.as_array()) {
                if !children.is_empty() {
                    Self::flatten(children, &segments, out);
                    continue;
                }
            }
            let Some(path) = node.get("path").and_then(|v| v.as_str()) else {
                continue;
            };
            let mut entry = DocEntry::new(segments.join("/"), title, path.trim_matches('/'));
            entry.doc_type = classify_doc_type(&entry.title, &entry.path);
            entry.source_url = Some(format!("{}/{}/{}.html", BASE_URL, ROOT, path.trim_matches('/')));
            out.push(entry);
        }
    }
}

impl Default for WechatShopAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for WechatShopAdapter {
    fn source_id(&self) -> &str {
        "wechat_shop"
    }

    fn display_name(&self) -> &str {
        "微信小店"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let value: Value = self
            .client
            .get(format!("{}/{}/catalog.json", BASE_URL, ROOT))
            .send()
            .await
            .context("wechat shop catalog request")?
            .json()
            .await
            .context("wechat shop catalog is not JSON")?;
        let nodes = value
            .get("catalog")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("wechat shop catalog payload missing catalog"))?;

        let mut entries = Vec::new();
        Self::flatten(nodes, &[], &mut entries);
        tracing::info!("微信小店目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let html = self
            .client
            .get(format!("{}/{}/{}.html", BASE_URL, ROOT, entry.platform_id))
            .send()
            .await
            .with_context(|| format!("wechat shop doc {}", entry.platform_id))?
            .text()
            .await?;

        let mut md = format!("# {}\n\n", entry.title);
        md.push_str(&html_to_text(&html));

        Ok(DocContent {
            api_path: extract_weixin_api_path(&md),
            error_codes: extract_error_codes(&md),
            markdown: md,
            metadata: None,
        })
    }
}

pub struct WechatShopFactory;

impl AdapterFactory for WechatShopFactory {
    fn adapter_type(&self) -> &'static str {
        "wechat_shop"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(WechatShopAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_two_levels() {
        let nodes = vec![json!({
            "title": "商品管理",
            "items": [
                { "title": "新增商品", "path": "/product/add" }
            ]
        })];
        let mut entries = Vec::new();
        WechatShopAdapter::flatten(&nodes, &[], &mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "商品管理/新增商品");
        assert_eq!(entries[0].platform_id, "product/add");
    }
}
