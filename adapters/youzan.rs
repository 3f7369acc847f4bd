//! 有赞云适配器 / Youzan adapter
//!
//! The doc center lists APIs as a flat JSON array with version and group
//! fields; bodies are already close to Markdown.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::common::{extract_error_codes, html_to_text, http_client, polite_delay};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::models::DocType;

const BASE_URL: &str = "https://doc.youzanyun.com";
const DELAY_MS: u64 = 800;
const JITTER_MS: u64 = 300;

pub struct YouzanAdapter {
    client: reqwest::Client,
}

impl YouzanAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(20),
        }
    }
}

impl Default for YouzanAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for YouzanAdapter {
    fn source_id(&self) -> &str {
        "youzan"
    }

    fn display_name(&self) -> &str {
        "有赞云"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let value: Value = self
            .client
            .get(format!("{}/api/doc/list-api", BASE_URL))
            .send()
            .await
            .context("youzan catalog request")?
            .json()
            .await
            .context("youzan catalog is not JSON")?;
        let list = value
            .pointer("/data/apis")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("youzan catalog payload missing apis"))?;

        let mut entries = Vec::new();
        for item in list {
            let Some(name) = item.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let version = item.get("version").and_then(|v| v.as_str()).unwrap_or("1.0.0");
            let group = item.get("group").and_then(|v| v.as_str()).unwrap_or("api");
            let title = item
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or(name)
                .to_string();

            let mut entry = DocEntry::new(
                format!("{}/{}/{}", group, name, version),
                title,
                format!("{}:{}", name, version),
            );
            entry.doc_type = DocType::ApiReference;
            entry.api_path = Some(format!("{}/api/{}/{}", BASE_URL, name, version));
            entry.source_url = Some(format!("{}/docDetail/{}/{}", BASE_URL, name, version));
            entries.push(entry);
        }
        tracing::info!("有赞目录: {} 个接口", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let (name, version) = entry
            .platform_id
            .split_once(':')
            .ok_or_else(|| anyhow!("bad youzan platform id: {}", entry.platform_id))?;
        let value: Value = self
            .client
            .get(format!("{}/api/doc/detail/{}/{}", BASE_URL, name, version))
            .send()
            .await
            .with_context(|| format!("youzan doc {}", entry.platform_id))?
            .json()
            .await
            .context("youzan doc is not JSON")?;

        let body = value
            .pointer("/data/doc")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("youzan doc {} has no body", entry.platform_id))?;

        let mut md = format!("# {}\n\n", entry.title);
        if body.contains('<') {
            md.push_str(&html_to_text(body));
        } else {
            md.push_str(body);
        }

        Ok(DocContent {
            error_codes: extract_error_codes(&md),
            api_path: entry.api_path.clone(),
            markdown: md,
            metadata: Some(serde_json::json!({ "api_version": version })),
        })
    }
}

pub struct YouzanFactory;

impl AdapterFactory for YouzanFactory {
    fn adapter_type(&self) -> &'static str {
        "youzan"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(YouzanAdapter::new()))
    }
}
