//! 拼多多适配器 / Pinduoduo adapter
//!
//! The portal requires an authenticated browser session we cannot
//! reasonably automate, so this adapter reads a JSON dump exported from a
//! logged-in session (`PDD_JSON_PATH`). A `PDD_COOKIE` is honored for the
//! occasional live refresh of single documents.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::common::{extract_error_codes, html_to_text, http_client, polite_delay};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::models::DocType;

const BASE_URL: &str = "https://open.pinduoduo.com";
const DELAY_MS: u64 = 1500;
const JITTER_MS: u64 = 500;

/// One record of the exported dump / 导出文件中的一条记录
#[derive(Debug, Clone, Deserialize)]
struct DumpRecord {
    id: String,
    #[serde(rename = "catName", default)]
    cat_name: String,
    #[serde(rename = "apiName", default)]
    api_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

pub struct PinduoduoAdapter {
    dump_path: PathBuf,
    cookie: Option<String>,
    client: reqwest::Client,
}

impl PinduoduoAdapter {
    pub fn new() -> Self {
        let dump_path = std::env::var("PDD_JSON_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/pdd_docs.json"));
        Self {
            dump_path,
            cookie: std::env::var("PDD_COOKIE").ok().filter(|c| !c.is_empty()),
            client: http_client(30),
        }
    }

    fn load_dump(&self) -> Result<Vec<DumpRecord>> {
        let text = std::fs::read_to_string(&self.dump_path).with_context(|| {
            format!(
                "pinduoduo dump not readable: {} (set PDD_JSON_PATH)",
                self.dump_path.display()
            )
        })?;
        let records: Vec<DumpRecord> =
            serde_json::from_str(&text).context("pinduoduo dump is not a JSON record array")?;
        Ok(records)
    }

    fn record_to_entry(record: &DumpRecord) -> DocEntry {
        let category = if record.cat_name.is_empty() {
            "api"
        } else {
            record.cat_name.as_str()
        };
        let title = if record.title.is_empty() {
            record.api_name.clone()
        } else {
            record.title.clone()
        };
        let mut entry = DocEntry::new(
            format!("{}/{}", category, record.api_name),
            title,
            record.id.clone(),
        );
        entry.api_path = Some(record.api_name.clone());
        entry.doc_type = DocType::ApiReference;
        entry.source_url = Some(format!("{}/application/document/api?id={}", BASE_URL, record.id));
        entry
    }

    /// Live fetch of one document, cookie permitting / 有Cookie时的在线刷新
    async fn fetch_live(&self, id: &str) -> Result<String> {
        let cookie = self
            .cookie
            .as_ref()
            .ok_or_else(|| anyhow!("no PDD_COOKIE configured"))?;
        polite_delay(DELAY_MS, JITTER_MS).await;
        let value: Value = self
            .client
            .get(format!("{}/api/document/detail?id={}", BASE_URL, id))
            .header("Cookie", cookie.clone())
            .send()
            .await
            .with_context(|| format!("pinduoduo doc {}", id))?
            .json()
            .await
            .context("pinduoduo doc is not JSON")?;
        value
            .pointer("/result/content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("pinduoduo doc {} has no content", id))
    }
}

impl Default for PinduoduoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for PinduoduoAdapter {
    fn source_id(&self) -> &str {
        "pinduoduo"
    }

    fn display_name(&self) -> &str {
        "拼多多开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let records = self.load_dump()?;
        let entries: Vec<DocEntry> = records.iter().map(Self::record_to_entry).collect();
        tracing::info!("拼多多目录（来自导出文件）: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        // 优先在线刷新，失败或没配Cookie时用导出内容
        let raw = match self.fetch_live(&entry.platform_id).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("拼多多在线拉取失败，回退导出内容: {}", e);
                let records = self.load_dump()?;
                records
                    .into_iter()
                    .find(|r| r.id == entry.platform_id)
                    .map(|r| r.content)
                    .ok_or_else(|| anyhow!("doc {} missing from dump", entry.platform_id))?
            }
        };

        let mut md = format!("# {}\n\n", entry.title);
        if raw.contains('<') {
            md.push_str(&html_to_text(&raw));
        } else {
            md.push_str(&raw);
        }

        Ok(DocContent {
            error_codes: extract_error_codes(&md),
            api_path: entry.api_path.clone(),
            markdown: md,
            metadata: None,
        })
    }
}

pub struct PinduoduoFactory;

impl AdapterFactory for PinduoduoFactory {
    fn adapter_type(&self) -> &'static str {
        "pinduoduo"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(PinduoduoAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_to_entry() {
        let record = DumpRecord {
            id: "123".into(),
            cat_name: "商品".into(),
            api_name: "pdd.goods.detail.get".into(),
            title: "商品详情".into(),
            content: "正文".into(),
        };
        let entry = PinduoduoAdapter::record_to_entry(&record);
        assert_eq!(entry.path, "商品/pdd.goods.detail.get");
        assert_eq!(entry.api_path.as_deref(), Some("pdd.goods.detail.get"));
        assert_eq!(entry.platform_id, "123");
    }
}
