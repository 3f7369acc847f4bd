//! 微信小程序适配器 / WeChat miniprogram adapter
//!
//! The docs site exposes a JSON sitemap per section; server-side API pages
//! carry `https://api.weixin.qq.com/...` routes.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::common::{
    extract_error_codes, extract_weixin_api_path, html_to_text, http_client, polite_delay,
};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::models::DocType;

const BASE_URL: &str = "https://developers.weixin.qq.com";
const DELAY_MS: u64 = 1000;
const JITTER_MS: u64 = 500;

/// Doc sections walked per run / 每次运行遍历的栏目
const SECTIONS: &[(&str, &str)] = &[
    ("api", "miniprogram/dev/api-backend"),
    ("framework", "miniprogram/dev/framework"),
    ("component", "miniprogram/dev/component"),
];

pub struct WechatMiniprogramAdapter {
    client: reqwest::Client,
}

impl WechatMiniprogramAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(20),
        }
    }

    async fn fetch_section(&self, section: &str, root: &str) -> Result<Vec<DocEntry>> {
        let value: Value = self
            .client
            .get(format!("{}/{}/sitemap.json", BASE_URL, root))
            .send()
            .await
            .with_context(|| format!("miniprogram section {}", section))?
            .json()
            .await
            .context("miniprogram sitemap is not JSON")?;
        let pages = value
            .get("pages")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("miniprogram sitemap missing pages"))?;

        let mut entries = Vec::new();
        for page in pages {
            let (Some(path), Some(title)) = (
                page.get("path").and_then(|v| v.as_str()),
                page.get("title").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let mut entry = DocEntry::new(
                format!("{}/{}", section, path.trim_matches('/')),
                title,
                format!("{}/{}", root, path.trim_matches('/')),
            );
            entry.doc_type = if section == "api" {
                DocType::ApiReference
            } else {
                DocType::Guide
            };
            entry.source_url = Some(format!("{}/{}/{}.html", BASE_URL, root, path.trim_matches('/')));
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl Default for WechatMiniprogramAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for WechatMiniprogramAdapter {
    fn source_id(&self) -> &str {
        "wechat_miniprogram"
    }

    fn display_name(&self) -> &str {
        "微信小程序"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let mut entries = Vec::new();
        // 目录阶段串行，避免给站点压力
        for (section, root) in SECTIONS {
            match self.fetch_section(section, root).await {
                Ok(batch) => entries.extend(batch),
                Err(e) => tracing::warn!("小程序栏目 {} 拉取失败: {}", section, e),
            }
            polite_delay(DELAY_MS, JITTER_MS).await;
        }
        if entries.is_empty() {
            return Err(anyhow!("miniprogram catalog came back empty"));
        }
        tracing::info!("小程序目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let html = self
            .client
            .get(format!("{}/{}.html", BASE_URL, entry.platform_id))
            .send()
            .await
            .with_context(|| format!("miniprogram doc {}", entry.platform_id))?
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

pub struct WechatMiniprogramFactory;

impl AdapterFactory for WechatMiniprogramFactory {
    fn adapter_type(&self) -> &'static str {
        "wechat_miniprogram"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(WechatMiniprogramAdapter::new()))
    }
}
