//! 小红书开放平台适配器 / Xiaohongshu adapter
//!
//! Same shape as the other browser-driven adapter: the portal is a SPA, so
//! both catalog and content come from one driven page. `page_lock` covers
//! each full goto/wait/read sequence and `max_concurrency` keeps the
//! runner's fetch pool at 1.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Mutex;

use super::common::{classify_doc_type, extract_error_codes, html_to_text, polite_delay};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::browser::{BrowserDriver, ChromiumBrowser};

const BASE_URL: &str = "https://open.xiaohongshu.com";
const DELAY_MS: u64 = 1500;
const JITTER_MS: u64 = 500;

/// Reads the sidebar links / 读取侧边栏链接
const CATALOG_SCRIPT: &str = r#"
(() => {
    const items = [];
    document.querySelectorAll('.doc-menu a[href*="/document/"]').forEach(a => {
        const href = a.getAttribute('href') || '';
        const id = href.split('/document/')[1] || '';
        const group = a.closest('.menu-group');
        const groupName = group ? (group.querySelector('.group-title')||{}).textContent || '' : '';
        if (id) items.push({ id: id, title: a.textContent.trim(), group: groupName.trim() });
    });
    return JSON.stringify(items);
})()
"#;

pub struct XiaohongshuAdapter {
    browser: Mutex<Option<Arc<dyn BrowserDriver>>>,
    /// Held for the whole goto/wait/read sequence of one document
    /// / 覆盖单篇完整页面操作序列的锁
    page_lock: Mutex<()>,
}

impl XiaohongshuAdapter {
    pub fn new() -> Self {
        Self {
            browser: Mutex::new(None),
            page_lock: Mutex::new(()),
        }
    }

    pub fn with_browser(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            browser: Mutex::new(Some(driver)),
            page_lock: Mutex::new(()),
        }
    }

    async fn browser(&self) -> Result<Arc<dyn BrowserDriver>> {
        let mut guard = self.browser.lock().await;
        if let Some(driver) = guard.as_ref() {
            return Ok(driver.clone());
        }
        let driver: Arc<dyn BrowserDriver> = Arc::new(
            ChromiumBrowser::launch(true)
                .await
                .context("launch browser for xiaohongshu")?,
        );
        *guard = Some(driver.clone());
        Ok(driver)
    }

    fn parse_catalog(raw: &str) -> Result<Vec<DocEntry>> {
        let items: Vec<Value> =
            serde_json::from_str(raw).context("xiaohongshu catalog script returned bad JSON")?;
        let mut entries = Vec::new();
        for item in items {
            let (Some(id), Some(title)) = (
                item.get("id").and_then(|v| v.as_str()),
                item.get("title").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if id.is_empty() || title.is_empty() {
                continue;
            }
            let group = item
                .get("group")
                .and_then(|v| v.as_str())
                .filter(|g| !g.is_empty())
                .unwrap_or("api");
            let mut entry = DocEntry::new(format!("{}/{}", group, title), title, id);
            entry.doc_type = classify_doc_type(&entry.title, &entry.path);
            entry.source_url = Some(format!("{}/document/{}", BASE_URL, id));
            entries.push(entry);
        }
        Ok(entries)
    }

    fn extract_body(html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse(".doc-body, .doc-detail, main")
            .map_err(|_| anyhow!("bad body selector"))?;
        let node = document
            .select(&selector)
            .next()
            .ok_or_else(|| anyhow!("page has no doc body"))?;
        Ok(node.inner_html())
    }
}

impl Default for XiaohongshuAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for XiaohongshuAdapter {
    fn source_id(&self) -> &str {
        "xiaohongshu"
    }

    fn display_name(&self) -> &str {
        "小红书开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let browser = self.browser().await?;
        // 锁住整段页面操作，期间不允许别的goto
        let _page = self.page_lock.lock().await;
        browser.goto(&format!("{}/document", BASE_URL)).await?;
        browser
            .wait_for(".doc-menu", Duration::from_secs(15))
            .await?;
        let raw = browser.evaluate(CATALOG_SCRIPT).await?;
        let raw = raw
            .as_str()
            .ok_or_else(|| anyhow!("xiaohongshu catalog script returned no string"))?
            .to_string();
        let entries = Self::parse_catalog(&raw)?;
        tracing::info!("小红书目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let browser = self.browser().await?;
        let html = {
            let _page = self.page_lock.lock().await;
            browser
                .goto(&format!("{}/document/{}", BASE_URL, entry.platform_id))
                .await?;
            browser
                .wait_for(".doc-body, .doc-detail", Duration::from_secs(15))
                .await?;
            browser.content().await?
        };
        let body = Self::extract_body(&html)?;

        let mut md = format!("# {}\n\n", entry.title);
        md.push_str(&html_to_text(&body));

        Ok(DocContent {
            error_codes: extract_error_codes(&md),
            api_path: None,
            markdown: md,
            metadata: None,
        })
    }

    /// One driven page means one fetch at a time / 单页驱动，并发固定为1
    fn max_concurrency(&self) -> usize {
        1
    }
}

pub struct XiaohongshuFactory;

impl AdapterFactory for XiaohongshuFactory {
    fn adapter_type(&self) -> &'static str {
        "xiaohongshu"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(XiaohongshuAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_groups() {
        let raw = r#"[
            {"id": "note-publish", "title": "发布笔记", "group": "内容API"},
            {"id": "", "title": "空ID"}
        ]"#;
        let entries = XiaohongshuAdapter::parse_catalog(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "内容API/发布笔记");
    }
}
