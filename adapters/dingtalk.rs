//! 钉钉开放平台适配器 / Dingtalk adapter
//!
//! The doc portal renders its navigation client-side, so the catalog comes
//! out of a driven browser page. One page serves the whole run; a page
//! cannot `goto` two places at once, so `page_lock` is held across every
//! goto/wait/read sequence and `max_concurrency` tells the runner to keep
//! the fetch pool at 1.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Mutex;

use super::common::{
    classify_doc_type, extract_dingtalk_api_path, extract_error_codes, html_to_text, polite_delay,
};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::browser::{BrowserDriver, ChromiumBrowser};

const BASE_URL: &str = "https://open.dingtalk.com";
const DELAY_MS: u64 = 1000;
const JITTER_MS: u64 = 500;

/// Pulls the flattened nav tree out of the page state / 从页面状态提取导航树
const CATALOG_SCRIPT: &str = r#"
(() => {
    const state = window.__INITIAL_STATE__ || {};
    const docs = [];
    const walk = (nodes, prefix) => {
        for (const node of nodes || []) {
            const segs = prefix.concat([node.title || '']);
            if (node.children && node.children.length) {
                walk(node.children, segs);
            } else if (node.slug) {
                docs.push({ path: segs.join('/'), title: node.title, slug: node.slug });
            }
        }
    };
    walk((state.docTree || {}).children, []);
    return JSON.stringify(docs);
})()
"#;

pub struct DingtalkAdapter {
    /// The single page everything goes through / 全程共用的一个页面
    browser: Mutex<Option<Arc<dyn BrowserDriver>>>,
    /// Held for the whole goto/wait/read sequence of one document
    /// / 覆盖单篇完整页面操作序列的锁
    page_lock: Mutex<()>,
}

impl DingtalkAdapter {
    pub fn new() -> Self {
        Self {
            browser: Mutex::new(None),
            page_lock: Mutex::new(()),
        }
    }

    /// Inject a driver (tests use this) / 注入驱动
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
                .context("launch browser for dingtalk")?,
        );
        *guard = Some(driver.clone());
        Ok(driver)
    }

    fn parse_catalog(raw: &str) -> Result<Vec<DocEntry>> {
        let docs: Vec<Value> =
            serde_json::from_str(raw).context("dingtalk catalog script returned bad JSON")?;
        let mut entries = Vec::new();
        for doc in docs {
            let (Some(path), Some(title), Some(slug)) = (
                doc.get("path").and_then(|v| v.as_str()),
                doc.get("title").and_then(|v| v.as_str()),
                doc.get("slug").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if title.is_empty() || slug.is_empty() {
                continue;
            }
            let mut entry = DocEntry::new(path, title, slug);
            entry.doc_type = classify_doc_type(&entry.title, &entry.path);
            entry.source_url = Some(format!("{}/document/{}", BASE_URL, slug));
            entries.push(entry);
        }
        Ok(entries)
    }

    fn extract_article(html: &str) -> Result<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("article, .doc-content, .markdown-body")
            .map_err(|_| anyhow!("bad article selector"))?;
        let node = document
            .select(&selector)
            .next()
            .ok_or_else(|| anyhow!("page has no article node"))?;
        Ok(node.inner_html())
    }
}

impl Default for DingtalkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for DingtalkAdapter {
    fn source_id(&self) -> &str {
        "dingtalk"
    }

    fn display_name(&self) -> &str {
        "钉钉开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let browser = self.browser().await?;
        // 锁住整段页面操作，期间不允许别的goto
        let _page = self.page_lock.lock().await;
        browser.goto(&format!("{}/document", BASE_URL)).await?;
        browser
            .wait_for(".menu-tree, nav", Duration::from_secs(15))
            .await?;
        let raw = browser.evaluate(CATALOG_SCRIPT).await?;
        let raw = raw
            .as_str()
            .ok_or_else(|| anyhow!("dingtalk catalog script returned no string"))?
            .to_string();
        let entries = Self::parse_catalog(&raw)?;
        tracing::info!("钉钉目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        polite_delay(DELAY_MS, JITTER_MS).await;
        let browser = self.browser().await?;
        let html = {
            let _page = self.page_lock.lock().await;
            let url = format!("{}/document/{}", BASE_URL, entry.platform_id);
            browser.goto(&url).await?;
            browser
                .wait_for("article, .doc-content", Duration::from_secs(15))
                .await?;
            browser.content().await?
        };
        let article = Self::extract_article(&html)?;

        let mut md = format!("# {}\n\n", entry.title);
        md.push_str(&html_to_text(&article));

        Ok(DocContent {
            api_path: extract_dingtalk_api_path(&md),
            error_codes: extract_error_codes(&md),
            markdown: md,
            metadata: None,
        })
    }

    /// One driven page means one fetch at a time / 单页驱动，并发固定为1
    fn max_concurrency(&self) -> usize {
        1
    }
}

pub struct DingtalkFactory;

impl AdapterFactory for DingtalkFactory {
    fn adapter_type(&self) -> &'static str {
        "dingtalk"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(DingtalkAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let raw = r#"[
            {"path": "服务端API/获取token", "title": "获取token", "slug": "get-token"},
            {"path": "无slug", "title": "无slug", "slug": ""}
        ]"#;
        let entries = DingtalkAdapter::parse_catalog(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].platform_id, "get-token");
    }

    #[test]
    fn test_extract_article() {
        let html = "<html><body><nav>菜单</nav><article><h2>接口</h2><p>说明</p></article></body></html>";
        let article = DingtalkAdapter::extract_article(html).unwrap();
        assert!(article.contains("接口"));
        assert!(!article.contains("菜单"));
    }

    #[test]
    fn test_extract_article_missing() {
        assert!(DingtalkAdapter::extract_article("<html><body>空</body></html>").is_err());
    }
}
