//! Browser driver boundary / 浏览器驱动边界
//!
//! A few platforms only expose their catalogs through rendered pages, and
//! the Wecom interactive login needs a real window. Everything browser-ish
//! goes through the `BrowserDriver` trait; CDP types never leak out of this
//! module.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;

/// A cookie captured from the browser session / 浏览器会话中的Cookie
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Minimal page-driving interface / 页面驱动接口
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    /// Rendered page HTML / 渲染后的页面HTML
    async fn content(&self) -> Result<String>;
    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;
    async fn close(&self) -> Result<()>;
}

/// Common Chrome executable locations / 常见的Chrome安装路径
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

fn find_chrome() -> Result<std::path::PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(std::path::PathBuf::from(path));
                }
            }
        }
    }
    Err(anyhow!(
        "Chrome/Chromium not found; install it or set up cookies via environment instead"
    ))
}

/// chromiumoxide-backed driver holding one page / 基于chromiumoxide的单页驱动
pub struct ChromiumBrowser {
    browser: Arc<Mutex<Browser>>,
    page: Page,
}

impl ChromiumBrowser {
    /// Launch a browser and open a blank page / 启动浏览器并打开空白页
    ///
    /// `headless = false` shows a window for interactive logins.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome = find_chrome()?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch browser")?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.context("open page")?;
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            page,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("goto {}", url))?;
        self.page.wait_for_navigation().await.ok();
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(anyhow!("timeout waiting for selector: {}", selector));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("find {}", selector))?;
        element.click().await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.ok();
        Ok(())
    }
}
