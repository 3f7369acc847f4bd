//! Cookie management / Cookie管理
//!
//! Credentials come from the `WECOM_COOKIES` environment variable, either a
//! raw cookie header or a path to a JSON file. When neither works and a
//! display is available, a headful browser window lets a human log in and
//! the resulting cookies are persisted for the next run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::browser::{BrowserCookie, BrowserDriver, ChromiumBrowser};

const LOGIN_URL: &str = "https://developer.work.weixin.qq.com/";
/// Selector that only renders for a signed-in session / 登录后才出现的元素
const LOGGED_IN_SELECTOR: &str = ".login-user, .user-avatar";
const LOGIN_WAIT: Duration = Duration::from_secs(300);

/// Resolve the cookie header / 解析Cookie请求头
///
/// `WECOM_COOKIES` may hold the header itself or point at a JSON file of
/// `{name, value, domain}` records.
pub fn load_cookie_header() -> Option<String> {
    let raw = std::env::var("WECOM_COOKIES").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let as_path = Path::new(trimmed);
    if as_path.exists() {
        match read_cookie_file(as_path) {
            Ok(header) => return Some(header),
            Err(e) => {
                tracing::warn!("Cookie file unreadable: {}: {}", as_path.display(), e);
                return None;
            }
        }
    }
    Some(trimmed.to_string())
}

/// Default persistence location / 默认的Cookie持久化位置
pub fn cookie_file_path() -> PathBuf {
    PathBuf::from("./data/wecom_cookies.json")
}

fn read_cookie_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read cookie file {}", path.display()))?;
    let cookies: Vec<BrowserCookie> =
        serde_json::from_str(&text).context("cookie file is not a JSON cookie array")?;
    Ok(header_from_cookies(&cookies))
}

pub fn header_from_cookies(cookies: &[BrowserCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persist cookies for later runs / 持久化Cookie
pub fn persist_cookies(path: &Path, cookies: &[BrowserCookie]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let text = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, text).with_context(|| format!("write cookie file {}", path.display()))?;
    tracing::info!("Cookies persisted: {}", path.display());
    Ok(())
}

/// Interactive login fallback / 人工登录兜底
///
/// Opens a visible browser window, waits for the operator to complete the
/// scan-code login, then captures and persists the session cookies.
pub async fn interactive_login() -> Result<String> {
    tracing::warn!("⚠️ Cookie失效，打开浏览器窗口等待人工登录（最长5分钟）");
    let browser = ChromiumBrowser::launch(false).await?;
    browser.goto(LOGIN_URL).await?;
    browser
        .wait_for(LOGGED_IN_SELECTOR, LOGIN_WAIT)
        .await
        .map_err(|_| anyhow!("login window timed out without a signed-in session"))?;

    let cookies = browser.cookies().await?;
    browser.close().await.ok();
    if cookies.is_empty() {
        return Err(anyhow!("browser session yielded no cookies"));
    }
    persist_cookies(&cookie_file_path(), &cookies)?;
    Ok(header_from_cookies(&cookies))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_from_cookies() {
        let cookies = vec![
            BrowserCookie {
                name: "wwrtx.sid".into(),
                value: "abc".into(),
                domain: ".work.weixin.qq.com".into(),
            },
            BrowserCookie {
                name: "wwrtx.vid".into(),
                value: "123".into(),
                domain: ".work.weixin.qq.com".into(),
            },
        ];
        assert_eq!(header_from_cookies(&cookies), "wwrtx.sid=abc; wwrtx.vid=123");
    }

    #[test]
    fn test_persist_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let cookies = vec![BrowserCookie {
            name: "sid".into(),
            value: "v".into(),
            domain: "x".into(),
        }];
        persist_cookies(&path, &cookies).unwrap();
        assert_eq!(read_cookie_file(&path).unwrap(), "sid=v");
    }
}
