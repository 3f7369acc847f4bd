//! 淘宝开放平台适配器 / Taobao adapter
//!
//! The most defensive adapter: the portal sits behind aggressive anti-bot
//! checks. Requests are paced at ~2 s with jitter, the run takes a minute
//! off every 100 requests, and a challenge response triggers a long
//! backoff plus a session refresh before retrying.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::common::{extract_error_codes, html_to_text, http_client, polite_delay};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::models::DocType;

const BASE_URL: &str = "https://open.taobao.com";
const DELAY_MS: u64 = 2000;
const JITTER_MS: u64 = 1000;
/// Long break cadence / 长休息的请求间隔
const BREAK_EVERY: u64 = 100;
const BREAK_SECS: u64 = 60;
/// First anti-bot backoff; doubles on the second offense / 首次反爬退避
const ANTIBOT_BACKOFF_SECS: u64 = 300;
const ANTIBOT_MAX_RETRIES: u32 = 2;
/// Session tokens go stale quickly / 会话令牌的刷新周期
const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Classify an anti-bot challenge response / 识别反爬响应
///
/// Marker strings, punish/x5sec redirect URLs, captcha actions, and any
/// body that is not a JSON object all count as challenges.
pub fn is_anti_bot(body: &str) -> bool {
    if body.contains("RGV587_ERROR") || body.contains("FAIL_SYS_USER_VALIDATE") {
        return true;
    }
    if body.contains("action=captcha") {
        return true;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            if let Some(url) = map.get("url").and_then(|v| v.as_str()) {
                if url.contains("punish") || url.contains("x5sec") {
                    return true;
                }
            }
            false
        }
        _ => true,
    }
}

struct Session {
    token: String,
    fetched_at: Instant,
}

pub struct TaobaoAdapter {
    client: reqwest::Client,
    /// Refresh is serialized through this lock / 刷新互斥
    session: Mutex<Option<Session>>,
    request_count: AtomicU64,
}

impl TaobaoAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(30),
            session: Mutex::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    /// Pace plus the long break every 100 requests / 节奏控制与定期长休息
    async fn pace(&self) {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        if n % BREAK_EVERY == 0 {
            tracing::info!("淘宝已请求 {} 次，休息 {} 秒", n, BREAK_SECS);
            tokio::time::sleep(Duration::from_secs(BREAK_SECS)).await;
        }
        polite_delay(DELAY_MS, JITTER_MS).await;
    }

    /// Get a fresh-enough session token / 获取足够新鲜的会话令牌
    ///
    /// Only one refresh runs at a time; concurrent callers wait on the
    /// lock and reuse the token the winner fetched.
    async fn session_token(&self, force_refresh: bool) -> Result<String> {
        let mut guard = self.session.lock().await;
        if !force_refresh {
            if let Some(session) = guard.as_ref() {
                if session.fetched_at.elapsed() < SESSION_TTL {
                    return Ok(session.token.clone());
                }
            }
        }
        tracing::debug!("刷新淘宝会话令牌");
        let body = self
            .client
            .get(format!("{}/api/session/get", BASE_URL))
            .send()
            .await
            .context("taobao session request")?
            .text()
            .await?;
        let value: Value =
            serde_json::from_str(&body).context("taobao session response is not JSON")?;
        let token = value
            .pointer("/data/token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("taobao session payload has no token"))?
            .to_string();
        *guard = Some(Session {
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(token)
    }

    /// GET with anti-bot handling / 带反爬处理的请求
    ///
    /// On a challenge: back off five minutes (doubled the second time),
    /// refresh the session, retry. The third challenge is fatal.
    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut attempts = 0u32;
        loop {
            self.pace().await;
            let token = self.session_token(attempts > 0).await?;
            let body = self
                .client
                .get(url)
                .header("x-open-token", &token)
                .send()
                .await
                .with_context(|| format!("taobao request {}", url))?
                .text()
                .await?;

            if is_anti_bot(&body) {
                attempts += 1;
                if attempts > ANTIBOT_MAX_RETRIES {
                    return Err(anyhow!("taobao anti-bot challenge persisted: {}", url));
                }
                let backoff = ANTIBOT_BACKOFF_SECS * (1 << (attempts - 1) as u64);
                tracing::warn!(
                    "淘宝反爬命中（第{}次），退避 {} 秒后刷新会话重试",
                    attempts,
                    backoff
                );
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }

            return serde_json::from_str(&body).context("taobao body is not JSON");
        }
    }
}

impl Default for TaobaoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for TaobaoAdapter {
    fn source_id(&self) -> &str {
        "taobao"
    }

    fn display_name(&self) -> &str {
        "淘宝开放平台"
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let value = self
            .get_json(&format!("{}/api/doc/list?treeId=1", BASE_URL))
            .await?;
        let list = value
            .pointer("/data/docList")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("taobao catalog payload missing docList"))?;

        let mut entries = Vec::new();
        for item in list {
            let Some(doc_id) = item.get("docId").and_then(|v| v.as_i64()) else {
                continue;
            };
            let title = item
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            if title.is_empty() {
                continue;
            }
            let category = item
                .get("category")
                .and_then(|v| v.as_str())
                .unwrap_or("api");
            let mut entry = DocEntry::new(
                format!("{}/{}", category, doc_id),
                title,
                doc_id.to_string(),
            );
            entry.doc_type = DocType::ApiReference;
            entry.source_url = Some(format!("{}/doc.htm?docId={}", BASE_URL, doc_id));
            entries.push(entry);
        }
        tracing::info!("淘宝目录: {} 篇文档", entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        let value = self
            .get_json(&format!(
                "{}/api/doc/detail?docId={}",
                BASE_URL, entry.platform_id
            ))
            .await?;
        let html = value
            .pointer("/data/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("taobao doc {} has no content", entry.platform_id))?;

        let mut md = format!("# {}\n\n", entry.title);
        md.push_str(&html_to_text(html));

        Ok(DocContent {
            error_codes: extract_error_codes(&md),
            api_path: value
                .pointer("/data/apiName")
                .and_then(|v| v.as_str())
                .map(String::from),
            markdown: md,
            metadata: None,
        })
    }
}

pub struct TaobaoFactory;

impl AdapterFactory for TaobaoFactory {
    fn adapter_type(&self) -> &'static str {
        "taobao"
    }

    fn create(&self, _config: Value) -> Result<Arc<dyn SourceAdapter>> {
        Ok(Arc::new(TaobaoAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anti_bot_markers() {
        assert!(is_anti_bot(r#"{"error": "RGV587_ERROR::SM"}"#));
        assert!(is_anti_bot("FAIL_SYS_USER_VALIDATE"));
        assert!(is_anti_bot(r#"{"url": "https://x.cn/punish/verify"}"#));
        assert!(is_anti_bot(r#"{"url": "https://x.cn/?x5sec=abc"}"#));
        assert!(is_anti_bot("something action=captcha here"));
    }

    #[test]
    fn test_non_object_bodies_are_challenges() {
        assert!(is_anti_bot("<html>verify</html>"));
        assert!(is_anti_bot("[1, 2, 3]"));
        assert!(is_anti_bot("plain text"));
    }

    #[test]
    fn test_normal_json_passes() {
        assert!(!is_anti_bot(r#"{"data": {"docList": []}}"#));
        assert!(!is_anti_bot(r#"{"url": "https://open.taobao.com/doc.htm"}"#));
    }
}
