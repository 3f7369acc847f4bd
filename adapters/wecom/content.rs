//! Content fetching / 正文拉取
//!
//! Two requests per document: a GET of the doc page (primes cookies and
//! yields HTML for date extraction), then a POST to `docFetch/fetchCnt`.
//! Captcha challenges and 429s get their own retry ladders. Request pacing
//! adapts to how many requests this run has already made.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::adapters::common::http_client;

pub const BASE_URL: &str = "https://developer.work.weixin.qq.com";

/// Captcha marker inside the JSON envelope / 验证码错误码
const CAPTCHA_ERR_CODE: i64 = 500003;
const CAPTCHA_MAX_RETRIES: u32 = 3;
const RATE_LIMIT_MAX_RETRIES: u32 = 5;

static LAST_UPDATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"最后更新：(\d{4}-\d{2}-\d{2})").expect("last updated regex"));

/// HTTP client with per-run adaptive pacing / 带自适应节奏的HTTP客户端
pub struct WecomClient {
    client: reqwest::Client,
    cookie_header: tokio::sync::Mutex<Option<String>>,
    /// Requests made this run, drives the delay stepper / 本次运行的请求数
    request_count: AtomicU64,
}

impl WecomClient {
    pub fn new(cookie_header: Option<String>) -> Self {
        Self {
            client: http_client(30),
            cookie_header: tokio::sync::Mutex::new(cookie_header),
            request_count: AtomicU64::new(0),
        }
    }

    pub async fn set_cookie_header(&self, header: String) {
        *self.cookie_header.lock().await = Some(header);
    }

    /// Adaptive delay stepper / 自适应延迟
    ///
    /// First 100 requests wait 1200 ms, up to 200 wait 1800 ms, beyond
    /// that 2500 ms. The counter resets with the client, once per run.
    pub async fn pace(&self) {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        let delay_ms = if n <= 100 {
            1200
        } else if n <= 200 {
            1800
        } else {
            2500
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    async fn get_with_cookies(&self, url: &str) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(header) = self.cookie_header.lock().await.as_ref() {
            request = request.header("Cookie", header.clone());
        }
        Ok(request.send().await?)
    }

    /// Cookie-bearing JSON POST / 带Cookie的JSON请求
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let mut request = self.client.post(url).json(body);
        if let Some(header) = self.cookie_header.lock().await.as_ref() {
            request = request.header("Cookie", header.clone());
        }
        let response = request.send().await?;
        Ok(response.json().await?)
    }

    /// Health check with a known doc id / 用已知文档ID做健康检查
    pub async fn health_check(&self, known_doc_id: &str) -> Result<()> {
        let url = format!("{}/document/path/{}", BASE_URL, known_doc_id);
        let response = self.get_with_cookies(&url).await.context("health check request")?;
        if !response.status().is_success() {
            return Err(anyhow!("health check returned HTTP {}", response.status()));
        }
        let body = response.text().await?;
        if body.contains("showDeveloperCaptcha") || body.contains("请登录") {
            return Err(anyhow!("health check hit a login/captcha wall"));
        }
        Ok(())
    }

    /// GET the doc page / 拉取文档页面HTML
    pub async fn fetch_doc_page(&self, doc_id: &str) -> Result<String> {
        self.pace().await;
        let url = format!("{}/document/path/{}", BASE_URL, doc_id);
        let response = self.get_with_cookies(&url).await?;
        Ok(response.text().await?)
    }

    /// POST fetchCnt with retry ladders / 拉取正文，带重试
    pub async fn fetch_cnt(&self, doc_id: &str) -> Result<Value> {
        let url = format!("{}/docFetch/fetchCnt", BASE_URL);
        let mut captcha_attempts = 0u32;
        let mut rate_limit_attempts = 0u32;

        loop {
            self.pace().await;
            let mut request = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "doc_id": doc_id }));
            if let Some(header) = self.cookie_header.lock().await.as_ref() {
                request = request.header("Cookie", header.clone());
            }
            let response = request.send().await?;

            // 429有独立的重试阶梯
            if response.status().as_u16() == 429 {
                rate_limit_attempts += 1;
                if rate_limit_attempts > RATE_LIMIT_MAX_RETRIES {
                    return Err(anyhow!("doc {} kept returning 429", doc_id));
                }
                let wait = Duration::from_millis(1500 * rate_limit_attempts as u64);
                tracing::warn!("429 on doc {}, backing off {:?}", doc_id, wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await?;
            if body.contains("showDeveloperCaptcha") {
                captcha_attempts += 1;
                if captcha_attempts > CAPTCHA_MAX_RETRIES {
                    return Err(anyhow!("doc {} blocked by captcha", doc_id));
                }
                let wait = Duration::from_millis(3000 * captcha_attempts as u64);
                tracing::warn!("Captcha marker on doc {}, backing off {:?}", doc_id, wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            let value: Value = serde_json::from_str(&body)
                .with_context(|| format!("doc {} returned non-JSON body", doc_id))?;

            let err_code = value
                .pointer("/result/errCode")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            if err_code == CAPTCHA_ERR_CODE {
                captcha_attempts += 1;
                if captcha_attempts > CAPTCHA_MAX_RETRIES {
                    return Err(anyhow!("doc {} blocked by captcha (errCode {})", doc_id, err_code));
                }
                let wait = Duration::from_millis(3000 * captcha_attempts as u64);
                tracing::warn!("Captcha errCode on doc {}, backing off {:?}", doc_id, wait);
                tokio::time::sleep(wait).await;
                continue;
            }
            if err_code != 0 {
                return Err(anyhow!("doc {} fetch failed with errCode {}", doc_id, err_code));
            }

            return Ok(value);
        }
    }
}

/// Pick the freshest revision date / 取最新的修订日期
///
/// Priority: the `time` field, then `最后更新：YYYY-MM-DD` in the page
/// HTML, then the `extra.*` timestamp fields. Of all parseable candidates
/// the most recent wins.
pub fn extract_last_updated(page_html: &str, payload: &Value) -> Option<DateTime<Utc>> {
    let mut candidates: Vec<DateTime<Utc>> = Vec::new();

    if let Some(ts) = payload.pointer("/result/data/doc/time").and_then(|v| v.as_i64()) {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            candidates.push(dt);
        }
    }

    if let Some(caps) = LAST_UPDATED_RE.captures(page_html) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                candidates.push(dt.and_utc());
            }
        }
    }

    for field in ["update_time", "last_update_time", "last_update_time_str"] {
        let pointer = format!("/result/data/doc/extra/{}", field);
        match payload.pointer(&pointer) {
            Some(Value::Number(n)) => {
                if let Some(dt) = n.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
                    candidates.push(dt);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                        candidates.push(dt.and_utc());
                    }
                }
            }
            _ => {}
        }
    }

    candidates.into_iter().max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_prefers_most_recent() {
        let payload = json!({
            "result": { "data": { "doc": {
                "time": 1700000000,
                "extra": { "update_time": 1750000000 }
            }}}
        });
        let html = "<span>最后更新：2023-01-01</span>";
        let picked = extract_last_updated(html, &payload).unwrap();
        assert_eq!(picked, DateTime::from_timestamp(1750000000, 0).unwrap());
    }

    #[test]
    fn test_date_from_html_only() {
        let picked = extract_last_updated("最后更新：2024-06-01", &json!({})).unwrap();
        assert_eq!(picked.format("%Y-%m-%d").to_string(), "2024-06-01");
    }

    #[test]
    fn test_date_missing_everywhere() {
        assert!(extract_last_updated("没有日期", &json!({})).is_none());
    }

    #[test]
    fn test_date_from_string_extra() {
        let payload = json!({
            "result": { "data": { "doc": { "extra": { "last_update_time_str": "2024-03-15" } } } }
        });
        let picked = extract_last_updated("", &payload).unwrap();
        assert_eq!(picked.format("%Y-%m-%d").to_string(), "2024-03-15");
    }
}
