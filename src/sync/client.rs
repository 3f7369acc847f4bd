//! Admin API client / 管理接口客户端
//!
//! The ingest side writes documents through the server's bulk endpoint so
//! tokenization happens in one place, with one dictionary.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{DevMode, DocType};

/// Bulk client timeout / 批量接口超时
const TIMEOUT_SECS: u64 = 60;

/// One document ready for upload / 待上传的文档
#[derive(Debug, Clone, Serialize)]
pub struct PendingDocument {
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<DevMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_codes: Vec<PendingErrorCode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingErrorCode {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
}

/// HTTP client for the admin surface / 管理接口HTTP封装
#[derive(Clone)]
pub struct AdminClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl AdminClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// POST one batch / 提交一个批次
    pub async fn bulk_upsert(
        &self,
        source: &str,
        source_name: Option<&str>,
        documents: &[PendingDocument],
    ) -> Result<BulkResponse> {
        let url = format!("{}/api/admin/bulk-upsert", self.base_url);
        let payload = serde_json::json!({
            "source": source,
            "source_name": source_name,
            "documents": documents,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("bulk upsert to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("bulk upsert failed: HTTP {} ({})", status, body));
        }
        Ok(response.json().await.context("bulk upsert response")?)
    }
}
