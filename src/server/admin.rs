//! Admin write endpoints / 管理写接口
//!
//! All routes require `Authorization: Bearer <ADMIN_TOKEN>` and answer
//! JSON. Bulk upserts are transactional; a bad row rejects the whole batch.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{DevMode, DocType, UpsertInput};

use super::AppState;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "invalid or missing bearer token"})),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!("Admin operation failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal error"})),
    )
        .into_response()
}

/// Verify the bearer token / 校验令牌
fn check_auth(headers: &HeaderMap, state: &AppState) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", state.admin_token))
        .unwrap_or(false)
}

/// POST /api/admin/upsert
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<UpsertInput>,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }
    match state.store.upsert_document(&input).await {
        Ok((doc_id, action)) => Json(serde_json::json!({
            "doc_id": doc_id,
            "action": action.as_str(),
        }))
        .into_response(),
        Err(e) => bad_request(e.to_string()),
    }
}

/// One document inside a bulk payload / 批量请求中的单篇文档
#[derive(Debug, Deserialize)]
pub struct BulkDocument {
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub api_path: Option<String>,
    #[serde(default)]
    pub dev_mode: Option<DevMode>,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Error codes extracted from this document / 该文档提取到的错误码
    #[serde(default)]
    pub error_codes: Vec<BulkErrorCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkErrorCode {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpsertPayload {
    pub source: String,
    #[serde(default)]
    pub source_name: Option<String>,
    pub documents: Vec<BulkDocument>,
}

/// POST /api/admin/bulk-upsert
pub async fn bulk_upsert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BulkUpsertPayload>,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }
    if payload.documents.is_empty() {
        return bad_request("documents is empty".to_string());
    }

    let inputs: Vec<UpsertInput> = payload
        .documents
        .iter()
        .map(|d| UpsertInput {
            source_id: payload.source.clone(),
            path: d.path.clone(),
            title: d.title.clone(),
            content: d.content.clone(),
            api_path: d.api_path.clone(),
            dev_mode: d.dev_mode,
            doc_type: d.doc_type,
            source_url: d.source_url.clone(),
            metadata: d.metadata.clone(),
            last_updated: d.last_updated,
        })
        .collect();

    let result = match state
        .store
        .bulk_upsert(&payload.source, payload.source_name.as_deref(), &inputs)
        .await
    {
        Ok(r) => r,
        Err(e) => return bad_request(e.to_string()),
    };

    // 错误码随文档一起入库
    let mut codes = Vec::new();
    for doc in &payload.documents {
        let doc_id =
            crate::models::document_id(&payload.source, &crate::utils::clean_doc_path(&doc.path));
        for ec in &doc.error_codes {
            codes.push(crate::models::ErrorCode {
                source_id: payload.source.clone(),
                code: ec.code.clone(),
                message: ec.message.clone(),
                description: ec.description.clone(),
                doc_id: Some(doc_id.clone()),
            });
        }
    }
    if !codes.is_empty() {
        if let Err(e) = state.store.upsert_error_codes(&payload.source, &codes).await {
            return internal_error(e);
        }
    }

    if let Err(e) = state.store.update_source_sync_time(&payload.source).await {
        return internal_error(e);
    }

    Json(serde_json::json!({
        "created": result.created,
        "updated": result.updated,
        "unchanged": result.unchanged,
    }))
    .into_response()
}

/// DELETE /api/admin/doc/{id}
pub async fn delete_doc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }
    match state.store.delete_document(&id).await {
        Ok(deleted) => Json(serde_json::json!({"deleted": deleted})).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/admin/reindex
pub async fn reindex(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }
    match state.store.reindex().await {
        Ok(count) => Json(serde_json::json!({"reindexed": count})).into_response(),
        Err(e) => internal_error(e),
    }
}
