//! Public read endpoints / 公共只读接口
//!
//! Everything here answers Markdown; the assistant on the other side pastes
//! it straight into its context. Errors are Markdown too.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::models::DevMode;
use crate::search::engine::SearchOptions;
use crate::search::render;
use crate::summary::summarize;
use crate::utils::clamp_limit;

use super::AppState;

/// Markdown response helper / Markdown响应
pub fn markdown(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        body,
    )
        .into_response()
}

fn parse_mode(mode: &Option<String>) -> Option<DevMode> {
    mode.as_deref().and_then(DevMode::parse)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub source: Option<String>,
    pub mode: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return markdown(
            StatusCode::BAD_REQUEST,
            "## 参数错误\n\n缺少必填参数 `q`。\n".to_string(),
        );
    };

    let opts = SearchOptions {
        query: q,
        source: params.source,
        mode: parse_mode(&params.mode),
        limit: clamp_limit(params.limit, 5, 1, 20),
    };

    match state.engine.search(&opts).await {
        Ok(outcome) => markdown(StatusCode::OK, render::render_results(&outcome, None)),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n搜索执行失败，请稍后重试。\n".to_string(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DocParams {
    pub summary: Option<bool>,
}

/// GET /api/doc/{id}
pub async fn get_doc(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DocParams>,
) -> Response {
    match state.store.get_document(&id).await {
        Ok(Some(doc)) => {
            let body = if params.summary.unwrap_or(false) {
                summarize(&doc.content, &doc.id)
            } else {
                render::render_document_full(&doc)
            };
            markdown(StatusCode::OK, body)
        }
        Ok(None) => markdown(StatusCode::NOT_FOUND, render::render_not_found(&id)),
        Err(e) => {
            tracing::error!("Document fetch failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n读取文档失败。\n".to_string(),
            )
        }
    }
}

/// GET /api/sources
pub async fn sources(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_sources().await {
        Ok(sources) => {
            let mut out = String::from("## 已接入平台\n\n| 名称 | ID | 文档数 | 最近同步 |\n|---|---|---|---|\n");
            for s in &sources {
                let synced = s
                    .last_synced
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "未同步".to_string());
                out.push_str(&format!(
                    "| {} | `{}` | {} | {} |\n",
                    s.name, s.id, s.doc_count, synced
                ));
            }
            if sources.is_empty() {
                out.push_str("\n暂无已接入平台，请先运行同步工具。\n");
            }
            markdown(StatusCode::OK, out)
        }
        Err(e) => {
            tracing::error!("Sources fetch failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n读取来源列表失败。\n".to_string(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoriesParams {
    pub source: Option<String>,
}

/// GET /api/categories
pub async fn categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CategoriesParams>,
) -> Response {
    match state.store.list_categories(params.source.as_deref()).await {
        Ok(entries) => {
            let mut out = String::from("## 文档分类\n");
            let mut current_source = String::new();
            for e in &entries {
                if e.source_id != current_source {
                    out.push_str(&format!("\n### {}\n\n", e.source_id));
                    current_source = e.source_id.clone();
                }
                out.push_str(&format!("- {}（{} 篇）\n", e.category, e.doc_count));
            }
            if entries.is_empty() {
                out.push_str("\n暂无文档。\n");
            }
            markdown(StatusCode::OK, out)
        }
        Err(e) => {
            tracing::error!("Categories fetch failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n读取分类失败。\n".to_string(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryDocsParams {
    pub mode: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/categories/{source}/{category}
pub async fn category_docs(
    State(state): State<Arc<AppState>>,
    Path((source, category)): Path<(String, String)>,
    Query(params): Query<CategoryDocsParams>,
) -> Response {
    let limit = clamp_limit(params.limit, 50, 1, 100);
    match state
        .store
        .get_documents_by_category(&source, &category, parse_mode(&params.mode), limit)
        .await
    {
        Ok(docs) => {
            let mut out = format!("## {} / {}（{} 篇）\n\n", source, category, docs.len());
            for doc in &docs {
                out.push_str(&format!("- **{}** `{}`", doc.title, doc.id));
                if let Some(api_path) = &doc.api_path {
                    out.push_str(&format!(" · `{}`", api_path));
                }
                out.push('\n');
            }
            if docs.is_empty() {
                out.push_str("该分类下暂无文档。\n");
            }
            markdown(StatusCode::OK, out)
        }
        Err(e) => {
            tracing::error!("Category listing failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n读取分类文档失败。\n".to_string(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub source: Option<String>,
    pub days: Option<i64>,
    pub limit: Option<usize>,
}

/// GET /api/recent
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Response {
    let days = params.days.unwrap_or(7).clamp(1, 90);
    let limit = clamp_limit(params.limit, 20, 1, 100);
    match state
        .store
        .get_recent_documents(params.source.as_deref(), days, limit)
        .await
    {
        Ok(docs) => {
            let mut out = format!("## 最近 {} 天更新（{} 篇）\n\n", days, docs.len());
            for doc in &docs {
                out.push_str(&format!(
                    "- {} **{}** `{}`（{}）\n",
                    doc.synced_at.format("%m-%d"),
                    doc.title,
                    doc.id,
                    doc.source_id
                ));
            }
            if docs.is_empty() {
                out.push_str("近期没有文档更新。\n");
            }
            markdown(StatusCode::OK, out)
        }
        Err(e) => {
            tracing::error!("Recent listing failed: {}", e);
            markdown(
                StatusCode::INTERNAL_SERVER_ERROR,
                "## 服务错误\n\n读取最近更新失败。\n".to_string(),
            )
        }
    }
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let sources = match state.store.get_sources().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"status": "error"})),
            )
                .into_response();
        }
    };
    let total_docs: i64 = sources.iter().map(|s| s.doc_count).sum();
    let body = serde_json::json!({
        "status": "ok",
        "sources": sources.iter().map(|s| serde_json::json!({
            "id": s.id,
            "name": s.name,
            "doc_count": s.doc_count,
            "last_synced": s.last_synced.map(|t| t.to_rfc3339()),
        })).collect::<Vec<_>>(),
        "total_docs": total_docs,
    });
    axum::Json(body).into_response()
}
