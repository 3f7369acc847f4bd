//! HTTP server / HTTP服务
//!
//! Markdown-native read API plus a small authenticated admin surface. The
//! router mirrors the rest of the family: CORS open, request tracing on,
//! public routes behind the per-IP limiter.

pub mod admin;
pub mod handlers;
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::search::SearchEngine;
use crate::store::DocStore;

use rate_limit::RateLimiter;

/// Bulk upsert bodies may carry a whole catalog chunk / 批量请求体上限
const BULK_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared handler state / 共享状态
pub struct AppState {
    pub store: DocStore,
    pub engine: SearchEngine,
    pub admin_token: String,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(store: DocStore, admin_token: String) -> Self {
        let engine = SearchEngine::new(store.clone());
        Self {
            store,
            engine,
            admin_token,
            limiter: RateLimiter::new(),
        }
    }
}

/// Per-IP limiter middleware for public routes / 公共路由的限流中间件
async fn rate_limit_layer(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter.check(addr.ip()).await {
        return handlers::markdown(
            StatusCode::TOO_MANY_REQUESTS,
            "## 请求过于频繁\n\n已超过每分钟 60 次的限制，请稍后再试。\n".to_string(),
        );
    }
    next.run(request).await
}

/// Build the full router / 组装路由
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/api/search", get(handlers::search))
        .route("/api/doc/:id", get(handlers::get_doc))
        .route("/api/sources", get(handlers::sources))
        .route("/api/categories", get(handlers::categories))
        .route(
            "/api/categories/:source/:category",
            get(handlers::category_docs),
        )
        .route("/api/recent", get(handlers::recent))
        .route("/api/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/upsert", post(admin::upsert))
        .route("/api/admin/bulk-upsert", post(admin::bulk_upsert))
        .route("/api/admin/doc/:id", delete(admin::delete_doc))
        .route("/api/admin/reindex", post(admin::reindex))
        .layer(DefaultBodyLimit::max(BULK_BODY_LIMIT));

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    public
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::Json;

    async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("t.db")).await.unwrap();
        (Arc::new(AppState::new(store, "secret".into())), dir)
    }

    #[tokio::test]
    async fn test_search_requires_q() {
        let (state, _dir) = test_state().await;
        let response = handlers::search(
            State(state),
            Query(handlers::SearchParams {
                q: None,
                source: None,
                mode: None,
                limit: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_doc_not_found_is_markdown_404() {
        let (state, _dir) = test_state().await;
        let response = handlers::get_doc(
            State(state),
            Path("wecom_000000000000".to_string()),
            Query(handlers::DocParams { summary: None }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/markdown"));
    }

    #[tokio::test]
    async fn test_admin_requires_bearer() {
        let (state, _dir) = test_state().await;
        let input = crate::models::UpsertInput {
            source_id: "wecom".into(),
            path: "a/b".into(),
            title: "标题".into(),
            content: "内容".into(),
            api_path: None,
            dev_mode: None,
            doc_type: None,
            source_url: None,
            metadata: None,
            last_updated: None,
        };
        let response =
            admin::upsert(State(state.clone()), HeaderMap::new(), Json(input.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        let response = admin::upsert(State(state), headers, Json(input)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_totals() {
        let (state, _dir) = test_state().await;
        let response = handlers::health(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

/// Bind and serve until shutdown / 启动服务
pub async fn serve(state: Arc<AppState>, bind_address: &str) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("bind {}", bind_address))?;
    tracing::info!("🌐 服务器监听地址: {}", bind_address);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server exited")?;
    Ok(())
}
