//! Search engine / 搜索引擎
//!
//! Turns a query string into a scored, deduplicated, trimmed result list.
//! Three query shapes are routed separately / 三类查询分别路由：
//! - error-code lookups (`60011`, `errcode 60011`) / 错误码查询
//! - API path lookups (`/cgi-bin/message/send`) / 接口路径查询
//! - keyword queries through the FTS index / 关键词全文检索

use anyhow::Result;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DevMode, DocType, Document};
use crate::search::tokenizer::tokenizer;
use crate::store::DocStore;
use crate::utils::{char_window, strip_markdown};

/// Candidate cap before scoring / 打分前的候选上限
const CANDIDATE_CAP: usize = 200;
/// Snippet window width in characters / 摘要窗口字符数
const SNIPPET_WIDTH: usize = 200;

static ERRCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:errcode\s*)?(\d+)$").expect("errcode regex"));

/// Query classification / 查询分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    ErrorCode(String),
    ApiPath(String),
    Keyword,
}

/// Classify a trimmed query / 对查询分类
pub fn classify_query(query: &str) -> QueryKind {
    if let Some(caps) = ERRCODE_RE.captures(query) {
        return QueryKind::ErrorCode(caps[1].to_string());
    }
    if query.starts_with('/') || query.contains("/cgi-bin/") || query.contains("/open-apis/") {
        return QueryKind::ApiPath(query.to_string());
    }
    QueryKind::Keyword
}

/// Search request / 搜索请求
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    pub source: Option<String>,
    pub mode: Option<DevMode>,
    pub limit: usize,
}

/// One scored result / 一条打分后的结果
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub doc: Document,
    pub score: f64,
    /// Other dev modes collapsed into this hit / 合并掉的其他开发模式
    pub other_modes: Vec<DevMode>,
    pub snippet: String,
}

/// Full search outcome / 搜索结果集
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: String,
    pub source: Option<String>,
    pub hits: Vec<SearchHit>,
    /// Pre-truncation candidate count / 截断前的总数
    pub total: usize,
    pub took_ms: i64,
}

pub struct SearchEngine {
    store: DocStore,
}

impl SearchEngine {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Run one search and log it / 执行一次搜索并记录日志
    pub async fn search(&self, opts: &SearchOptions) -> Result<SearchOutcome> {
        let started = std::time::Instant::now();
        let query = opts.query.trim().to_string();
        let limit = opts.limit.clamp(1, 20);

        let candidates = match classify_query(&query) {
            QueryKind::ErrorCode(code) => self.error_code_candidates(&code, opts, limit).await?,
            QueryKind::ApiPath(path) => self.api_path_candidates(&path, opts, limit).await?,
            QueryKind::Keyword => self.keyword_candidates(&query, opts).await?,
        };

        let mut hits = dedup_candidates(candidates, opts.mode.is_some());
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let total = hits.len();
        hits.truncate(limit);

        for hit in &mut hits {
            hit.snippet = make_snippet(&hit.doc.content, &query);
            hit.score = (hit.score * 100.0).round() / 100.0;
        }

        let took_ms = started.elapsed().as_millis() as i64;
        let top_score = hits.first().map(|h| h.score);
        self.store
            .log_search(&query, opts.source.as_deref(), total as i64, top_score, took_ms)
            .await?;

        Ok(SearchOutcome {
            query,
            source: opts.source.clone(),
            hits,
            total,
            took_ms,
        })
    }

    /// Error-code path, everything at fixed score 50 / 错误码查询，固定50分
    async fn error_code_candidates(
        &self,
        code: &str,
        opts: &SearchOptions,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if let Some(entry) = self
            .store
            .find_error_code(code, opts.source.as_deref())
            .await?
        {
            if let Some(doc_id) = &entry.doc_id {
                if let Some(doc) = self.store.get_document(doc_id).await? {
                    return Ok(vec![fixed_hit(doc, 50.0)]);
                }
            }
        }

        let docs = self
            .store
            .find_docs_containing(code, opts.source.as_deref(), opts.mode, limit)
            .await?;
        Ok(docs.into_iter().map(|d| fixed_hit(d, 50.0)).collect())
    }

    /// API path query via LIKE / 接口路径查询
    async fn api_path_candidates(
        &self,
        path: &str,
        opts: &SearchOptions,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let docs = self
            .store
            .find_by_api_path(path, opts.source.as_deref(), opts.mode, limit)
            .await?;
        Ok(docs.into_iter().map(|d| fixed_hit(d, 50.0)).collect())
    }

    /// Keyword query via FTS, LIKE fallback on syntax errors
    /// / 关键词查询，FTS语法错误时回退LIKE
    async fn keyword_candidates(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let tokens = tokenizer().tokenize_query(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let match_expr = tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ");

        let scored = match self
            .store
            .fts_search(&match_expr, opts.source.as_deref(), opts.mode, CANDIDATE_CAP)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!("FTS match rejected ({}), falling back to LIKE", e);
                self.store
                    .like_search(&tokens, opts.source.as_deref(), opts.mode, CANDIDATE_CAP)
                    .await?
            }
        };

        Ok(scored
            .into_iter()
            .map(|(doc, bm25_abs)| {
                let score = composite_score(&doc, query, &tokens, bm25_abs);
                SearchHit {
                    doc,
                    score,
                    other_modes: Vec::new(),
                    snippet: String::new(),
                }
            })
            .collect())
    }
}

fn fixed_hit(doc: Document, score: f64) -> SearchHit {
    SearchHit {
        doc,
        score,
        other_modes: Vec::new(),
        snippet: String::new(),
    }
}

/// Composite relevance score / 复合相关性得分
///
/// ```text
/// score =   20  if title contains the whole query
///         + 5 × (query tokens found in title / query tokens)
///         + |bm25|
///         + 3   if api_reference
///         + 3/1 recency bonus (30/90 days)
///         − 0.5 × path_depth
/// ```
pub fn composite_score(doc: &Document, query: &str, tokens: &[String], bm25_abs: f64) -> f64 {
    let title_lower = doc.title.to_lowercase();
    let query_lower = query.to_lowercase();

    let mut score = 0.0;
    if title_lower.contains(&query_lower) {
        score += 20.0;
    }
    if !tokens.is_empty() {
        let in_title = tokens
            .iter()
            .filter(|t| title_lower.contains(&t.to_lowercase()))
            .count();
        score += 5.0 * in_title as f64 / tokens.len() as f64;
    }
    score += bm25_abs;
    if doc.doc_type == DocType::ApiReference {
        score += 3.0;
    }
    if let Some(updated) = doc.last_updated {
        let age_days = (Utc::now() - updated).num_days();
        if age_days <= 30 {
            score += 3.0;
        } else if age_days <= 90 {
            score += 1.0;
        }
    }
    score -= 0.5 * doc.path_depth as f64;
    score
}

/// Collapse near-duplicate hits across dev modes / 跨开发模式去重
///
/// Without a mode filter the same article often appears once per Wecom dev
/// mode. Group by (title, api_path), keep the best-scoring entry and record
/// the modes that were collapsed into it.
fn dedup_candidates(mut candidates: Vec<SearchHit>, mode_filtered: bool) -> Vec<SearchHit> {
    if mode_filtered {
        return candidates;
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<SearchHit> = Vec::with_capacity(candidates.len());
    let mut index: std::collections::HashMap<(String, Option<String>), usize> =
        std::collections::HashMap::new();

    for hit in candidates {
        let key = (hit.doc.title.clone(), hit.doc.api_path.clone());
        match index.get(&key) {
            Some(&i) => {
                let keeper = &mut kept[i];
                if let Some(mode) = hit.doc.dev_mode {
                    if keeper.doc.dev_mode != Some(mode) && !keeper.other_modes.contains(&mode) {
                        keeper.other_modes.push(mode);
                    }
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(hit);
            }
        }
    }
    kept
}

/// Build a display snippet around the best match / 构建摘要窗口
///
/// Falls back from full query to first token to plain prefix. Windowing is
/// by character count so CJK text is never cut mid-codepoint.
pub fn make_snippet(content: &str, query: &str) -> String {
    let plain = strip_markdown(content);
    if plain.is_empty() {
        return String::new();
    }

    let plain_lower = plain.to_lowercase();
    let query_lower = query.trim().to_lowercase();

    let byte_pos = if !query_lower.is_empty() {
        plain_lower.find(&query_lower).or_else(|| {
            tokenizer()
                .tokenize_query(query)
                .first()
                .and_then(|t| plain_lower.find(&t.to_lowercase()))
        })
    } else {
        None
    };

    let center = byte_pos
        .map(|p| plain_lower[..p].chars().count())
        .unwrap_or(0);
    char_window(&plain, center, SNIPPET_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpsertInput;
    use chrono::Duration;

    #[test]
    fn test_classify_error_code() {
        assert_eq!(classify_query("60011"), QueryKind::ErrorCode("60011".into()));
        assert_eq!(
            classify_query("errcode 60011"),
            QueryKind::ErrorCode("60011".into())
        );
        assert_eq!(
            classify_query("ERRCODE  40014"),
            QueryKind::ErrorCode("40014".into())
        );
    }

    #[test]
    fn test_classify_api_path() {
        assert!(matches!(
            classify_query("/cgi-bin/message/send"),
            QueryKind::ApiPath(_)
        ));
        assert!(matches!(
            classify_query("企业 /open-apis/im/v1/messages 接口"),
            QueryKind::ApiPath(_)
        ));
    }

    #[test]
    fn test_classify_keyword() {
        assert_eq!(classify_query("发送应用消息"), QueryKind::Keyword);
        assert_eq!(classify_query("access_token"), QueryKind::Keyword);
    }

    fn doc(title: &str, doc_type: DocType, depth: i64, age_days: i64) -> Document {
        Document {
            id: "t_000000000000".into(),
            source_id: "wecom".into(),
            path: "a/b".into(),
            path_depth: depth,
            title: title.into(),
            api_path: None,
            dev_mode: None,
            doc_type,
            content: String::new(),
            content_hash: String::new(),
            prev_content_hash: None,
            source_url: None,
            metadata: None,
            tokenized_title: String::new(),
            tokenized_content: String::new(),
            last_updated: Some(Utc::now() - Duration::days(age_days)),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_composite_score_ranking() {
        let query = "发送应用消息";
        let tokens = tokenizer().tokenize_query(query);

        let a = doc("发送应用消息", DocType::ApiReference, 3, 3);
        let b = doc("消息类型与数据格式", DocType::Guide, 5, 200);

        let score_a = composite_score(&a, query, &tokens, 2.0);
        let score_b = composite_score(&b, query, &tokens, 2.0);

        // A 拿到整题命中、接口类型和时效加分
        assert!(score_a > score_b);
        assert!(score_a >= 20.0 + 3.0 + 3.0 - 1.5);
    }

    #[test]
    fn test_dedup_collects_other_modes() {
        let mut a = doc("获取access_token", DocType::ApiReference, 2, 5);
        a.dev_mode = Some(DevMode::Internal);
        a.api_path = Some("/cgi-bin/gettoken".into());
        let mut b = a.clone();
        b.dev_mode = Some(DevMode::ThirdParty);
        let mut c = a.clone();
        c.dev_mode = Some(DevMode::ServiceProvider);

        let hits = vec![fixed_hit(a, 10.0), fixed_hit(b, 9.0), fixed_hit(c, 8.0)];
        let deduped = dedup_candidates(hits, false);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].doc.dev_mode, Some(DevMode::Internal));
        assert_eq!(deduped[0].other_modes.len(), 2);
    }

    #[test]
    fn test_dedup_skipped_with_mode_filter() {
        let mut a = doc("获取access_token", DocType::ApiReference, 2, 5);
        a.dev_mode = Some(DevMode::Internal);
        let mut b = a.clone();
        b.dev_mode = Some(DevMode::ThirdParty);
        let deduped = dedup_candidates(vec![fixed_hit(a, 10.0), fixed_hit(b, 9.0)], true);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_snippet_centers_on_match() {
        let content = format!("{}发送应用消息的说明{}", "前".repeat(300), "后".repeat(300));
        let snippet = make_snippet(&content, "发送应用消息");
        assert!(snippet.contains("发送应用消息"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_snippet_falls_back_to_prefix() {
        let snippet = make_snippet("短内容而已", "毫不相关的词");
        assert_eq!(snippet, "短内容而已");
    }

    async fn seeded_engine() -> (SearchEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("t.db")).await.unwrap();
        let engine = SearchEngine::new(store.clone());

        let mk = |path: &str, title: &str, content: &str| UpsertInput {
            source_id: "wecom".into(),
            path: path.into(),
            title: title.into(),
            content: content.into(),
            api_path: Some("/cgi-bin/message/send".into()),
            dev_mode: None,
            doc_type: None,
            source_url: None,
            metadata: None,
            last_updated: Some(Utc::now() - Duration::days(3)),
        };
        store
            .bulk_upsert(
                "wecom",
                None,
                &[
                    mk("api/send", "发送应用消息", "调用该接口发送应用消息，支持文本卡片"),
                    mk("guide/types", "消息类型说明", "介绍各种发送格式"),
                ],
            )
            .await
            .unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn test_end_to_end_keyword_search() {
        let (engine, _dir) = seeded_engine().await;
        let outcome = engine
            .search(&SearchOptions {
                query: "发送应用消息".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert!(!outcome.hits.is_empty());
        assert_eq!(outcome.hits[0].doc.title, "发送应用消息");
    }

    #[tokio::test]
    async fn test_api_path_routing() {
        let (engine, _dir) = seeded_engine().await;
        let outcome = engine
            .search(&SearchOptions {
                query: "/cgi-bin/message/send".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 2);
        assert!(outcome.hits.iter().all(|h| h.score == 50.0));

        // 前缀也能命中
        let outcome = engine
            .search(&SearchOptions {
                query: "/cgi-bin/message".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 2);
    }

    #[tokio::test]
    async fn test_error_code_lookup_prefers_linked_doc() {
        let (engine, dir) = seeded_engine().await;
        let store = DocStore::open(&dir.path().join("t.db")).await.unwrap();

        let linked_id = crate::models::document_id("wecom", "api/send");
        store
            .upsert_error_codes(
                "wecom",
                &[crate::models::ErrorCode {
                    source_id: "wecom".into(),
                    code: "60011".into(),
                    message: "no privilege to access/modify contact/party/agent".into(),
                    description: None,
                    doc_id: Some(linked_id.clone()),
                }],
            )
            .await
            .unwrap();

        for query in ["60011", "errcode 60011"] {
            let outcome = engine
                .search(&SearchOptions {
                    query: query.into(),
                    source: None,
                    mode: None,
                    limit: 5,
                })
                .await
                .unwrap();
            assert_eq!(outcome.hits.len(), 1, "query {:?}", query);
            assert_eq!(outcome.hits[0].doc.id, linked_id);
            assert_eq!(outcome.hits[0].score, 50.0);
        }

        // 不存在的错误码：空结果，渲染里带建议
        let outcome = engine
            .search(&SearchOptions {
                query: "99999999".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(outcome.total, 0);
        let md = crate::search::render::render_results(&outcome, None);
        assert!(md.contains("建议"));
    }

    #[tokio::test]
    async fn test_dedup_across_dev_modes_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("d.db")).await.unwrap();
        let engine = SearchEngine::new(store.clone());

        let mk = |path: &str, mode: DevMode| UpsertInput {
            source_id: "wecom".into(),
            path: path.into(),
            title: "获取access_token".into(),
            content: "调用接口前需要获取access_token凭证".into(),
            api_path: Some("GET /cgi-bin/gettoken".into()),
            dev_mode: Some(mode),
            doc_type: None,
            source_url: None,
            metadata: None,
            last_updated: None,
        };
        store
            .bulk_upsert(
                "wecom",
                None,
                &[
                    mk("internal/token", DevMode::Internal),
                    mk("third/token", DevMode::ThirdParty),
                    mk("sp/token", DevMode::ServiceProvider),
                ],
            )
            .await
            .unwrap();

        // 不带mode过滤：三种模式合并为一条
        let outcome = engine
            .search(&SearchOptions {
                query: "获取access_token".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].other_modes.len(), 2);

        // 带mode过滤：只命中对应模式，且不做合并
        let outcome = engine
            .search(&SearchOptions {
                query: "获取access_token".into(),
                source: None,
                mode: Some(DevMode::ThirdParty),
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].doc.dev_mode, Some(DevMode::ThirdParty));
        assert!(outcome.hits[0].other_modes.is_empty());
    }

    #[tokio::test]
    async fn test_stop_word_only_query_returns_empty() {
        let (engine, _dir) = seeded_engine().await;
        let outcome = engine
            .search(&SearchOptions {
                query: "的了".into(),
                source: None,
                mode: None,
                limit: 5,
            })
            .await
            .unwrap();
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.total, 0);
    }
}
