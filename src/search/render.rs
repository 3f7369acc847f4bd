//! Markdown rendering of search results / 搜索结果的 Markdown 渲染

use crate::models::Document;
use crate::search::engine::SearchOutcome;

/// Render a result list as Markdown / 渲染结果列表
pub fn render_results(outcome: &SearchOutcome, source_label: Option<&str>) -> String {
    let label = source_label.or(outcome.source.as_deref()).unwrap_or("全部");
    let mut out = format!(
        "## 搜索结果：{}（来源：{}，共 {} 条，耗时 {}ms）\n\n",
        outcome.query, label, outcome.total, outcome.took_ms
    );

    if outcome.hits.is_empty() {
        out.push_str(&render_empty(outcome));
        return out;
    }

    for (i, hit) in outcome.hits.iter().enumerate() {
        let doc = &hit.doc;
        out.push_str(&format!("### {}. {}（{:.2}分）\n\n", i + 1, doc.title, hit.score));

        let mut source_line = format!("- 来源：{}", doc.source_id);
        if let Some(mode) = doc.dev_mode {
            source_line.push_str(&format!("（{}", mode.label()));
            if !hit.other_modes.is_empty() {
                let others: Vec<&str> = hit.other_modes.iter().map(|m| m.label()).collect();
                source_line.push_str(&format!("，其他模式：{}", others.join("、")));
            }
            source_line.push('）');
        } else if !hit.other_modes.is_empty() {
            let others: Vec<&str> = hit.other_modes.iter().map(|m| m.label()).collect();
            source_line.push_str(&format!("（其他模式：{}）", others.join("、")));
        }
        out.push_str(&source_line);
        out.push('\n');

        if let Some(api_path) = &doc.api_path {
            out.push_str(&format!("- 接口：`{}`\n", api_path));
        }
        if !hit.snippet.is_empty() {
            out.push_str(&format!("- 摘要：{}\n", hit.snippet));
        }
        out.push_str(&format!("- 文档ID：`{}`\n", doc.id));
        if let Some(url) = &doc.source_url {
            out.push_str(&format!("- 原文：{}\n", url));
        }
        if let Some(updated) = doc.last_updated {
            out.push_str(&format!("- 更新时间：{}\n", updated.format("%Y-%m-%d")));
        }
        out.push('\n');
    }

    out
}

/// Zero-result diagnostic / 空结果提示
fn render_empty(outcome: &SearchOutcome) -> String {
    let mut out = String::from("未找到匹配的文档。\n\n建议：\n");
    if outcome.source.is_some() {
        out.push_str("- 去掉 `source` 参数，在全部来源中搜索\n");
    }
    out.push_str("- 缩短查询词，例如只保留核心关键词\n");
    out.push_str("- 查看 `/api/sources` 了解已接入的平台\n");
    out.push_str("- 查看 `/api/categories` 按分类浏览文档\n");
    out
}

/// Render one document in full mode / 全文模式渲染
///
/// Metadata rides in HTML comments at the head so downstream consumers can
/// parse provenance without disturbing the Markdown body.
pub fn render_document_full(doc: &Document) -> String {
    let mut out = String::new();
    out.push_str(&format!("<!-- source: {} -->\n", doc.source_id));
    out.push_str(&format!("<!-- path: {} -->\n", doc.path));
    if let Some(url) = &doc.source_url {
        out.push_str(&format!("<!-- source_url: {} -->\n", url));
    }
    if let Some(updated) = doc.last_updated {
        out.push_str(&format!("<!-- last_updated: {} -->\n", updated.format("%Y-%m-%d")));
    }
    out.push('\n');
    out.push_str(&doc.content);
    out
}

/// 404 body for an unknown document id / 未找到文档的提示
pub fn render_not_found(doc_id: &str) -> String {
    format!(
        "## 文档不存在\n\n没有找到 ID 为 `{}` 的文档。\n\n建议：\n- 通过 `/api/search` 重新搜索\n- 查看 `/api/sources` 确认来源是否已同步\n",
        doc_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DevMode, DocType};
    use crate::search::engine::{SearchHit, SearchOutcome};
    use chrono::Utc;

    fn sample_doc() -> Document {
        Document {
            id: "wecom_1234567890ab".into(),
            source_id: "wecom".into(),
            path: "api/message/send".into(),
            path_depth: 3,
            title: "发送应用消息".into(),
            api_path: Some("POST /cgi-bin/message/send".into()),
            dev_mode: Some(DevMode::Internal),
            doc_type: DocType::ApiReference,
            content: "正文".into(),
            content_hash: String::new(),
            prev_content_hash: None,
            source_url: Some("https://developer.work.weixin.qq.com/document/path/90236".into()),
            metadata: None,
            tokenized_title: String::new(),
            tokenized_content: String::new(),
            last_updated: None,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_results_header_and_block() {
        let outcome = SearchOutcome {
            query: "发送应用消息".into(),
            source: None,
            hits: vec![SearchHit {
                doc: sample_doc(),
                score: 28.5,
                other_modes: vec![DevMode::ThirdParty],
                snippet: "调用该接口...".into(),
            }],
            total: 1,
            took_ms: 12,
        };
        let md = render_results(&outcome, None);
        assert!(md.contains("## 搜索结果：发送应用消息"));
        assert!(md.contains("共 1 条"));
        assert!(md.contains("28.50分"));
        assert!(md.contains("其他模式：第三方应用"));
        assert!(md.contains("`wecom_1234567890ab`"));
    }

    #[test]
    fn test_render_empty_has_suggestions() {
        let outcome = SearchOutcome {
            query: "99999999".into(),
            source: Some("wecom".into()),
            hits: vec![],
            total: 0,
            took_ms: 2,
        };
        let md = render_results(&outcome, None);
        assert!(md.contains("建议"));
        assert!(md.contains("source"));
    }

    #[test]
    fn test_render_full_has_metadata_comments() {
        let md = render_document_full(&sample_doc());
        assert!(md.starts_with("<!-- source: wecom -->"));
        assert!(md.contains("<!-- path: api/message/send -->"));
        assert!(md.contains("<!-- source_url:"));
    }
}
