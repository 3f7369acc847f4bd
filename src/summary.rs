//! Document summarizer / 文档摘要生成
//!
//! Pure extraction from stored Markdown into a compact structured preview
//! (~1 KB): metadata comments, title, first real paragraph, API method and
//! path, first parameter table, up to two JSON examples, and a pointer to
//! the full text. Each section is independent; missing input skips the
//! section without aborting.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::truncate_chars;

/// Paragraph truncation / 描述段落截断长度
const DESC_MAX_CHARS: usize = 200;
/// JSON example truncation / JSON示例截断长度
const JSON_MAX_CHARS: usize = 500;
/// Table data row cap / 表格数据行上限
const TABLE_MAX_ROWS: usize = 10;

/// 权限说明段落的关键词 / Permission-statement keywords
const PERMISSION_KEYWORDS: &[&str] = &[
    "权限说明",
    "权限要求",
    "使用条件",
    "调用权限",
    "接口权限",
    "应用权限",
    "通讯录权限",
    "数据权限",
    "permission",
    "scope",
];

static METHOD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\b(GET|POST|PUT|DELETE|PATCH)\s+(/[^\s`\)]+)").expect("method path regex")
});
static CGI_BIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/cgi-bin/[A-Za-z0-9_\-/{}.?=]+").expect("cgi-bin regex"));
static OPEN_APIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/open-apis/[A-Za-z0-9_\-/{}.:]+").expect("open-apis regex"));
static SOURCE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*source_url:\s*(\S+)\s*-->").expect("source url regex"));
static INLINE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]*)\*\*").expect("bold regex"));

/// Build the preview / 生成摘要
pub fn summarize(content: &str, doc_id: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = String::new();

    // 1. head metadata comments / 头部元数据注释
    for line in &lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("<!--") {
            out.push_str(trimmed);
            out.push('\n');
        } else {
            break;
        }
    }

    // 2. first heading as title / 第一个标题
    let mut title_idx = None;
    for (i, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with('#') {
            out.push('\n');
            out.push_str(line.trim());
            out.push('\n');
            title_idx = Some(i);
            break;
        }
    }

    // 3. first descriptive paragraph / 第一个描述段落
    if let Some(desc) = first_paragraph(&lines, title_idx.map(|i| i + 1).unwrap_or(0)) {
        out.push('\n');
        out.push_str(&truncate_chars(&desc, DESC_MAX_CHARS));
        out.push('\n');
    }

    // 4. API info / 接口信息
    if let Some((method, path)) = extract_api(content) {
        out.push('\n');
        if let Some(m) = method {
            out.push_str(&format!("**方法**：{}\n", m));
        }
        out.push_str(&format!("**路径**：{}\n", path));
    }
    if let Some(caps) = SOURCE_URL_RE.captures(content) {
        out.push_str(&format!("**原文**：{}\n", &caps[1]));
    }

    // 5. first table / 第一个表格
    if let Some(table) = extract_table(&lines) {
        out.push('\n');
        out.push_str(&table);
    }

    // 6. JSON examples / JSON示例
    for (label, block) in extract_json_blocks(&lines) {
        out.push('\n');
        if !label.is_empty() {
            out.push_str(&format!("**{}**：\n", label));
        }
        out.push_str("```json\n");
        out.push_str(&truncate_chars(&block, JSON_MAX_CHARS));
        out.push_str("\n```\n");
    }

    // 7. full-text pointer / 全文指引
    out.push('\n');
    out.push_str(&format!("*（完整参数和代码示例请获取全文：/doc/{}）*\n", doc_id));

    out
}

/// Whether a paragraph is a permission statement / 是否为权限说明段落
fn is_permission_paragraph(text: &str) -> bool {
    let lower = text.to_lowercase();
    PERMISSION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// First non-empty, non-heading, non-permission paragraph
/// / 标题后的第一个有效段落
fn first_paragraph(lines: &[&str], start: usize) -> Option<String> {
    let mut i = start;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("<!--")
            || trimmed.starts_with('|')
            || trimmed.starts_with("```")
        {
            i += 1;
            continue;
        }

        // 聚合连续行为一个段落
        let mut paragraph = String::new();
        while i < lines.len() {
            let line = lines[i].trim();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with('|')
                || line.starts_with("```")
            {
                break;
            }
            if !paragraph.is_empty() {
                paragraph.push(' ');
            }
            paragraph.push_str(line);
            i += 1;
        }

        let cleaned = clean_paragraph(&paragraph);
        if is_permission_paragraph(&cleaned) {
            continue;
        }
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }
    None
}

/// Strip blockquote markers, bold and inline links / 清理段落装饰
fn clean_paragraph(text: &str) -> String {
    let text = text.trim_start_matches('>').trim();
    let text = BOLD_RE.replace_all(text, "$1");
    let text = INLINE_LINK_RE.replace_all(&text, "$1");
    text.trim().to_string()
}

/// Extract method and path, trying patterns in order / 提取接口方法与路径
fn extract_api(content: &str) -> Option<(Option<String>, String)> {
    if let Some(caps) = METHOD_PATH_RE.captures(content) {
        return Some((Some(caps[1].to_string()), caps[2].to_string()));
    }
    if let Some(m) = CGI_BIN_RE.find(content) {
        return Some((None, m.as_str().to_string()));
    }
    if let Some(m) = OPEN_APIS_RE.find(content) {
        return Some((None, m.as_str().to_string()));
    }
    None
}

/// First pipe-delimited table, capped at 10 data rows / 第一个表格
fn extract_table(lines: &[&str]) -> Option<String> {
    let mut i = 0;
    while i + 1 < lines.len() {
        let header = lines[i].trim();
        let sep = lines[i + 1].trim();
        if header.starts_with('|')
            && sep.starts_with('|')
            && sep.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
            && sep.contains('-')
        {
            let mut out = String::new();
            out.push_str(header);
            out.push('\n');
            out.push_str(sep);
            out.push('\n');

            let mut rows = 0;
            let mut j = i + 2;
            while j < lines.len() && lines[j].trim().starts_with('|') {
                if rows < TABLE_MAX_ROWS {
                    out.push_str(lines[j].trim());
                    out.push('\n');
                }
                rows += 1;
                j += 1;
            }
            if rows > TABLE_MAX_ROWS {
                let cols = header.matches('|').count().saturating_sub(1).max(1);
                let mut remainder = String::from("|");
                remainder.push_str(&format!(" ...（其余 {} 行省略） ", rows - TABLE_MAX_ROWS));
                for _ in 1..cols {
                    remainder.push_str("| ");
                }
                remainder.push('|');
                out.push_str(&remainder);
                out.push('\n');
            }
            return Some(out);
        }
        i += 1;
    }
    None
}

/// Up to two fenced JSON blocks with their nearest heading labels
/// / 提取至多两个JSON代码块
fn extract_json_blocks(lines: &[&str]) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut last_heading = String::new();
    let mut i = 0;

    while i < lines.len() && blocks.len() < 2 {
        let trimmed = lines[i].trim();
        if let Some(heading) = trimmed.strip_prefix('#') {
            last_heading = heading.trim_start_matches('#').trim().to_string();
        }
        if trimmed == "```json" {
            let mut body = String::new();
            i += 1;
            while i < lines.len() && lines[i].trim() != "```" {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(lines[i]);
                i += 1;
            }
            blocks.push((last_heading.clone(), body));
        }
        i += 1;
    }
    blocks
}
