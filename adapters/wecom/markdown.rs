//! HTML to Markdown pipeline / HTML转Markdown流水线
//!
//! The doc bodies arrive as rendered HTML. Conversion order matters:
//! scripts and styles go first, then fenced code blocks (entities decoded,
//! `<br>` kept as newlines), then inline elements, then a residual cleanup
//! pass for anything the structured steps missed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapters::common::{collapse_blank_lines, decode_entities};

static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(script|style)[^>]*>.*?</(script|style)>").expect("script regex")
});
static PRE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<pre[^>]*><code(?:\s+class="language-([A-Za-z0-9_+-]*)")?[^>]*>(.*?)</code></pre>"#)
        .expect("pre code regex")
});
static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<code[^>]*>(.*?)</code>").expect("inline code regex"));
static IMG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img[^>]*?src="([^"]*)"[^>]*?(?:alt="([^"]*)")?[^>]*>"#).expect("img regex")
});
static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<h([1-6])[^>]*>(.*?)</h[1-6]>").expect("heading regex")
});
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*?href="([^"]*)"[^>]*>(.*?)</a>"#).expect("anchor regex")
});
static RESIDUAL_ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a[^>]*>(.*?)</a>").expect("residual anchor regex"));
static STRONG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:strong|b)>(.*?)</(?:strong|b)>").expect("strong regex"));
static TAG_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s([a-zA-Z-]+)="[^"]*""#).expect("attr regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

/// Convert one rendered doc body / 转换一篇文档正文
pub fn html_to_markdown(html: &str) -> String {
    // 1. 脚本与样式整块剔除
    let text = SCRIPT_STYLE_RE.replace_all(html, "");

    // 2. 代码块转围栏，实体解码，<br>还原为换行
    let text = PRE_CODE_RE.replace_all(&text, |caps: &regex::Captures| {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps[2]
            .replace("<br>", "\n")
            .replace("<br/>", "\n")
            .replace("<br />", "\n");
        let body = decode_entities(&body);
        let body = body
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n```{}\n{}\n```\n", lang, body.trim_matches('\n'))
    });

    // 3. 行内元素
    let text = INLINE_CODE_RE.replace_all(&text, |caps: &regex::Captures| {
        format!("`{}`", decode_entities(&caps[1]))
    });
    let text = HEADING_RE.replace_all(&text, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n{} {}\n", "#".repeat(level), caps[2].trim())
    });
    let text = IMG_RE.replace_all(&text, |caps: &regex::Captures| {
        let alt = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        format!("![{}]({})", alt, &caps[1])
    });
    let text = ANCHOR_RE.replace_all(&text, |caps: &regex::Captures| {
        format!("[{}]({})", caps[2].trim(), &caps[1])
    });
    let text = STRONG_RE.replace_all(&text, "**$1**");

    let text = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<hr>", "\n---\n")
        .replace("<hr/>", "\n---\n")
        .replace("</p>", "\n\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n");

    // 4. 属性收敛到 href/src/alt/title，然后跑一遍兜底的<a>清理
    let text = TAG_ATTR_RE.replace_all(&text, |caps: &regex::Captures| {
        match &caps[1] {
            "href" | "src" | "alt" | "title" => caps[0].to_string(),
            _ => String::new(),
        }
    });
    let text = RESIDUAL_ANCHOR_RE.replace_all(&text, "$1");

    // 5. 余下的标签全部剥掉，实体解码，折叠空行
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    collapse_blank_lines(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_block_with_language() {
        let html = r#"<pre><code class="language-json">{&quot;touser&quot;: &quot;@all&quot;}</code></pre>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("```json"));
        assert!(md.contains(r#"{"touser": "@all"}"#));
    }

    #[test]
    fn test_code_block_preserves_br_newlines() {
        let html = "<pre><code>line1<br>line2</code></pre>";
        let md = html_to_markdown(html);
        assert!(md.contains("line1\nline2"));
    }

    #[test]
    fn test_inline_code_to_backticks() {
        let md = html_to_markdown("<p>参数 <code>access_token</code> 必填</p>");
        assert!(md.contains("`access_token`"));
    }

    #[test]
    fn test_img_to_markdown() {
        let md = html_to_markdown(r#"<img src="https://x.cn/a.png" alt="流程图">"#);
        assert!(md.contains("![流程图](https://x.cn/a.png)"));
    }

    #[test]
    fn test_anchor_and_residual() {
        let md = html_to_markdown(r#"<a href="https://x.cn">文档</a> 与 <a onclick="x()">孤链</a>"#);
        assert!(md.contains("[文档](https://x.cn)"));
        assert!(md.contains("孤链"));
        assert!(!md.contains("<a"));
    }

    #[test]
    fn test_script_and_style_removed() {
        let md = html_to_markdown("<style>.x{}</style><script>alert(1)</script><p>正文</p>");
        assert!(!md.contains("alert"));
        assert!(!md.contains(".x{}"));
        assert!(md.contains("正文"));
    }

    #[test]
    fn test_headings_and_hr() {
        let md = html_to_markdown("<h2>请求</h2><hr><p>说明</p>");
        assert!(md.contains("## 请求"));
        assert!(md.contains("---"));
    }

    #[test]
    fn test_blank_lines_collapsed() {
        let md = html_to_markdown("<p>a</p><p></p><p></p><p></p><p>b</p>");
        assert!(!md.contains("\n\n\n\n"));
    }
}
