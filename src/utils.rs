/// Shared helper functions / 通用工具函数

/// Clean and normalize a document path / 清理和规范化文档路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Strip leading and trailing slashes / 去掉首尾斜杠
/// 3. Collapse duplicate slashes / 合并重复的 /
pub fn clean_doc_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    parts.join("/")
}

/// Clamp a user-supplied limit into a range / 将用户传入的 limit 收敛到区间
pub fn clamp_limit(limit: Option<usize>, default: usize, min: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(min, max)
}

/// ASCII-normalize a title into a slug / 将标题转为 slug
/// Keeps ASCII alphanumerics, maps spaces and separators to '-'; drops
/// punctuation and non-ASCII characters.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if (c == ' ' || c == '-' || c == '_' || c == '/') && !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Strip Markdown decoration for snippet display / 去除 Markdown 装饰符
/// Removes heading/emphasis/code/table markers and link syntax, then
/// collapses all whitespace runs to single spaces.
pub fn strip_markdown(content: &str) -> String {
    let mut text = String::with_capacity(content.len());
    let mut in_fence = false;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            text.push_str(line);
            text.push(' ');
            continue;
        }
        // 跳过表格分隔行
        if trimmed.starts_with("|---") || trimmed.starts_with("| ---") {
            continue;
        }
        for c in line.chars() {
            match c {
                '#' | '*' | '`' | '>' | '|' => text.push(' '),
                '[' | ']' => {}
                _ => text.push(c),
            }
        }
        text.push(' ');
    }
    // 折叠空白
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-count based window with ellipses / 按字符数截取窗口
/// Indexing is by `char` so multi-byte sequences are never split.
pub fn char_window(text: &str, center: usize, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return text.to_string();
    }
    let half = width / 2;
    let start = center.saturating_sub(half).min(chars.len().saturating_sub(width));
    let end = (start + width).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

/// Truncate a string to at most `max` characters / 按字符截断
pub fn truncate_chars(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        text.to_string()
    } else {
        let mut out: String = chars[..max].iter().collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_doc_path() {
        assert_eq!(clean_doc_path("/a/b/c/"), "a/b/c");
        assert_eq!(clean_doc_path("a//b"), "a/b");
        assert_eq!(clean_doc_path("a\\b"), "a/b");
        assert_eq!(clean_doc_path(""), "");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 5, 1, 20), 5);
        assert_eq!(clamp_limit(Some(0), 5, 1, 20), 1);
        assert_eq!(clamp_limit(Some(999), 5, 1, 20), 20);
        assert_eq!(clamp_limit(Some(7), 5, 1, 20), 7);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Get Access Token"), "get-access-token");
        assert_eq!(slugify("发送应用消息"), "");
        assert_eq!(slugify("OAuth 2.0 (v2)"), "oauth-20-v2");
    }

    #[test]
    fn test_strip_markdown() {
        let md = "# 标题\n\n**加粗** 和 `代码`\n\n|---|---|\n";
        let text = strip_markdown(md);
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
        assert!(text.contains("标题"));
    }

    #[test]
    fn test_char_window_cjk() {
        let text = "发送应用消息接口可以推送文本卡片等多种类型";
        let win = char_window(text, 5, 8);
        // 窗口按字符计数，不会切断多字节序列
        assert!(win.chars().count() <= 8 + 6);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }
}
