//! Chinese tokenizer - uses jieba-rs for Chinese word segmentation / 中文分词器
//!
//! Supports / 支持：
//! - Chinese word segmentation (jieba + user dictionary) / 中文分词
//! - Pattern protection for URLs, API paths, identifiers and digit runs
//!   / URL、接口路径、标识符、数字串原样保留
//! - Stop-word and punctuation filtering / 停用词与标点过滤
//!
//! The same instance is used at index time and at query time; tokens only
//! line up in the FTS index if both sides run through the same dictionary.

use std::collections::HashSet;
use std::io::BufReader;
use std::path::Path;

use jieba_rs::Jieba;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

/// Global tokenizer instance / 全局分词器实例
static TOKENIZER: OnceCell<Tokenizer> = OnceCell::new();

/// Protection pattern, tried in priority order / 保护模式，按优先级匹配
/// 1. absolute URLs / 绝对URL
/// 2. slash-delimited paths / 斜杠路径
/// 3. identifiers optionally containing `:` or `.` / 标识符
/// 4. digit runs / 数字串
static PROTECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        https?://[^\s\u{4e00}-\u{9fff}]+
      | /[A-Za-z0-9][A-Za-z0-9_\-./{}]*
      | [A-Za-z_][A-Za-z0-9_]*(?:[:.][A-Za-z0-9_]+)+
      | [A-Za-z][A-Za-z0-9_]*
      | \d+
    ",
    )
    .expect("protect regex")
});

/// 停用词表 / Stop words
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "的", "了", "是", "在", "有", "和", "与", "或", "等", "把", "被", "对", "不", "也", "都",
        "而", "及", "到", "从", "以",
    ]
    .into_iter()
    .collect()
});

/// Platform terms always present even without a dictionary file
/// / 内置平台词汇，词典文件缺失时仍然生效
const BUILTIN_WORDS: &[&str] = &[
    "自建应用",
    "客户联系",
    "多维表格",
    "消息卡片",
    "服务商代开发",
    "小程序",
    "企业微信",
    "飞书",
    "错误码",
];

/// Chinese-aware tokenizer / 中文分词器
pub struct Tokenizer {
    jieba: Jieba,
}

impl Tokenizer {
    /// Build a tokenizer, loading the user dictionary when present
    /// / 构建分词器，存在用户词典时一并加载
    pub fn new(userdict: Option<&Path>) -> Self {
        let mut jieba = Jieba::new();
        for word in BUILTIN_WORDS {
            jieba.add_word(word, None, None);
        }
        if let Some(path) = userdict {
            match std::fs::File::open(path) {
                Ok(file) => {
                    let mut reader = BufReader::new(file);
                    if let Err(e) = jieba.load_dict(&mut reader) {
                        tracing::warn!("User dictionary load failed: {}: {}", path.display(), e);
                    } else {
                        tracing::info!("User dictionary loaded: {}", path.display());
                    }
                }
                Err(e) => {
                    tracing::warn!("User dictionary not readable: {}: {}", path.display(), e);
                }
            }
        }
        Self { jieba }
    }

    /// Write-mode tokenization (standard cut) / 写入侧分词（标准切分）
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_inner(text, false)
    }

    /// Query-mode tokenization (search cut + ordered dedup)
    /// / 查询侧分词（搜索引擎切分 + 保序去重）
    pub fn tokenize_query(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenize_inner(text, true);
        let mut seen = HashSet::new();
        tokens
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    fn tokenize_inner(&self, text: &str, search_mode: bool) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut cursor = 0;

        for m in PROTECT_RE.find_iter(text) {
            if m.start() > cursor {
                self.segment_into(&text[cursor..m.start()], search_mode, &mut tokens);
            }
            // 保护片段原样输出
            tokens.push(m.as_str().to_string());
            cursor = m.end();
        }
        if cursor < text.len() {
            self.segment_into(&text[cursor..], search_mode, &mut tokens);
        }

        tokens
    }

    /// Run the Chinese segmenter over plain text between protected spans
    /// / 对保护片段之间的文本跑中文分词
    fn segment_into(&self, text: &str, search_mode: bool, out: &mut Vec<String>) {
        let words = if search_mode {
            self.jieba.cut_for_search(text, true)
        } else {
            self.jieba.cut(text, true)
        };
        for word in words {
            let word = word.trim();
            if word.is_empty() {
                continue;
            }
            if STOP_WORDS.contains(word) {
                continue;
            }
            // 纯标点直接丢弃
            if word.chars().all(|c| !c.is_alphanumeric()) {
                continue;
            }
            out.push(word.to_lowercase());
        }
    }
}

/// Initialize the global tokenizer with an explicit dictionary path
/// / 用指定词典路径初始化全局分词器
///
/// Safe to call once; later calls are ignored when already initialized.
pub fn init_tokenizer(userdict: Option<&Path>) {
    let _ = TOKENIZER.set(Tokenizer::new(userdict));
}

/// Get the global tokenizer, lazily initializing from config
/// / 获取全局分词器，首次使用时按配置惰性初始化
pub fn tokenizer() -> &'static Tokenizer {
    TOKENIZER.get_or_init(|| {
        let cfg = crate::config::config();
        Tokenizer::new(Some(&cfg.userdict_path))
    })
}

/// Tokenize for indexing and join with spaces / 索引侧分词并以空格连接
pub fn tokenize_joined(text: &str) -> String {
    tokenizer().tokenize(text).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Tokenizer {
        Tokenizer::new(None)
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = t().tokenize("发送应用消息");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().any(|w| w.contains("消息")));
    }

    #[test]
    fn test_protects_api_path() {
        let tokens = t().tokenize("调用 /cgi-bin/message/send 接口");
        assert!(tokens.contains(&"/cgi-bin/message/send".to_string()));
    }

    #[test]
    fn test_protects_url() {
        let tokens = t().tokenize("文档见 https://open.feishu.cn/document/home");
        assert!(tokens
            .iter()
            .any(|w| w.starts_with("https://open.feishu.cn")));
    }

    #[test]
    fn test_protects_scoped_identifier() {
        let tokens = t().tokenize("需要 contact:user.base:readonly 权限");
        assert!(tokens.contains(&"contact:user.base:readonly".to_string()));
    }

    #[test]
    fn test_protects_snake_case() {
        let tokens = t().tokenize("获取access_token的方法");
        assert!(tokens.contains(&"access_token".to_string()));
        // 停用词「的」被过滤
        assert!(!tokens.contains(&"的".to_string()));
    }

    #[test]
    fn test_protects_digit_run() {
        let tokens = t().tokenize("错误码60011表示无权限");
        assert!(tokens.contains(&"60011".to_string()));
    }

    #[test]
    fn test_stop_words_and_punct_dropped() {
        let tokens = t().tokenize("的了是，。！");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let tok = t();
        let input = "企业微信发送应用消息 /cgi-bin/message/send errcode 60011";
        assert_eq!(tok.tokenize(input), tok.tokenize(input));
    }

    #[test]
    fn test_query_mode_dedups_in_order() {
        let tokens = t().tokenize_query("消息消息 access_token access_token");
        let unique: HashSet<_> = tokens.iter().collect();
        assert_eq!(unique.len(), tokens.len());
    }

    #[test]
    fn test_builtin_dictionary_terms() {
        let tokens = t().tokenize("自建应用如何获取多维表格");
        assert!(tokens.contains(&"自建应用".to_string()));
        assert!(tokens.contains(&"多维表格".to_string()));
    }
}
