//! Shared adapter concerns / 适配器通用逻辑
//!
//! Request pacing, error-code table extraction, per-platform api-path
//! regexes and the default quality gate live here so every adapter behaves
//! the same way for the same problem.

use std::time::Duration;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use super::QualityGate;
use crate::models::DocType;

/// Deduplicated error-code triple / 去重后的错误码
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExtractedErrorCode {
    pub code: String,
    pub message: String,
    pub description: String,
}

/// `| code | message | description |` rows, 3-6 digit codes
/// 该模式会把叙述表格中的HTTP状态码等数字单元格一并收进来，
/// 属于已知误报，入库时不做语义校验。
static ERROR_CODE_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*(-?\d{3,6})\s*\|\s*([^|]*)\|\s*([^|]*)\|").expect("error code regex")
});

/// Scan normalized Markdown for error-code table rows / 扫描错误码表格
pub fn extract_error_codes(markdown: &str) -> Vec<ExtractedErrorCode> {
    let mut seen = std::collections::HashSet::new();
    let mut codes = Vec::new();
    for caps in ERROR_CODE_ROW_RE.captures_iter(markdown) {
        let code = caps[1].trim().to_string();
        if !seen.insert(code.clone()) {
            continue;
        }
        codes.push(ExtractedErrorCode {
            code,
            message: caps[2].trim().to_string(),
            description: caps[3].trim().to_string(),
        });
    }
    codes
}

static WECOM_API_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(GET|POST)\s+)?(/cgi-bin/[A-Za-z0-9_\-/{}.?=&]+)").expect("wecom api regex")
});
static FEISHU_API_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(GET|POST|PUT|DELETE|PATCH)\s+)?(/open-apis/[A-Za-z0-9_\-/{}.:]+)")
        .expect("feishu api regex")
});
static DINGTALK_API_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:(GET|POST|PUT|DELETE)\s+)?((?:/v\d+\.\d+/[A-Za-z0-9_\-/{}.]+)|(?:https://oapi\.dingtalk\.com/[A-Za-z0-9_\-/{}.]+))",
    )
    .expect("dingtalk api regex")
});
static WEIXIN_API_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(GET|POST)\s+)?(https://api\.weixin\.qq\.com/[A-Za-z0-9_\-/{}.?=&]+)")
        .expect("weixin api regex")
});

fn first_api_match(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| {
        match caps.get(1) {
            Some(method) => format!("{} {}", method.as_str(), &caps[2]),
            None => caps[2].to_string(),
        }
    })
}

/// Wecom route (`/cgi-bin/...`) / 企业微信接口路径
pub fn extract_wecom_api_path(text: &str) -> Option<String> {
    first_api_match(&WECOM_API_RE, text)
}

/// Feishu route (`/open-apis/...`) / 飞书接口路径
pub fn extract_feishu_api_path(text: &str) -> Option<String> {
    first_api_match(&FEISHU_API_RE, text)
}

/// Dingtalk route (`/v1.0/...` or oapi URL) / 钉钉接口路径
pub fn extract_dingtalk_api_path(text: &str) -> Option<String> {
    first_api_match(&DINGTALK_API_RE, text)
}

/// WeChat route (`https://api.weixin.qq.com/...`) / 微信接口路径
pub fn extract_weixin_api_path(text: &str) -> Option<String> {
    first_api_match(&WEIXIN_API_RE, text)
}

/// 常用字的拼音首字母表 / Pinyin initial of common characters
///
/// Covers the characters that show up in doc-portal titles; anything not
/// listed falls back to codepoint order in the comparator below.
pub fn pinyin_initial(c: char) -> Option<char> {
    let initial = match c {
        '啊' | '阿' | '爱' | '安' | '按' | '案' => 'a',
        '把' | '百' | '版' | '办' | '帮' | '包' | '保' | '报' | '备' | '本' | '比' | '必'
        | '标' | '表' | '别' | '部' | '不' | '步' => 'b',
        '才' | '参' | '草' | '侧' | '测' | '层' | '查' | '产' | '常' | '场' | '超' | '成'
        | '程' | '出' | '初' | '除' | '处' | '传' | '创' | '次' | '从' | '错' => 'c',
        '打' | '大' | '代' | '单' | '当' | '导' | '到' | '得' | '的' | '地' | '第' | '点'
        | '电' | '调' | '定' | '订' | '东' | '动' | '读' | '端' | '对' | '多' | '档' | '登' => 'd',
        '恶' | '而' | '二' => 'e',
        '发' | '法' | '反' | '返' | '方' | '防' | '访' | '放' | '非' | '分' | '风' | '服'
        | '付' | '复' | '费' => 'f',
        '改' | '概' | '高' | '告' | '格' | '个' | '给' | '更' | '工' | '公' | '功' | '共'
        | '构' | '关' | '管' | '规' | '过' | '国' | '稿' => 'g',
        '海' | '函' | '号' | '好' | '合' | '和' | '核' | '后' | '获' | '话' | '回' | '汇'
        | '会' | '活' | '货' | '户' => 'h',
        '基' | '及' | '级' | '即' | '集' | '计' | '记' | '技' | '加' | '家' | '价' | '间'
        | '件' | '建' | '将' | '交' | '接' | '节' | '结' | '解' | '介' | '金' | '进' | '经'
        | '局' | '据' | '具' | '决' | '甲' | '机' | '简' | '检' | '教' => 'j',
        '卡' | '开' | '看' | '可' | '客' | '空' | '控' | '口' | '库' | '快' | '款' => 'k',
        '来' | '类' | '理' | '里' | '立' | '联' | '连' | '量' | '列' | '流' | '录' | '路'
        | '论' => 'l',
        '买' | '卖' | '满' | '媒' | '每' | '密' | '面' | '名' | '明' | '模' | '目' => 'm',
        '内' | '能' | '你' | '年' => 'n',
        '排' | '盘' | '配' | '批' | '票' | '品' | '平' | '评' | '屏' => 'p',
        '企' | '启' | '器' | '前' | '钱' | '请' | '取' | '全' | '券' | '权' | '确' | '群' => 'q',
        '然' | '人' | '认' | '日' | '如' | '入' => 'r',
        '三' | '商' | '上' | '设' | '审' | '生' | '失' | '时' | '实' | '使' | '示' | '事'
        | '试' | '收' | '首' | '授' | '输' | '属' | '数' | '双' | '水' | '说' | '送' | '搜'
        | '素' | '速' | '算' | '所' => 's',
        '台' | '提' | '体' | '条' | '通' | '同' | '头' | '图' | '退' | '推' => 't',
        '外' | '完' | '万' | '网' | '为' | '微' | '文' | '问' | '我' | '无' | '物' | '务' => 'w',
        '下' | '先' | '现' | '线' | '限' | '项' | '消' | '小' | '效' | '新' | '信' | '行'
        | '修' | '需' | '选' | '学' | '讯' | '息' | '详' | '销' => 'x',
        '验' | '样' | '要' | '业' | '一' | '已' | '以' | '义' | '议' | '异' | '音' | '应'
        | '用' | '优' | '邮' | '有' | '于' | '与' | '语' | '原' | '源' | '员' | '运' | '乙'
        | '页' | '移' | '营' | '云' => 'y',
        '在' | '暂' | '增' | '展' | '账' | '找' | '证' | '支' | '知' | '值' | '指' | '制'
        | '质' | '中' | '种' | '主' | '助' | '注' | '专' | '转' | '状' | '准' | '资' | '子'
        | '自' | '字' | '组' | '最' => 'z',
        _ => return None,
    };
    Some(initial)
}

fn zh_char_key(c: char) -> (u8, u32) {
    if c.is_ascii() {
        (0, c.to_ascii_lowercase() as u32)
    } else if let Some(initial) = pinyin_initial(c) {
        (1, initial as u32)
    } else {
        (2, c as u32)
    }
}

/// Localized title comparison / 按拼音首字母的标题比较
///
/// ASCII case-folds, covered Chinese characters compare by pinyin initial,
/// everything else by codepoint. Same-initial characters tie-break on
/// codepoint so the order stays total.
pub fn cmp_zh_titles(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let mut chars_a = a.chars();
    let mut chars_b = b.chars();
    loop {
        match (chars_a.next(), chars_b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = zh_char_key(x).cmp(&zh_char_key(y)).then(x.cmp(&y));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Classify a document by title and path keywords / 按标题和路径关键词分类
///
/// Platforms rarely label their docs, so the category falls out of naming
/// conventions. Anything unrecognized stays an API reference.
pub fn classify_doc_type(title: &str, path: &str) -> DocType {
    let haystack = format!("{} {}", title, path).to_lowercase();
    if haystack.contains("错误码") || haystack.contains("errcode") || haystack.contains("返回码")
    {
        return DocType::ErrorCode;
    }
    if haystack.contains("更新日志")
        || haystack.contains("changelog")
        || haystack.contains("更新记录")
    {
        return DocType::Changelog;
    }
    if haystack.contains("卡片模板") || haystack.contains("card_template") {
        return DocType::CardTemplate;
    }
    if haystack.contains("事件") || haystack.contains("回调") || haystack.contains("webhook") {
        return DocType::Event;
    }
    if haystack.contains("概述")
        || haystack.contains("简介")
        || haystack.contains("指南")
        || haystack.contains("快速开始")
        || haystack.contains("教程")
        || haystack.contains("guide")
        || haystack.contains("overview")
    {
        return DocType::Guide;
    }
    DocType::ApiReference
}

/// Sleep for the base delay plus random jitter / 基础延迟加随机抖动
pub async fn polite_delay(base_ms: u64, jitter_ms: u64) {
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };
    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
}

/// Default catalog-count gate / 默认数量闸
///
/// Below 80% of the previous run is treated as silent data loss and the
/// run must not delete anything; above 150% is suspicious growth (likely a
/// dedup failure upstream) but the run proceeds.
pub fn default_quality_gate(current: usize, last: usize) -> QualityGate {
    if last == 0 {
        return QualityGate::Pass;
    }
    let ratio = current as f64 / last as f64;
    if ratio < 0.8 {
        QualityGate::Reject(format!(
            "catalog shrank to {:.0}% of previous run ({} -> {})",
            ratio * 100.0,
            last,
            current
        ))
    } else if ratio > 1.5 {
        QualityGate::Warn(format!(
            "catalog grew to {:.0}% of previous run ({} -> {})",
            ratio * 100.0,
            last,
            current
        ))
    } else {
        QualityGate::Pass
    }
}

/// Shared HTTP client builder / 共享HTTP客户端
pub fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36")
        .timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .build()
        .expect("Failed to create HTTP client")
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(script|style)[^>]*>.*?</(script|style)>").expect("script regex")
});

/// Light HTML to Markdown-ish text conversion / 轻量HTML转文本
///
/// Good enough for platforms whose doc bodies are mostly text with a few
/// inline tags. The Wecom adapter carries its own full pipeline.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</div>", "\n")
        .replace("<hr>", "\n---\n")
        .replace("<hr/>", "\n---\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    collapse_blank_lines(&text)
}

/// Decode the handful of entities that matter / 解码常见HTML实体
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Collapse runs of blank lines to at most two / 连续空行折叠为两行
pub fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out.trim_end().to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_codes_dedup() {
        let md = "| 60011 | no privilege | 无权限 |\n| 60011 | dup | 重复 |\n| 40014 | invalid token | 无效token |\n";
        let codes = extract_error_codes(md);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].code, "60011");
        assert_eq!(codes[0].message, "no privilege");
        assert_eq!(codes[1].code, "40014");
    }

    #[test]
    fn test_error_codes_accept_negative_and_reject_short() {
        let md = "| -1 | sys busy | 系统繁忙 |\n| -1000 | neg | 负数码 |\n| 12 | too short | 不匹配 |\n";
        let codes = extract_error_codes(md);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "-1000");
    }

    #[test]
    fn test_wecom_api_path() {
        assert_eq!(
            extract_wecom_api_path("请求方式：POST /cgi-bin/message/send?access_token=ACCESS_TOKEN"),
            Some("POST /cgi-bin/message/send?access_token=ACCESS_TOKEN".to_string())
        );
        assert_eq!(
            extract_wecom_api_path("见 /cgi-bin/user/get"),
            Some("/cgi-bin/user/get".to_string())
        );
    }

    #[test]
    fn test_feishu_api_path() {
        assert_eq!(
            extract_feishu_api_path("POST /open-apis/im/v1/messages"),
            Some("POST /open-apis/im/v1/messages".to_string())
        );
    }

    #[test]
    fn test_dingtalk_api_path() {
        assert_eq!(
            extract_dingtalk_api_path("POST /v1.0/oauth2/accessToken"),
            Some("POST /v1.0/oauth2/accessToken".to_string())
        );
        assert!(extract_dingtalk_api_path("https://oapi.dingtalk.com/gettoken").is_some());
    }

    #[test]
    fn test_pinyin_initial_lookup() {
        assert_eq!(pinyin_initial('甲'), Some('j'));
        assert_eq!(pinyin_initial('乙'), Some('y'));
        assert_eq!(pinyin_initial('发'), Some('f'));
        // 表外字退回None
        assert_eq!(pinyin_initial('彧'), None);
    }

    #[test]
    fn test_cmp_zh_titles_by_pinyin() {
        use std::cmp::Ordering;
        // 甲(jiǎ) 排在 乙(yǐ) 前面，码点序则相反
        assert_eq!(cmp_zh_titles("甲文档", "乙文档"), Ordering::Less);
        assert!('甲' > '乙');
        // ASCII不区分大小写
        assert_eq!(cmp_zh_titles("API", "api"), Ordering::Equal);
        // 前缀短的在前
        assert_eq!(cmp_zh_titles("发送", "发送消息"), Ordering::Less);
    }

    #[test]
    fn test_classify_doc_type() {
        assert_eq!(classify_doc_type("全局错误码", "debug"), DocType::ErrorCode);
        assert_eq!(classify_doc_type("接入指南", "intro"), DocType::Guide);
        assert_eq!(classify_doc_type("通讯录事件", "callback"), DocType::Event);
        assert_eq!(classify_doc_type("更新日志", "misc"), DocType::Changelog);
        assert_eq!(classify_doc_type("卡片模板说明", "card"), DocType::CardTemplate);
        assert_eq!(classify_doc_type("发送应用消息", "api/send"), DocType::ApiReference);
    }

    #[test]
    fn test_quality_gate_thresholds() {
        assert!(matches!(default_quality_gate(79, 100), QualityGate::Reject(_)));
        assert_eq!(default_quality_gate(80, 100), QualityGate::Pass);
        assert_eq!(default_quality_gate(150, 100), QualityGate::Pass);
        assert!(matches!(default_quality_gate(151, 100), QualityGate::Warn(_)));
        assert_eq!(default_quality_gate(5, 0), QualityGate::Pass);
    }

    #[test]
    fn test_html_to_text() {
        let html = "<script>evil()</script><p>第一段</p><p>第二段&amp;更多</p>";
        let text = html_to_text(html);
        assert!(!text.contains("evil"));
        assert!(text.contains("第一段"));
        assert!(text.contains("第二段&更多"));
    }

    #[test]
    fn test_collapse_blank_lines() {
        let text = "a\n\n\n\n\nb\n";
        assert_eq!(collapse_blank_lines(text), "a\n\n\nb\n");
    }
}
