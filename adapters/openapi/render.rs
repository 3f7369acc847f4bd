//! Operation rendering / 接口渲染
//!
//! Turns one OpenAPI operation into Markdown: description, parameter tables
//! grouped by location, request body schema, responses. Schema traversal is
//! iterative on an explicit visited set; cycles and external refs emit
//! sentinel strings instead of failing the document.

use serde_json::Value;
use std::collections::HashSet;

use crate::adapters::common::ExtractedErrorCode;

/// Schema nesting cap / 模式嵌套深度上限
const MAX_DEPTH: usize = 5;
/// Parameter locations in display order / 参数位置的展示顺序
const PARAM_LOCATIONS: &[(&str, &str)] = &[
    ("path", "路径参数"),
    ("query", "查询参数"),
    ("header", "请求头参数"),
    ("cookie", "Cookie参数"),
];

/// Rendered operation plus the error codes found in its responses
/// / 渲染结果与响应中的错误码
pub struct RenderedOperation {
    pub markdown: String,
    pub error_codes: Vec<ExtractedErrorCode>,
}

/// Render one operation / 渲染单个接口
pub fn render_operation(
    spec: &Value,
    method: &str,
    route: &str,
    operation: &Value,
) -> RenderedOperation {
    let mut out = String::new();
    let mut error_codes = Vec::new();

    let title = operation
        .get("summary")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{} {}", method, route));
    out.push_str(&format!("# {}\n\n", title));

    if operation.get("deprecated").and_then(|v| v.as_bool()) == Some(true) {
        out.push_str("> ⚠️ 该接口已废弃，请迁移到替代接口。\n\n");
    }

    out.push_str(&format!("`{} {}`\n\n", method, route));

    if let Some(desc) = operation.get("description").and_then(|v| v.as_str()) {
        if !desc.trim().is_empty() {
            out.push_str(desc.trim());
            out.push_str("\n\n");
        }
    }

    // 参数按位置分组成表
    if let Some(params) = operation.get("parameters").and_then(|v| v.as_array()) {
        for (location, heading) in PARAM_LOCATIONS {
            let rows: Vec<&Value> = params
                .iter()
                .filter(|p| p.get("in").and_then(|v| v.as_str()) == Some(*location))
                .collect();
            if rows.is_empty() {
                continue;
            }
            out.push_str(&format!("## {}\n\n", heading));
            out.push_str("| 参数 | 类型 | 必填 | 说明 |\n|---|---|---|---|\n");
            for p in rows {
                let name = p.get("name").and_then(|v| v.as_str()).unwrap_or("-");
                let required = if p.get("required").and_then(|v| v.as_bool()) == Some(true) {
                    "是"
                } else {
                    "否"
                };
                let type_name = p
                    .get("schema")
                    .map(|s| schema_type_name(spec, s))
                    .or_else(|| p.get("type").and_then(|v| v.as_str()).map(String::from))
                    .unwrap_or_else(|| "-".to_string());
                let desc = p
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .replace('\n', " ");
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    name, type_name, required, desc
                ));
            }
            out.push('\n');
        }
    }

    // 请求体（优先JSON媒体类型）
    if let Some(body) = operation.get("requestBody") {
        if let Some(schema) = preferred_media_schema(body) {
            out.push_str("## 请求体\n\n");
            let mut renderer = SchemaRenderer::new(spec);
            out.push_str(&renderer.render(schema, 0, 0));
            out.push('\n');
        }
    }

    // 响应逐状态码渲染；非2xx的状态码同时作为错误码上报
    if let Some(responses) = operation.get("responses").and_then(|v| v.as_object()) {
        out.push_str("## 响应\n\n");
        let mut statuses: Vec<&String> = responses.keys().collect();
        statuses.sort();
        for status in statuses {
            let response = &responses[status];
            let desc = response
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            out.push_str(&format!("### {} {}\n\n", status, desc));
            if let Some(schema) = preferred_media_schema(response) {
                let mut renderer = SchemaRenderer::new(spec);
                out.push_str(&renderer.render(schema, 0, 0));
                out.push('\n');
            }

            let is_2xx = status.starts_with('2');
            if !is_2xx && status != "default" && status.chars().all(|c| c.is_ascii_digit()) {
                error_codes.push(ExtractedErrorCode {
                    code: status.clone(),
                    message: desc.to_string(),
                    description: desc.to_string(),
                });
            }
        }
    }

    RenderedOperation {
        markdown: out,
        error_codes,
    }
}

/// Pick the JSON media type schema when present / 选取JSON媒体类型
fn preferred_media_schema(container: &Value) -> Option<&Value> {
    let content = container.get("content")?.as_object()?;
    content
        .get("application/json")
        .or_else(|| content.values().next())
        .and_then(|media| media.get("schema"))
}

/// Short type label for parameter tables / 参数表里的类型标签
fn schema_type_name(spec: &Value, schema: &Value) -> String {
    if let Some(r) = schema.get("$ref").and_then(|v| v.as_str()) {
        if let Some(resolved) = resolve_ref(spec, r) {
            return schema_type_name(spec, resolved);
        }
        return ref_name(r).to_string();
    }
    match schema.get("type").and_then(|v| v.as_str()) {
        Some("array") => {
            let item = schema
                .get("items")
                .map(|i| schema_type_name(spec, i))
                .unwrap_or_else(|| "any".to_string());
            format!("{}[]", item)
        }
        Some(t) => t.to_string(),
        None => "object".to_string(),
    }
}

fn ref_name(r: &str) -> &str {
    r.rsplit('/').next().unwrap_or(r)
}

/// Walk a `#/...` pointer inside the spec / 解析内部引用
fn resolve_ref<'a>(spec: &'a Value, r: &str) -> Option<&'a Value> {
    let pointer = r.strip_prefix("#/")?;
    let mut current = spec;
    for segment in pointer.split('/') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Schema block renderer / 模式块渲染器
pub struct SchemaRenderer<'a> {
    spec: &'a Value,
    visited: HashSet<String>,
}

impl<'a> SchemaRenderer<'a> {
    pub fn new(spec: &'a Value) -> Self {
        Self {
            spec,
            visited: HashSet::new(),
        }
    }

    /// Render a schema as an indented field list / 渲染为缩进字段列表
    pub fn render(&mut self, schema: &Value, indent: usize, depth: usize) -> String {
        let pad = "  ".repeat(indent);
        if depth > MAX_DEPTH {
            return format!("{}- ...（嵌套过深，已截断）\n", pad);
        }

        // $ref：外部引用与循环引用都用占位符表示
        if let Some(r) = schema.get("$ref").and_then(|v| v.as_str()) {
            if !r.starts_with("#/") {
                return format!("{}- [外部引用: {}]\n", pad, r);
            }
            if !self.visited.insert(r.to_string()) {
                return format!("{}- [循环引用: {}]\n", pad, ref_name(r));
            }
            let out = match resolve_ref(self.spec, r) {
                Some(resolved) => self.render(resolved, indent, depth + 1),
                None => format!("{}- [外部引用: {}]\n", pad, r),
            };
            self.visited.remove(r);
            return out;
        }

        // allOf 字段级合并
        if let Some(parts) = schema.get("allOf").and_then(|v| v.as_array()) {
            let merged = merge_all_of(self.spec, parts);
            return self.render(&merged, indent, depth + 1);
        }

        // oneOf / anyOf 展开为标注变体
        for key in ["oneOf", "anyOf"] {
            if let Some(variants) = schema.get(key).and_then(|v| v.as_array()) {
                let mut out = String::new();
                for (i, variant) in variants.iter().enumerate() {
                    out.push_str(&format!("{}- 方式{}：\n", pad, i + 1));
                    out.push_str(&self.render(variant, indent + 1, depth + 1));
                }
                return out;
            }
        }

        match schema.get("type").and_then(|v| v.as_str()) {
            Some("array") => {
                let mut out = format!("{}- (array)\n", pad);
                if let Some(items) = schema.get("items") {
                    out.push_str(&self.render(items, indent + 1, depth + 1));
                }
                out
            }
            Some("object") | None => {
                let mut out = String::new();
                let required: HashSet<&str> = schema
                    .get("required")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();
                let Some(props) = schema.get("properties").and_then(|v| v.as_object()) else {
                    return format!("{}- (object)\n", pad);
                };
                for (name, prop) in props {
                    let type_name = schema_type_name(self.spec, prop);
                    let req = if required.contains(name.as_str()) {
                        "，必填"
                    } else {
                        ""
                    };
                    let desc = prop
                        .get("description")
                        .and_then(|v| v.as_str())
                        .map(|d| format!("：{}", d.replace('\n', " ")))
                        .unwrap_or_default();
                    out.push_str(&format!("{}- {} ({}{}){}\n", pad, name, type_name, req, desc));

                    // 内联的对象和数组继续展开
                    let is_ref = prop.get("$ref").is_some();
                    let nested_object = prop.get("properties").is_some();
                    let nested_array = prop.get("type").and_then(|v| v.as_str()) == Some("array");
                    if is_ref || nested_object || nested_array {
                        out.push_str(&self.render(prop, indent + 1, depth + 1));
                    }
                    if let Some(values) = prop.get("enum").and_then(|v| v.as_array()) {
                        let list: Vec<String> = values
                            .iter()
                            .map(|v| format!("`{}`", value_literal(v)))
                            .collect();
                        out.push_str(&format!("{}  可选值：{}\n", pad, list.join(", ")));
                    }
                }
                out
            }
            Some(t) => {
                let mut line = format!("{}- ({})", pad, t);
                if let Some(values) = schema.get("enum").and_then(|v| v.as_array()) {
                    let list: Vec<String> = values
                        .iter()
                        .map(|v| format!("`{}`", value_literal(v)))
                        .collect();
                    line.push_str(&format!(" 可选值：{}", list.join(", ")));
                }
                line.push('\n');
                line
            }
        }
    }
}

fn value_literal(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Field-wise allOf merge / allOf字段合并
fn merge_all_of(spec: &Value, parts: &[Value]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for part in parts {
        let resolved = part
            .get("$ref")
            .and_then(|v| v.as_str())
            .and_then(|r| resolve_ref(spec, r))
            .unwrap_or(part);
        if let Some(props) = resolved.get("properties").and_then(|v| v.as_object()) {
            for (k, v) in props {
                properties.insert(k.clone(), v.clone());
            }
        }
        if let Some(reqs) = resolved.get("required").and_then(|v| v.as_array()) {
            required.extend(reqs.iter().cloned());
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_basic_operation() {
        let spec = json!({});
        let op = json!({
            "summary": "创建宠物",
            "description": "创建一只宠物。",
            "parameters": [
                { "name": "verbose", "in": "query", "required": false, "schema": { "type": "boolean" } }
            ],
            "responses": {
                "200": { "description": "成功" },
                "400": { "description": "参数错误" }
            }
        });
        let rendered = render_operation(&spec, "POST", "/pets", &op);
        assert!(rendered.markdown.contains("# 创建宠物"));
        assert!(rendered.markdown.contains("`POST /pets`"));
        assert!(rendered.markdown.contains("查询参数"));
        // 非2xx响应作为错误码上报
        assert_eq!(rendered.error_codes.len(), 1);
        assert_eq!(rendered.error_codes[0].code, "400");
    }

    #[test]
    fn test_deprecated_banner() {
        let rendered = render_operation(&json!({}), "GET", "/old", &json!({"deprecated": true}));
        assert!(rendered.markdown.contains("已废弃"));
    }

    #[test]
    fn test_schema_cycle_sentinel() {
        let spec = json!({
            "components": { "schemas": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "next": { "$ref": "#/components/schemas/Node" }
                    }
                }
            }}
        });
        let mut renderer = SchemaRenderer::new(&spec);
        let out = renderer.render(&json!({"$ref": "#/components/schemas/Node"}), 0, 0);
        assert!(out.contains("[循环引用: Node]"));
    }

    #[test]
    fn test_external_ref_sentinel() {
        let empty_spec = json!({});
        let mut renderer = SchemaRenderer::new(&empty_spec);
        let out = renderer.render(&json!({"$ref": "other.yaml#/Pet"}), 0, 0);
        assert!(out.contains("[外部引用: other.yaml#/Pet]"));
    }

    #[test]
    fn test_all_of_merges_fields() {
        let spec = json!({
            "components": { "schemas": {
                "Base": { "type": "object", "properties": { "id": { "type": "integer" } }, "required": ["id"] }
            }}
        });
        let schema = json!({
            "allOf": [
                { "$ref": "#/components/schemas/Base" },
                { "type": "object", "properties": { "name": { "type": "string" } }, "required": ["name"] }
            ]
        });
        let mut renderer = SchemaRenderer::new(&spec);
        let out = renderer.render(&schema, 0, 0);
        assert!(out.contains("id (integer，必填)"));
        assert!(out.contains("name (string，必填)"));
    }

    #[test]
    fn test_one_of_variants() {
        let schema = json!({
            "oneOf": [
                { "type": "string" },
                { "type": "integer" }
            ]
        });
        let empty_spec = json!({});
        let mut renderer = SchemaRenderer::new(&empty_spec);
        let out = renderer.render(&schema, 0, 0);
        assert!(out.contains("方式1"));
        assert!(out.contains("方式2"));
    }

    #[test]
    fn test_enum_backtick_list() {
        let schema = json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["available", "sold"] }
            }
        });
        let empty_spec = json!({});
        let mut renderer = SchemaRenderer::new(&empty_spec);
        let out = renderer.render(&schema, 0, 0);
        assert!(out.contains("`available`, `sold`"));
    }

    #[test]
    fn test_depth_cap() {
        // 六层自嵌套数组触发深度截断
        let mut schema = json!({"type": "string"});
        for _ in 0..8 {
            schema = json!({"type": "array", "items": schema});
        }
        let empty_spec = json!({});
        let mut renderer = SchemaRenderer::new(&empty_spec);
        let out = renderer.render(&schema, 0, 0);
        assert!(out.contains("嵌套过深"));
    }
}
