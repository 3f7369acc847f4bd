//! OpenAPI spec loading / OpenAPI规范加载
//!
//! Specs arrive as JSON or YAML; Swagger 2.0 documents are upgraded to an
//! OpenAPI 3 shape just far enough for rendering (schemas, parameters,
//! request bodies, servers).

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

/// Fetch and parse the spec / 拉取并解析规范
pub async fn load_spec(client: &reqwest::Client, url: &str) -> Result<Value> {
    let text = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetch spec {}", url))?
        .text()
        .await?;
    parse_spec(&text)
}

/// JSON first, YAML on failure / 先按JSON解析，失败再按YAML
pub fn parse_spec(text: &str) -> Result<Value> {
    let spec: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(text).context("spec is neither valid JSON nor YAML")?,
    };
    if spec.get("swagger").and_then(|v| v.as_str()) == Some("2.0") {
        Ok(convert_swagger2(spec))
    } else {
        Ok(spec)
    }
}

/// Swagger 2.0 to OpenAPI 3 compatibility shim / Swagger 2.0 升级
pub fn convert_swagger2(spec: Value) -> Value {
    let mut root = match spec {
        Value::Object(map) => map,
        other => return other,
    };

    // host + basePath -> servers
    let host = root.get("host").and_then(|v| v.as_str()).unwrap_or("");
    let base_path = root.get("basePath").and_then(|v| v.as_str()).unwrap_or("");
    if !host.is_empty() {
        let scheme = root
            .get("schemes")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .unwrap_or("https");
        root.insert(
            "servers".to_string(),
            json!([{ "url": format!("{}://{}{}", scheme, host, base_path) }]),
        );
    }

    // definitions -> components.schemas
    if let Some(definitions) = root.remove("definitions") {
        let mut components = Map::new();
        components.insert("schemas".to_string(), definitions);
        root.insert("components".to_string(), Value::Object(components));
    }

    // body参数转requestBody，其余参数保留
    if let Some(Value::Object(paths)) = root.get_mut("paths") {
        for (_, path_item) in paths.iter_mut() {
            let Value::Object(methods) = path_item else { continue };
            for (_, operation) in methods.iter_mut() {
                let Value::Object(op) = operation else { continue };
                let Some(Value::Array(params)) = op.get("parameters").cloned() else {
                    continue;
                };
                let (body, rest): (Vec<Value>, Vec<Value>) = params
                    .into_iter()
                    .partition(|p| p.get("in").and_then(|v| v.as_str()) == Some("body"));
                if let Some(body_param) = body.into_iter().next() {
                    let schema = body_param.get("schema").cloned().unwrap_or(Value::Null);
                    op.insert(
                        "requestBody".to_string(),
                        json!({
                            "content": { "application/json": { "schema": schema } },
                            "required": body_param.get("required").cloned().unwrap_or(Value::Bool(false)),
                        }),
                    );
                }
                op.insert("parameters".to_string(), Value::Array(rest));
            }
        }
    }

    root.insert("openapi".to_string(), Value::String("3.0.0".to_string()));
    let mut value = Value::Object(root);
    rewrite_refs(&mut value);
    value
}

/// `#/definitions/X` -> `#/components/schemas/X` / 重写引用路径
fn rewrite_refs(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get_mut("$ref") {
                if let Some(name) = r.strip_prefix("#/definitions/") {
                    *r = format!("#/components/schemas/{}", name);
                }
            }
            for (_, v) in map.iter_mut() {
                rewrite_refs(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                rewrite_refs(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_spec() {
        let spec = parse_spec(r#"{"openapi": "3.0.0", "paths": {}}"#).unwrap();
        assert_eq!(spec["openapi"], "3.0.0");
    }

    #[test]
    fn test_parse_yaml_spec() {
        let spec = parse_spec("openapi: 3.0.0\npaths: {}\n").unwrap();
        assert_eq!(spec["openapi"], "3.0.0");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_spec("{{{{not a spec").is_err());
    }

    #[test]
    fn test_swagger2_conversion() {
        let swagger = r##"{
            "swagger": "2.0",
            "host": "api.example.com",
            "basePath": "/v1",
            "definitions": { "Pet": { "type": "object" } },
            "paths": {
                "/pets": {
                    "post": {
                        "parameters": [
                            { "in": "body", "name": "body", "schema": { "$ref": "#/definitions/Pet" } },
                            { "in": "query", "name": "verbose", "type": "boolean" }
                        ]
                    }
                }
            }
        }"##;
        let spec = parse_spec(swagger).unwrap();
        assert_eq!(spec["openapi"], "3.0.0");
        assert_eq!(spec["servers"][0]["url"], "https://api.example.com/v1");
        assert!(spec["components"]["schemas"]["Pet"].is_object());

        let op = &spec["paths"]["/pets"]["post"];
        assert_eq!(
            op["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Pet"
        );
        // body参数已移出，query参数保留
        assert_eq!(op["parameters"].as_array().unwrap().len(), 1);
    }
}
