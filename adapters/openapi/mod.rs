//! Generic OpenAPI adapter / 通用OpenAPI适配器
//!
//! Any platform that publishes an OpenAPI / Swagger document can be
//! registered at runtime. The spec is fetched once per run and every
//! operation becomes one document.

pub mod render;
pub mod spec;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::common::{self, http_client};
use super::{AdapterFactory, DocContent, DocEntry, SourceAdapter};
use crate::models::DocType;

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

pub struct OpenApiAdapter {
    id: String,
    name: String,
    spec_url: String,
    client: reqwest::Client,
    /// Loaded once per run / 每次运行只加载一次
    spec: Mutex<Option<Value>>,
}

impl OpenApiAdapter {
    pub fn new(id: String, name: String, spec_url: String) -> Self {
        Self {
            id,
            name,
            spec_url,
            client: http_client(30),
            spec: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<Value> {
        let mut guard = self.spec.lock().await;
        if let Some(spec) = guard.as_ref() {
            return Ok(spec.clone());
        }
        let spec = spec::load_spec(&self.client, &self.spec_url).await?;
        *guard = Some(spec.clone());
        Ok(spec)
    }

    /// Walk paths × methods / 遍历 paths × methods
    fn operations(spec: &Value) -> Vec<(String, String, Value)> {
        let mut ops = Vec::new();
        let Some(paths) = spec.get("paths").and_then(|v| v.as_object()) else {
            return ops;
        };
        for (route, path_item) in paths {
            let Some(methods) = path_item.as_object() else { continue };
            for (method, operation) in methods {
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                ops.push((
                    method.to_uppercase(),
                    route.clone(),
                    operation.clone(),
                ));
            }
        }
        ops
    }

    fn platform_id(method: &str, route: &str, operation: &Value) -> String {
        operation
            .get("operationId")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("{}-{}", method.to_lowercase(), route))
    }

    fn entry_for(&self, method: &str, route: &str, operation: &Value) -> DocEntry {
        let tag = operation
            .get("tags")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let title = operation
            .get("summary")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("{} {}", method, route));

        let mut entry = DocEntry::new(
            format!("{}/{} {}", tag, method, route),
            title,
            Self::platform_id(method, route, operation),
        );
        entry.api_path = Some(format!("{} {}", method, route));
        entry.doc_type = DocType::ApiReference;
        entry.source_url = Some(self.spec_url.clone());
        entry
    }
}

#[async_trait]
impl SourceAdapter for OpenApiAdapter {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
        let spec = self.load().await?;
        let entries: Vec<DocEntry> = Self::operations(&spec)
            .iter()
            .map(|(method, route, op)| self.entry_for(method, route, op))
            .collect();
        tracing::info!("OpenAPI catalog loaded: {} ({} operations)", self.id, entries.len());
        Ok(entries)
    }

    async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
        let spec = self.load().await?;
        let (method, route, operation) = Self::operations(&spec)
            .into_iter()
            .find(|(m, r, op)| Self::platform_id(m, r, op) == entry.platform_id)
            .ok_or_else(|| anyhow!("operation not found in spec: {}", entry.platform_id))?;

        let rendered = render::render_operation(&spec, &method, &route, &operation);
        // 表格中的错误码与响应状态码合并
        let mut error_codes = common::extract_error_codes(&rendered.markdown);
        for ec in rendered.error_codes {
            if !error_codes.iter().any(|e| e.code == ec.code) {
                error_codes.push(ec);
            }
        }

        Ok(DocContent {
            markdown: rendered.markdown,
            api_path: Some(format!("{} {}", method, route)),
            error_codes,
            metadata: operation
                .get("operationId")
                .map(|id| serde_json::json!({ "operation_id": id })),
        })
    }
}

pub struct OpenApiFactory;

impl AdapterFactory for OpenApiFactory {
    fn adapter_type(&self) -> &'static str {
        "openapi"
    }

    fn create(&self, config: Value) -> Result<Arc<dyn SourceAdapter>> {
        let id = config
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("openapi config missing 'id'"))?
            .to_string();
        let name = config
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&id)
            .to_string();
        let spec_url = config
            .get("spec_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("openapi config missing 'spec_url'"))?
            .to_string();
        Ok(Arc::new(OpenApiAdapter::new(id, name, spec_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/pets": {
                    "get": { "operationId": "listPets", "summary": "列出宠物", "tags": ["pets"] },
                    "post": { "summary": "创建宠物", "tags": ["pets"] }
                }
            }
        })
    }

    #[test]
    fn test_operations_walk() {
        let ops = OpenApiAdapter::operations(&sample_spec());
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_platform_id_fallback() {
        let spec = sample_spec();
        let ops = OpenApiAdapter::operations(&spec);
        let (method, route, op) = ops.iter().find(|(m, _, _)| m == "POST").unwrap();
        assert_eq!(OpenApiAdapter::platform_id(method, route, op), "post-/pets");
        let (method, route, op) = ops.iter().find(|(m, _, _)| m == "GET").unwrap();
        assert_eq!(OpenApiAdapter::platform_id(method, route, op), "listPets");
    }

    #[test]
    fn test_entry_path_includes_tag() {
        let adapter = OpenApiAdapter::new(
            "petstore".into(),
            "Petstore".into(),
            "https://example.com/openapi.json".into(),
        );
        let spec = sample_spec();
        let ops = OpenApiAdapter::operations(&spec);
        let (method, route, op) = ops.iter().find(|(m, _, _)| m == "GET").unwrap();
        let entry = adapter.entry_for(method, route, op);
        assert_eq!(entry.path, "pets/GET /pets");
        assert_eq!(entry.api_path.as_deref(), Some("GET /pets"));
    }

    #[test]
    fn test_factory_requires_spec_url() {
        let factory = OpenApiFactory;
        assert!(factory.create(json!({"id": "x"})).is_err());
        assert!(factory
            .create(json!({"id": "x", "spec_url": "https://example.com/s.json"}))
            .is_ok());
    }
}
