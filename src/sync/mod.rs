//! Sync runner / 同步执行器
//!
//! Orchestrates one source end to end: open a sync log, walk the catalog,
//! pass the quality gate, fetch contents on a pool sized by the adapter,
//! flush batches of 50 to the bulk endpoint, sweep documents that fell out
//! of the catalog, close the log with counts. Deletions only happen after
//! the quality gate clears, and only on an untruncated full-catalog run.

pub mod client;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};

use crate::adapters::{DocEntry, QualityGate, SourceAdapter};
use crate::models::{SyncCounts, SyncStatus};
use crate::store::DocStore;
use crate::utils::clean_doc_path;

pub use client::{AdminClient, PendingDocument, PendingErrorCode};

/// Rows per bulk POST / 每批提交的文档数
const BATCH_SIZE: usize = 50;
/// Incremental window / 增量窗口
const INCREMENTAL_DAYS: i64 = 7;

pub struct SyncRunner {
    store: DocStore,
    client: AdminClient,
    pub incremental: bool,
    /// Debug truncation of the catalog / 调试用目录截断
    pub limit: Option<usize>,
}

impl SyncRunner {
    pub fn new(store: DocStore, client: AdminClient) -> Self {
        Self {
            store,
            client,
            incremental: false,
            limit: None,
        }
    }

    /// Run one source / 同步一个来源
    pub async fn run_source(&self, adapter: Arc<dyn SourceAdapter>) -> Result<SyncCounts> {
        let source_id = adapter.source_id().to_string();
        let display_name = adapter.display_name().to_string();

        self.store
            .upsert_source(&source_id, &display_name, None)
            .await?;
        let log_id = self.store.create_sync_log(&source_id).await?;

        match self.run_inner(adapter, &source_id, &display_name).await {
            Ok(counts) => {
                // 单篇失败不改变运行状态，错误数体现在退出码里
                self.store
                    .update_sync_log(log_id, SyncStatus::Success, &counts, None)
                    .await?;
                self.store.update_source_sync_time(&source_id).await?;
                println!(
                    "{} {}: 新增 {} 更新 {} 未变 {} 失败 {}",
                    style("✅").green(),
                    display_name,
                    counts.created,
                    counts.updated,
                    counts.unchanged,
                    counts.errors
                );
                Ok(counts)
            }
            Err(e) => {
                self.store
                    .update_sync_log(log_id, SyncStatus::Failed, &SyncCounts::default(), Some(&e.to_string()))
                    .await
                    .ok();
                println!("{} {}: {}", style("❌").red(), display_name, e);
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        source_id: &str,
        display_name: &str,
    ) -> Result<SyncCounts> {
        // 目录阶段
        let mut entries = if self.incremental {
            let since = Utc::now() - Duration::days(INCREMENTAL_DAYS);
            adapter.detect_updates(since).await?
        } else {
            adapter.fetch_catalog().await?
        };

        // 质量闸：目录数量相对上次运行的缓存值
        let prior = self
            .store
            .get_source(source_id)
            .await?
            .map(|s| s.doc_count)
            .unwrap_or(0) as usize;
        match adapter.check_quality_gate(entries.len(), prior) {
            QualityGate::Reject(reason) => {
                return Err(anyhow!("quality gate rejected the run: {}", reason));
            }
            QualityGate::Warn(reason) => {
                tracing::warn!("质量闸警告（继续运行）: {}", reason);
            }
            QualityGate::Pass => {}
        }

        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }
        let total = entries.len();
        tracing::info!("{}: {} 篇待处理", display_name, total);

        // 清理阶段需要完整目录的路径全集，entries马上会移入拉取任务
        let catalog_paths: std::collections::HashSet<String> =
            entries.iter().map(|e| clean_doc_path(&e.path)).collect();

        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let report_every = std::cmp::max(100, total / 10);

        // 拉取池：宽度由适配器决定（浏览器驱动的适配器是1），
        // 结果通过通道汇到单一收集器，批次因此天然按序提交
        let concurrency = adapter.max_concurrency().max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<Result<PendingDocument>>(concurrency * 2);

        let fetcher = {
            let adapter = adapter.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let mut handles = Vec::new();
                for entry in entries {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let adapter = adapter.clone();
                    let tx = tx.clone();
                    handles.push(tokio::spawn(async move {
                        let result = fetch_one(adapter.as_ref(), &entry).await;
                        drop(permit);
                        tx.send(result).await.ok();
                    }));
                }
                for handle in handles {
                    handle.await.ok();
                }
            })
        };

        // 收集器：凑满一批就提交
        let mut counts = SyncCounts::default();
        let mut batch: Vec<PendingDocument> = Vec::with_capacity(BATCH_SIZE);
        let mut processed = 0usize;

        while let Some(result) = rx.recv().await {
            processed += 1;
            progress.inc(1);
            if processed % report_every == 0 {
                tracing::info!("{}: 已处理 {}/{}", display_name, processed, total);
            }

            match result {
                Ok(doc) => {
                    batch.push(doc);
                    if batch.len() >= BATCH_SIZE {
                        self.flush(source_id, display_name, &mut batch, &mut counts).await;
                    }
                }
                Err(e) => {
                    counts.errors += 1;
                    tracing::warn!("{}: 单篇拉取失败: {}", display_name, e);
                }
            }
        }
        fetcher.await.ok();

        // 清掉残余批次
        if !batch.is_empty() {
            self.flush(source_id, display_name, &mut batch, &mut counts).await;
        }
        progress.finish_with_message("完成");

        // 清理已下线文档。质量闸在前面拦掉了可疑的目录缩水；
        // 增量或截断的运行看不到完整目录，不做删除
        if !self.incremental && self.limit.is_none() {
            let existing = self.store.get_documents_by_source(source_id).await?;
            for doc in existing {
                if catalog_paths.contains(doc.path.as_str()) {
                    continue;
                }
                if self.store.delete_document(&doc.id).await? {
                    counts.deleted += 1;
                    tracing::info!("{}: 删除已下线文档 {} ({})", display_name, doc.path, doc.id);
                }
            }
            if counts.deleted > 0 {
                tracing::info!("{}: 共删除 {} 篇", display_name, counts.deleted);
            }
        }

        Ok(counts)
    }

    /// Submit one batch; an HTTP failure fails the rows, not the run
    /// / 提交批次，失败只计入错误数
    async fn flush(
        &self,
        source_id: &str,
        display_name: &str,
        batch: &mut Vec<PendingDocument>,
        counts: &mut SyncCounts,
    ) {
        let documents: Vec<PendingDocument> = batch.drain(..).collect();
        match self
            .client
            .bulk_upsert(source_id, Some(display_name), &documents)
            .await
        {
            Ok(response) => {
                counts.created += response.created;
                counts.updated += response.updated;
                counts.unchanged += response.unchanged;
            }
            Err(e) => {
                counts.errors += documents.len() as i64;
                tracing::error!("{}: 批次提交失败（{} 篇计为错误）: {}", display_name, documents.len(), e);
            }
        }
    }
}

/// Fetch one entry and merge content over catalog / 拉取单篇并合并目录信息
async fn fetch_one(adapter: &dyn SourceAdapter, entry: &DocEntry) -> Result<PendingDocument> {
    let content = adapter.fetch_content(entry).await?;
    Ok(PendingDocument {
        path: entry.path.clone(),
        title: entry.title.clone(),
        content: content.markdown,
        // 正文里提取到的接口路径覆盖目录里的
        api_path: content.api_path.or_else(|| entry.api_path.clone()),
        dev_mode: entry.dev_mode,
        doc_type: Some(entry.doc_type),
        source_url: entry.source_url.clone(),
        metadata: content.metadata.map(|v| v.to_string()),
        last_updated: entry.last_updated,
        error_codes: content
            .error_codes
            .into_iter()
            .map(|ec| PendingErrorCode {
                code: ec.code,
                message: ec.message,
                description: if ec.description.is_empty() {
                    None
                } else {
                    Some(ec.description)
                },
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DocContent, QualityGate};
    use async_trait::async_trait;

    /// Catalog-only fake adapter / 仅有目录的假适配器
    struct FakeAdapter {
        entries: Vec<DocEntry>,
        fail_paths: Vec<String>,
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn source_id(&self) -> &str {
            "wecom"
        }
        fn display_name(&self) -> &str {
            "测试来源"
        }
        async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
            Ok(self.entries.clone())
        }
        async fn fetch_content(&self, entry: &DocEntry) -> Result<DocContent> {
            if self.fail_paths.contains(&entry.path) {
                return Err(anyhow!("simulated fetch failure"));
            }
            Ok(DocContent {
                markdown: format!("# {}\n\n正文", entry.title),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_quality_gate_drives_abort() {
        let adapter = FakeAdapter {
            entries: vec![],
            fail_paths: vec![],
        };
        assert!(matches!(
            adapter.check_quality_gate(10, 100),
            QualityGate::Reject(_)
        ));
    }

    fn seed_input(path: &str, title: &str) -> crate::models::UpsertInput {
        crate::models::UpsertInput {
            source_id: "wecom".into(),
            path: path.into(),
            title: title.into(),
            content: "正文".into(),
            api_path: None,
            dev_mode: None,
            doc_type: None,
            source_url: None,
            metadata: None,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_full_run_deletes_stale_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("s.db")).await.unwrap();
        store
            .bulk_upsert(
                "wecom",
                Some("测试来源"),
                &[seed_input("a/one", "文档一"), seed_input("a/two", "文档二")],
            )
            .await
            .unwrap();

        // 新目录里 a/two 已下线；批量接口不可达，上传只计错误，
        // 清理照常进行
        let adapter = Arc::new(FakeAdapter {
            entries: vec![
                DocEntry::new("a/one", "文档一", "1"),
                DocEntry::new("a/three", "文档三", "3"),
            ],
            fail_paths: vec![],
        });
        let client = AdminClient::new("http://127.0.0.1:9", "dev-token");
        let runner = SyncRunner::new(store.clone(), client);
        let counts = runner.run_source(adapter).await.unwrap();

        assert_eq!(counts.deleted, 1);
        assert_eq!(counts.errors, 2);
        let id_two = crate::models::document_id("wecom", "a/two");
        assert!(store.get_document(&id_two).await.unwrap().is_none());
        let id_one = crate::models::document_id("wecom", "a/one");
        assert!(store.get_document(&id_one).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quality_gate_abort_suppresses_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("g.db")).await.unwrap();
        store
            .bulk_upsert(
                "wecom",
                Some("测试来源"),
                &[seed_input("a/one", "文档一"), seed_input("a/two", "文档二")],
            )
            .await
            .unwrap();

        // 目录缩水到上次的50%，质量闸拒绝整次运行
        let adapter = Arc::new(FakeAdapter {
            entries: vec![DocEntry::new("a/one", "文档一", "1")],
            fail_paths: vec![],
        });
        let client = AdminClient::new("http://127.0.0.1:9", "dev-token");
        let runner = SyncRunner::new(store.clone(), client);
        assert!(runner.run_source(adapter).await.is_err());

        // 一篇都没删
        assert_eq!(store.count_documents(Some("wecom")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_incremental_run_skips_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("i.db")).await.unwrap();
        store
            .bulk_upsert("wecom", Some("测试来源"), &[seed_input("a/one", "文档一")])
            .await
            .unwrap();

        // 增量目录只是子集，不能据此删除
        let adapter = Arc::new(FakeAdapter {
            entries: vec![DocEntry::new("a/new", "新文档", "9")],
            fail_paths: vec![],
        });
        let client = AdminClient::new("http://127.0.0.1:9", "dev-token");
        let mut runner = SyncRunner::new(store.clone(), client);
        runner.incremental = true;
        let counts = runner.run_source(adapter).await.unwrap();

        assert_eq!(counts.deleted, 0);
        assert_eq!(store.count_documents(Some("wecom")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_one_merges_api_path() {
        struct ApiPathAdapter;
        #[async_trait]
        impl SourceAdapter for ApiPathAdapter {
            fn source_id(&self) -> &str {
                "wecom"
            }
            fn display_name(&self) -> &str {
                "x"
            }
            async fn fetch_catalog(&self) -> Result<Vec<DocEntry>> {
                Ok(vec![])
            }
            async fn fetch_content(&self, _entry: &DocEntry) -> Result<DocContent> {
                Ok(DocContent {
                    markdown: "# t".into(),
                    api_path: Some("POST /cgi-bin/from-content".into()),
                    ..Default::default()
                })
            }
        }
        let mut entry = DocEntry::new("a/b", "标题", "1");
        entry.api_path = Some("POST /cgi-bin/from-entry".into());
        let doc = fetch_one(&ApiPathAdapter, &entry).await.unwrap();
        assert_eq!(doc.api_path.as_deref(), Some("POST /cgi-bin/from-content"));
    }
}
