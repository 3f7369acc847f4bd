//! Document store - typed facade over SQLite / 文档存储
//!
//! Owns schema bootstrap, WAL setup and all reads/writes. Every
//! transactional operation commits or rolls back as a whole; a partial
//! batch is never visible to readers.

pub mod schema;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::models::{
    content_hash, document_id, path_depth, DevMode, DocType, Document, ErrorCode, SyncCounts,
    SyncStatus, Source, UpsertAction, UpsertInput,
};
use crate::search::tokenizer::tokenize_joined;
use crate::utils::clean_doc_path;

/// Result of a bulk upsert / 批量入库结果
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BulkUpsertResult {
    pub created: i64,
    pub updated: i64,
    pub unchanged: i64,
}

/// Category listing row / 分类列表行
#[derive(Debug, Clone)]
pub struct CategoryEntry {
    pub source_id: String,
    pub category: String,
    pub doc_count: i64,
}

/// Typed accessor over the relational store / 数据库访问层
#[derive(Clone)]
pub struct DocStore {
    pool: Pool<Sqlite>,
}

impl DocStore {
    /// Open the database, enable WAL and apply the schema
    /// / 打开数据库，启用WAL并应用表结构
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .with_context(|| format!("open database {}", database_url))?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=10000").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    /// Open an on-disk database from a file path / 按文件路径打开
    pub async fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    async fn apply_schema(&self) -> Result<()> {
        for ddl in schema::SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .with_context(|| "apply schema")?;
        }
        Ok(())
    }

    // ---------- documents ----------

    /// Insert or update one document / 单篇入库
    pub async fn upsert_document(&self, input: &UpsertInput) -> Result<(String, UpsertAction)> {
        let mut tx = self.pool.begin().await?;
        self.ensure_source(&mut tx, &input.source_id, None).await?;
        let (doc_id, action) = Self::upsert_in_tx(&mut tx, input).await?;
        Self::refresh_doc_count(&mut tx, &input.source_id).await?;
        tx.commit().await?;
        Ok((doc_id, action))
    }

    /// Upsert many documents in one transaction / 批量入库（单事务）
    ///
    /// At the end the cached `sources.doc_count` is recomputed for the
    /// source. Any row failure rolls the whole batch back.
    pub async fn bulk_upsert(
        &self,
        source_id: &str,
        source_name: Option<&str>,
        inputs: &[UpsertInput],
    ) -> Result<BulkUpsertResult> {
        let mut result = BulkUpsertResult::default();
        let mut tx = self.pool.begin().await?;
        self.ensure_source(&mut tx, source_id, source_name).await?;

        for input in inputs {
            if input.source_id != source_id {
                bail!(
                    "document source '{}' does not match batch source '{}'",
                    input.source_id,
                    source_id
                );
            }
            let (_, action) = Self::upsert_in_tx(&mut tx, input).await?;
            match action {
                UpsertAction::Created => result.created += 1,
                UpsertAction::Updated => result.updated += 1,
                UpsertAction::Unchanged => result.unchanged += 1,
            }
        }

        Self::refresh_doc_count(&mut tx, source_id).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Per-row upsert logic / 单行入库逻辑
    ///
    /// Unchanged content leaves the row (and therefore the FTS index)
    /// completely untouched.
    async fn upsert_in_tx(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        input: &UpsertInput,
    ) -> Result<(String, UpsertAction)> {
        let path = clean_doc_path(&input.path);
        if path.is_empty() {
            bail!("document path is empty");
        }
        if input.title.trim().is_empty() {
            bail!("document title is empty (path: {})", path);
        }
        if input.dev_mode.is_some() && input.source_id != "wecom" {
            bail!(
                "dev_mode is a wecom-only field (source: {})",
                input.source_id
            );
        }

        let doc_id = document_id(&input.source_id, &path);
        let hash = content_hash(&input.content);
        let now = Utc::now().to_rfc3339();

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT content_hash FROM documents WHERE id = ?")
                .bind(&doc_id)
                .fetch_optional(&mut **tx)
                .await?;

        match existing {
            Some((old_hash,)) if old_hash == hash => Ok((doc_id, UpsertAction::Unchanged)),
            Some((old_hash,)) => {
                let tokenized_title = tokenize_joined(&input.title);
                let tokenized_content = tokenize_joined(&input.content);
                sqlx::query(
                    r#"
                    UPDATE documents SET
                        path = ?, path_depth = ?, title = ?, api_path = ?, dev_mode = ?,
                        doc_type = ?, content = ?, content_hash = ?, prev_content_hash = ?,
                        source_url = ?, metadata = ?, tokenized_title = ?,
                        tokenized_content = ?, last_updated = ?, synced_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&path)
                .bind(path_depth(&path))
                .bind(&input.title)
                .bind(&input.api_path)
                .bind(input.dev_mode.map(|m| m.as_str()))
                .bind(input.doc_type.unwrap_or_default().as_str())
                .bind(&input.content)
                .bind(&hash)
                .bind(&old_hash)
                .bind(&input.source_url)
                .bind(&input.metadata)
                .bind(&tokenized_title)
                .bind(&tokenized_content)
                .bind(input.last_updated.map(|t| t.to_rfc3339()))
                .bind(&now)
                .bind(&doc_id)
                .execute(&mut **tx)
                .await?;
                Ok((doc_id, UpsertAction::Updated))
            }
            None => {
                let tokenized_title = tokenize_joined(&input.title);
                let tokenized_content = tokenize_joined(&input.content);
                sqlx::query(
                    r#"
                    INSERT INTO documents (
                        id, source_id, path, path_depth, title, api_path, dev_mode,
                        doc_type, content, content_hash, prev_content_hash, source_url,
                        metadata, tokenized_title, tokenized_content, last_updated, synced_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&doc_id)
                .bind(&input.source_id)
                .bind(&path)
                .bind(path_depth(&path))
                .bind(&input.title)
                .bind(&input.api_path)
                .bind(input.dev_mode.map(|m| m.as_str()))
                .bind(input.doc_type.unwrap_or_default().as_str())
                .bind(&input.content)
                .bind(&hash)
                .bind(&input.source_url)
                .bind(&input.metadata)
                .bind(&tokenized_title)
                .bind(&tokenized_content)
                .bind(input.last_updated.map(|t| t.to_rfc3339()))
                .bind(&now)
                .execute(&mut **tx)
                .await?;
                Ok((doc_id, UpsertAction::Created))
            }
        }
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_document(&r)).transpose()
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let source: Option<(String,)> =
            sqlx::query_as("SELECT source_id FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((source_id,)) = source else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::refresh_doc_count(&mut tx, &source_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_documents_by_source(&self, source_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE source_id = ? ORDER BY path")
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    /// Documents under one category (first path segment) / 按分类列出文档
    pub async fn get_documents_by_category(
        &self,
        source_id: &str,
        category: &str,
        mode: Option<DevMode>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT * FROM documents WHERE source_id = ? AND (path = ? OR path LIKE ?)",
        );
        if mode.is_some() {
            sql.push_str(" AND dev_mode = ?");
        }
        sql.push_str(" ORDER BY path LIMIT ?");

        let mut query = sqlx::query(&sql)
            .bind(source_id)
            .bind(category)
            .bind(format!("{}/%", category));
        if let Some(m) = mode {
            query = query.bind(m.as_str());
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    /// Recently synced documents / 最近入库的文档
    pub async fn get_recent_documents(
        &self,
        source_id: Option<&str>,
        days: i64,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let mut sql = String::from("SELECT * FROM documents WHERE synced_at >= ?");
        if source_id.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        sql.push_str(" ORDER BY synced_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(cutoff);
        if let Some(s) = source_id {
            query = query.bind(s);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    /// Distinct first path segments with counts / 各来源的分类统计
    pub async fn list_categories(&self, source_id: Option<&str>) -> Result<Vec<CategoryEntry>> {
        let mut sql = String::from(
            r#"
            SELECT source_id,
                   CASE WHEN instr(path, '/') > 0
                        THEN substr(path, 1, instr(path, '/') - 1)
                        ELSE path END AS category,
                   COUNT(*) AS cnt
            FROM documents
            "#,
        );
        if source_id.is_some() {
            sql.push_str(" WHERE source_id = ?");
        }
        sql.push_str(" GROUP BY source_id, category ORDER BY source_id, category");

        let mut query = sqlx::query(&sql);
        if let Some(s) = source_id {
            query = query.bind(s);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| CategoryEntry {
                source_id: r.get("source_id"),
                category: r.get("category"),
                doc_count: r.get("cnt"),
            })
            .collect())
    }

    pub async fn count_documents(&self, source_id: Option<&str>) -> Result<i64> {
        let count: (i64,) = match source_id {
            Some(s) => {
                sqlx::query_as("SELECT COUNT(*) FROM documents WHERE source_id = ?")
                    .bind(s)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM documents")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.0)
    }

    /// Rebuild the FTS index and return the document count
    /// / 重建FTS索引并返回文档数
    pub async fn reindex(&self) -> Result<i64> {
        sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await?;
        self.count_documents(None).await
    }

    // ---------- search queries ----------

    /// FTS MATCH query with bm25 rank / FTS检索，附带bm25得分
    ///
    /// Returns pairs of (document, |bm25|). The caller handles match
    /// expression syntax errors by falling back to `like_search`.
    pub async fn fts_search(
        &self,
        match_expr: &str,
        source: Option<&str>,
        mode: Option<DevMode>,
        cap: usize,
    ) -> Result<Vec<(Document, f64)>> {
        let mut sql = String::from(
            r#"
            SELECT d.*, bm25(documents_fts) AS fts_rank
            FROM documents_fts
            JOIN documents d ON d.rowid = documents_fts.rowid
            WHERE documents_fts MATCH ?
            "#,
        );
        if source.is_some() {
            sql.push_str(" AND d.source_id = ?");
        }
        if mode.is_some() {
            sql.push_str(" AND d.dev_mode = ?");
        }
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query(&sql).bind(match_expr);
        if let Some(s) = source {
            query = query.bind(s);
        }
        if let Some(m) = mode {
            query = query.bind(m.as_str());
        }
        let rows = query.bind(cap as i64).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|r| {
                let rank: f64 = r.try_get("fts_rank").unwrap_or(0.0);
                Ok((row_to_document(r)?, rank.abs()))
            })
            .collect()
    }

    /// Per-token double-LIKE fallback / 逐词 LIKE 回退查询
    pub async fn like_search(
        &self,
        tokens: &[String],
        source: Option<&str>,
        mode: Option<DevMode>,
        cap: usize,
    ) -> Result<Vec<(Document, f64)>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = String::from("SELECT * FROM documents WHERE 1=1");
        for _ in tokens {
            sql.push_str(" AND (content LIKE ? OR title LIKE ?)");
        }
        if source.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        if mode.is_some() {
            sql.push_str(" AND dev_mode = ?");
        }
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query(&sql);
        for token in tokens {
            let pattern = format!("%{}%", token);
            query = query.bind(pattern.clone()).bind(pattern);
        }
        if let Some(s) = source {
            query = query.bind(s);
        }
        if let Some(m) = mode {
            query = query.bind(m.as_str());
        }
        let rows = query.bind(cap as i64).fetch_all(&self.pool).await?;
        rows.iter().map(|r| Ok((row_to_document(r)?, 0.0))).collect()
    }

    /// Prefix/substring match on api_path / 接口路径模糊匹配
    pub async fn find_by_api_path(
        &self,
        api_path: &str,
        source: Option<&str>,
        mode: Option<DevMode>,
        cap: usize,
    ) -> Result<Vec<Document>> {
        let mut sql = String::from("SELECT * FROM documents WHERE api_path LIKE ?");
        if source.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        if mode.is_some() {
            sql.push_str(" AND dev_mode = ?");
        }
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query(&sql).bind(format!("%{}%", api_path));
        if let Some(s) = source {
            query = query.bind(s);
        }
        if let Some(m) = mode {
            query = query.bind(m.as_str());
        }
        let rows = query.bind(cap as i64).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    /// Documents whose content mentions a literal code / 正文包含错误码的文档
    pub async fn find_docs_containing(
        &self,
        literal: &str,
        source: Option<&str>,
        mode: Option<DevMode>,
        cap: usize,
    ) -> Result<Vec<Document>> {
        let mut sql = String::from("SELECT * FROM documents WHERE content LIKE ?");
        if source.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        if mode.is_some() {
            sql.push_str(" AND dev_mode = ?");
        }
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query(&sql).bind(format!("%{}%", literal));
        if let Some(s) = source {
            query = query.bind(s);
        }
        if let Some(m) = mode {
            query = query.bind(m.as_str());
        }
        let rows = query.bind(cap as i64).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    // ---------- sources ----------

    pub async fn upsert_source(
        &self,
        id: &str,
        name: &str,
        base_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, base_url) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                base_url = COALESCE(excluded.base_url, sources.base_url)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(base_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_source(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        id: &str,
        name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = CASE WHEN excluded.name != excluded.id THEN excluded.name ELSE sources.name END
            "#,
        )
        .bind(id)
        .bind(name.unwrap_or(id))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn refresh_doc_count(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        source_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sources SET doc_count = (SELECT COUNT(*) FROM documents WHERE source_id = ?) WHERE id = ?",
        )
        .bind(source_id)
        .bind(source_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_source(&r)))
    }

    pub async fn get_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_source).collect())
    }

    /// Save the opaque per-source config blob / 保存来源配置
    pub async fn set_source_config(&self, id: &str, config: &str) -> Result<()> {
        sqlx::query("UPDATE sources SET config = ? WHERE id = ?")
            .bind(config)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_source_sync_time(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE sources SET last_synced = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------- error codes ----------

    /// Replace error codes for a source in one transaction / 批量写入错误码
    pub async fn upsert_error_codes(&self, source_id: &str, codes: &[ErrorCode]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for code in codes {
            sqlx::query(
                r#"
                INSERT INTO error_codes (source_id, code, message, description, doc_id)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(source_id, code) DO UPDATE SET
                    message = excluded.message,
                    description = excluded.description,
                    doc_id = excluded.doc_id
                "#,
            )
            .bind(source_id)
            .bind(&code.code)
            .bind(&code.message)
            .bind(&code.description)
            .bind(&code.doc_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(codes.len())
    }

    /// Exact-match lookup on the code column / 错误码精确查询
    pub async fn find_error_code(
        &self,
        code: &str,
        source: Option<&str>,
    ) -> Result<Option<ErrorCode>> {
        let mut sql = String::from("SELECT * FROM error_codes WHERE code = ?");
        if source.is_some() {
            sql.push_str(" AND source_id = ?");
        }
        sql.push_str(" LIMIT 1");
        let mut query = sqlx::query(&sql).bind(code);
        if let Some(s) = source {
            query = query.bind(s);
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| ErrorCode {
            source_id: r.get("source_id"),
            code: r.get("code"),
            message: r.get("message"),
            description: r.get("description"),
            doc_id: r.get("doc_id"),
        }))
    }

    // ---------- sync / search logs ----------

    pub async fn create_sync_log(&self, source_id: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO sync_logs (source_id, status, started_at) VALUES (?, 'running', ?)",
        )
        .bind(source_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_sync_log(
        &self,
        id: i64,
        status: SyncStatus,
        counts: &SyncCounts,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_logs SET status = ?, finished_at = ?,
                created = ?, updated = ?, unchanged = ?, deleted = ?, error = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(counts.created)
        .bind(counts.updated)
        .bind(counts.unchanged)
        .bind(counts.deleted)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append one search log row / 记录一次搜索
    pub async fn log_search(
        &self,
        query: &str,
        source: Option<&str>,
        result_count: i64,
        top_score: Option<f64>,
        took_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_logs (query, source, result_count, top_score, took_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(query)
        .bind(source)
        .bind(result_count)
        .bind(top_score)
        .bind(took_ms)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let doc_type_str: String = row.get("doc_type");
    let doc_type = DocType::parse(&doc_type_str)
        .ok_or_else(|| anyhow!("unknown doc_type in database: {}", doc_type_str))?;
    let dev_mode: Option<String> = row.get("dev_mode");
    let synced_at = parse_ts(Some(row.get::<String, _>("synced_at")))
        .ok_or_else(|| anyhow!("invalid synced_at timestamp"))?;

    Ok(Document {
        id: row.get("id"),
        source_id: row.get("source_id"),
        path: row.get("path"),
        path_depth: row.get("path_depth"),
        title: row.get("title"),
        api_path: row.get("api_path"),
        dev_mode: dev_mode.as_deref().and_then(DevMode::parse),
        doc_type,
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        prev_content_hash: row.get("prev_content_hash"),
        source_url: row.get("source_url"),
        metadata: row.get("metadata"),
        tokenized_title: row.get("tokenized_title"),
        tokenized_content: row.get("tokenized_content"),
        last_updated: parse_ts(row.get("last_updated")),
        synced_at,
    })
}

fn row_to_source(row: &SqliteRow) -> Source {
    Source {
        id: row.get("id"),
        name: row.get("name"),
        base_url: row.get("base_url"),
        doc_count: row.get("doc_count"),
        last_synced: parse_ts(row.get("last_synced")),
        config: row.get("config"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (DocStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("test.db")).await.unwrap();
        (store, dir)
    }

    fn input(path: &str, title: &str, content: &str) -> UpsertInput {
        UpsertInput {
            source_id: "wecom".to_string(),
            path: path.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            api_path: None,
            dev_mode: None,
            doc_type: None,
            source_url: None,
            metadata: None,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_created_then_unchanged() {
        let (store, _dir) = test_store().await;
        let doc = input("api/message/send", "发送应用消息", "调用该接口发送消息");

        let (id1, action1) = store.upsert_document(&doc).await.unwrap();
        assert_eq!(action1, UpsertAction::Created);

        let (id2, action2) = store.upsert_document(&doc).await.unwrap();
        assert_eq!(action2, UpsertAction::Unchanged);
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_updated_rolls_prev_hash() {
        let (store, _dir) = test_store().await;
        let mut doc = input("api/message/send", "发送应用消息", "内容一");
        let (id, _) = store.upsert_document(&doc).await.unwrap();
        let first_hash = content_hash("内容一");

        doc.content = "内容二".to_string();
        let (_, action) = store.upsert_document(&doc).await.unwrap();
        assert_eq!(action, UpsertAction::Updated);

        let stored = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(stored.prev_content_hash.as_deref(), Some(first_hash.as_str()));
        assert_eq!(stored.content_hash, content_hash("内容二"));
    }

    #[tokio::test]
    async fn test_bulk_upsert_atomic_on_failure() {
        let (store, _dir) = test_store().await;
        let inputs = vec![
            input("a/one", "文档一", "内容"),
            // 空标题触发整批回滚
            input("a/two", "", "内容"),
        ];
        let result = store.bulk_upsert("wecom", Some("企业微信"), &inputs).await;
        assert!(result.is_err());
        assert_eq!(store.count_documents(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_upsert_counts_and_doc_count() {
        let (store, _dir) = test_store().await;
        let inputs = vec![
            input("a/one", "文档一", "内容一"),
            input("a/two", "文档二", "内容二"),
        ];
        let result = store.bulk_upsert("wecom", Some("企业微信"), &inputs).await.unwrap();
        assert_eq!(result.created, 2);

        let source = store.get_source("wecom").await.unwrap().unwrap();
        assert_eq!(source.doc_count, 2);
        assert_eq!(source.name, "企业微信");
    }

    #[tokio::test]
    async fn test_delete_then_reinsert_is_created() {
        let (store, _dir) = test_store().await;
        let doc = input("a/one", "文档一", "内容");
        let (id, _) = store.upsert_document(&doc).await.unwrap();

        assert!(store.delete_document(&id).await.unwrap());
        assert!(store.get_document(&id).await.unwrap().is_none());

        let (id2, action) = store.upsert_document(&doc).await.unwrap();
        assert_eq!(id, id2);
        assert_eq!(action, UpsertAction::Created);
    }

    #[tokio::test]
    async fn test_fts_parity_after_reindex() {
        let (store, _dir) = test_store().await;
        for i in 0..5 {
            let doc = input(&format!("a/doc{}", i), "接口文档", "发送消息接口说明");
            store.upsert_document(&doc).await.unwrap();
        }
        let reindexed = store.reindex().await.unwrap();
        assert_eq!(reindexed, 5);

        let hits = store.fts_search("\"消息\"", None, None, 200).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_fts_row_follows_update() {
        let (store, _dir) = test_store().await;
        let mut doc = input("a/one", "通讯录管理", "旧内容没有关键词");
        store.upsert_document(&doc).await.unwrap();

        doc.content = "新内容提到多维表格".to_string();
        store.upsert_document(&doc).await.unwrap();

        let hits = store.fts_search("\"多维表格\"", None, None, 200).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_dev_mode_rejected_outside_wecom() {
        let (store, _dir) = test_store().await;
        let mut doc = input("a/one", "文档", "内容");
        doc.source_id = "feishu".to_string();
        doc.dev_mode = Some(DevMode::Internal);
        assert!(store.upsert_document(&doc).await.is_err());
    }

    #[tokio::test]
    async fn test_error_code_conflict_replaces() {
        let (store, _dir) = test_store().await;
        let code = ErrorCode {
            source_id: "wecom".to_string(),
            code: "60011".to_string(),
            message: "no privilege".to_string(),
            description: None,
            doc_id: None,
        };
        store.upsert_error_codes("wecom", &[code.clone()]).await.unwrap();

        let mut updated = code.clone();
        updated.message = "无权限访问".to_string();
        store.upsert_error_codes("wecom", &[updated]).await.unwrap();

        let found = store.find_error_code("60011", None).await.unwrap().unwrap();
        assert_eq!(found.message, "无权限访问");
    }

    #[tokio::test]
    async fn test_sync_log_lifecycle() {
        let (store, _dir) = test_store().await;
        let id = store.create_sync_log("wecom").await.unwrap();
        let counts = SyncCounts {
            created: 3,
            updated: 1,
            ..Default::default()
        };
        store
            .update_sync_log(id, SyncStatus::Success, &counts, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_categories_and_recent() {
        let (store, _dir) = test_store().await;
        store.upsert_document(&input("api/a", "甲", "一")).await.unwrap();
        store.upsert_document(&input("api/b", "乙", "二")).await.unwrap();
        store.upsert_document(&input("guide/c", "丙", "三")).await.unwrap();

        let cats = store.list_categories(Some("wecom")).await.unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].category, "api");
        assert_eq!(cats[0].doc_count, 2);

        let recent = store.get_recent_documents(None, 7, 20).await.unwrap();
        assert_eq!(recent.len(), 3);
    }
}
