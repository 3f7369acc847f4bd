//! Database schema / 数据库表结构
//!
//! Applied idempotently on startup. The FTS index is an external-content
//! FTS5 table over the pre-tokenized columns; triggers keep it in lockstep
//! with `documents` so every row has exactly one FTS row with the same rowid.

/// DDL statements executed in order / 按顺序执行的建表语句
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        base_url TEXT,
        doc_count INTEGER NOT NULL DEFAULT 0,
        last_synced TEXT,
        config TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES sources(id),
        path TEXT NOT NULL,
        path_depth INTEGER NOT NULL,
        title TEXT NOT NULL,
        api_path TEXT,
        dev_mode TEXT,
        doc_type TEXT NOT NULL DEFAULT 'api_reference',
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        prev_content_hash TEXT,
        source_url TEXT,
        metadata TEXT,
        tokenized_title TEXT NOT NULL,
        tokenized_content TEXT NOT NULL,
        last_updated TEXT,
        synced_at TEXT NOT NULL,
        UNIQUE(source_id, path)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_documents_api_path ON documents(api_path)",
    "CREATE INDEX IF NOT EXISTS idx_documents_synced_at ON documents(synced_at)",
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
        tokenized_title,
        tokenized_content,
        content='documents',
        content_rowid='rowid'
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
        INSERT INTO documents_fts(rowid, tokenized_title, tokenized_content)
        VALUES (NEW.rowid, NEW.tokenized_title, NEW.tokenized_content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
        INSERT INTO documents_fts(documents_fts, rowid, tokenized_title, tokenized_content)
        VALUES ('delete', OLD.rowid, OLD.tokenized_title, OLD.tokenized_content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
        INSERT INTO documents_fts(documents_fts, rowid, tokenized_title, tokenized_content)
        VALUES ('delete', OLD.rowid, OLD.tokenized_title, OLD.tokenized_content);
        INSERT INTO documents_fts(rowid, tokenized_title, tokenized_content)
        VALUES (NEW.rowid, NEW.tokenized_title, NEW.tokenized_content);
    END
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS error_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL,
        code TEXT NOT NULL,
        message TEXT NOT NULL,
        description TEXT,
        doc_id TEXT,
        UNIQUE(source_id, code)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_error_codes_code ON error_codes(code)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        created INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        unchanged INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        source TEXT,
        result_count INTEGER NOT NULL,
        top_score REAL,
        took_ms INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];
