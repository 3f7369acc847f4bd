//! Search module / 搜索模块
//!
//! Tokenization, query routing, scoring and Markdown rendering. The store
//! controls persistence; call direction is engine → store, never back.

pub mod engine;
pub mod render;
pub mod tokenizer;

pub use engine::{classify_query, QueryKind, SearchEngine, SearchOptions, SearchOutcome};
pub use tokenizer::{init_tokenizer, tokenize_joined};
