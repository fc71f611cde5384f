//! Search and lookup over the store.
//!
//! [`QueryService`] is the single entry point used by both the CLI and the
//! HTTP server. It validates chapter numbers, clamps limits, and turns free
//! text into an FTS5 expression that cannot fail to parse.
//!
//! The query length bound is a separate check ([`QueryService::check_query_len`])
//! applied by the network-facing and CLI callers; [`QueryService::search`]
//! itself accepts any length.

use crate::config::RetrievalConfig;
use crate::error::{QueryError, QueryResult};
use crate::fold::fold;
use crate::models::{is_valid_chapter, ChapterMeta, Hit, Verse, CHAPTER_COUNT};
use crate::store::{SnippetStyle, Store};

#[derive(Clone)]
pub struct QueryService {
    store: Store,
    retrieval: RetrievalConfig,
    style: SnippetStyle,
}

impl QueryService {
    pub fn new(store: Store, retrieval: RetrievalConfig) -> Self {
        let style = SnippetStyle::from_config(&retrieval);
        Self {
            store,
            retrieval,
            style,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reject queries longer than `retrieval.max_query_chars` characters.
    pub fn check_query_len(&self, query: &str) -> QueryResult<()> {
        check_query_len(&self.retrieval, query)
    }

    /// Clamp a caller-supplied limit into `[1, max_limit]`.
    pub fn effective_limit(&self, limit: Option<u32>) -> u32 {
        limit
            .unwrap_or(self.retrieval.default_limit)
            .clamp(1, self.retrieval.max_limit)
    }

    /// Full-text search. A query with no searchable tokens matches every
    /// verse in corpus order.
    pub async fn search(&self, query: &str, limit: Option<u32>) -> QueryResult<Vec<Hit>> {
        let limit = self.effective_limit(limit);
        let hits = match match_expression(query) {
            Some(expr) => self.store.search(&expr, limit, &self.style).await?,
            None => self.store.search_all(limit).await?,
        };
        Ok(hits)
    }

    /// Verses of one chapter in order. The chapter must have been ingested.
    pub async fn get_chapter(&self, number: u32) -> QueryResult<Vec<Verse>> {
        validate_chapter(number)?;
        if self.store.get_chapter_meta(number).await?.is_none() {
            return Err(QueryError::NotFound(format!(
                "chapter {} has not been ingested",
                number
            )));
        }
        Ok(self.store.get_verses(number).await?)
    }

    pub async fn list_chapters(&self) -> QueryResult<Vec<ChapterMeta>> {
        Ok(self.store.list_chapters().await?)
    }
}

/// Length bound shared by the CLI and HTTP callers, usable before a store
/// is open. Counted in characters.
pub fn check_query_len(retrieval: &RetrievalConfig, query: &str) -> QueryResult<()> {
    let len = query.chars().count();
    if len > retrieval.max_query_chars {
        return Err(QueryError::InvalidArgument(format!(
            "query too long: {} characters (max {})",
            len, retrieval.max_query_chars
        )));
    }
    Ok(())
}

/// Reject chapter numbers outside `1..=114`.
pub fn validate_chapter(number: u32) -> QueryResult<()> {
    if !is_valid_chapter(number) {
        return Err(QueryError::InvalidArgument(format!(
            "chapter must be between 1 and {}, got {}",
            CHAPTER_COUNT, number
        )));
    }
    Ok(())
}

/// Parse a chapter number from untrusted text (path segment, CLI argument).
pub fn parse_chapter(raw: &str) -> QueryResult<u32> {
    let number = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| QueryError::InvalidArgument(format!("invalid chapter number: '{}'", raw)))?;
    validate_chapter(number)?;
    Ok(number)
}

/// Build an FTS5 MATCH expression from free text.
///
/// The query is folded the same way indexed text is. Each
/// whitespace-separated token that contains at least one alphanumeric
/// character then becomes a quoted phrase; phrases are implicitly ANDed.
/// Returns `None` when nothing searchable remains.
pub fn match_expression(query: &str) -> Option<String> {
    let phrases: Vec<String> = fold(query)
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" "))
    }
}
