//! Core data models shared by the ingestion and query paths.
//!
//! These are the canonical shapes: whatever form a source document takes,
//! the normalizer produces these, and the store reads and writes only these.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of chapters in a complete corpus.
pub const CHAPTER_COUNT: u32 = 114;

/// Returns true if `n` names a chapter (1..=114).
pub fn is_valid_chapter(n: u32) -> bool {
    (1..=CHAPTER_COUNT).contains(&n)
}

/// Chapter metadata from the chapter index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterMeta {
    pub number: u32,
    /// Name in the canonical script.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_latin: Option<String>,
    /// Revelation place, free text (e.g. "Mecca").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revelation: Option<String>,
    /// Declared number of verses.
    pub verse_count: u32,
}

/// A single verse, keyed by (chapter, verse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verse {
    pub chapter: u32,
    pub verse: u32,
    /// Canonical-script text, trimmed and never empty.
    pub text: String,
    /// Phonetic annotation; empty when unavailable.
    pub annotation: String,
    /// Translation in the active language; empty when unavailable.
    pub translation: String,
    pub audio_url: String,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub chapter: u32,
    pub verse: u32,
    /// Highlighted excerpt; absent for wildcard hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A chapter whose stored verse count disagrees with its declared count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterMismatch {
    pub chapter: u32,
    pub declared: u32,
    pub actual: u32,
}

/// Result of the cross-table consistency check.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub chapter_total: u32,
    pub verse_total: u32,
    pub mismatches: Vec<ChapterMismatch>,
}

impl ConsistencyReport {
    /// Every stored chapter holds exactly its declared number of verses.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Consistent, and every chapter of the corpus is present.
    pub fn is_complete(&self) -> bool {
        self.is_consistent() && self.chapter_total == CHAPTER_COUNT
    }
}

/// Row counts across the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub chapters: u32,
    pub verses: u32,
    /// Entries in the full-text index; equals `verses` unless the index drifted.
    pub indexed: u32,
}

/// How an ingestion run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl IngestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Summary row written at the end of every ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRun {
    pub language: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub chapters_written: u32,
    pub verses_written: u32,
    pub outcome: IngestOutcome,
}
