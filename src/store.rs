//! Relational persistence for chapters and verses, plus the derived FTS5
//! index over verse text.
//!
//! The `verses_fts` table is keyed on `verses.id`. Every write path that
//! touches verse text refreshes the affected index rows inside the same
//! transaction, so a committed verse batch is always searchable and the
//! index can always be rebuilt from `verses` alone. Canonical text is indexed
//! folded (see [`crate::fold`]), so snippets over it come back unvocalized;
//! the stored verse keeps its marks.

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::error::StoreResult;
use crate::fold::fold;
use crate::migrate::{apply_schema, CREATE_VERSES_FTS};
use crate::models::{
    ChapterMeta, ChapterMismatch, ConsistencyReport, Hit, IngestOutcome, IngestRun, StoreCounts,
    Verse,
};

/// Snippet rendering for full-text hits.
#[derive(Debug, Clone)]
pub struct SnippetStyle {
    pub start: String,
    pub end: String,
    pub ellipsis: String,
    /// Maximum tokens in the excerpt (FTS5 caps this at 64).
    pub tokens: u32,
}

impl SnippetStyle {
    pub fn from_config(retrieval: &RetrievalConfig) -> Self {
        Self {
            start: retrieval.highlight_start.clone(),
            end: retrieval.highlight_end.clone(),
            ellipsis: retrieval.ellipsis.clone(),
            tokens: retrieval.snippet_tokens,
        }
    }
}

impl Default for SnippetStyle {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Store service object. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> StoreResult<Self> {
        let pool = db::connect(config).await?;
        apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============ Writes ============

    /// Insert or replace chapter metadata. All-or-nothing.
    pub async fn upsert_chapters(&self, chapters: &[ChapterMeta]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for c in chapters {
            sqlx::query(
                r#"
                INSERT INTO chapters (number, name, name_latin, revelation, verse_count)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(number) DO UPDATE SET
                    name = excluded.name,
                    name_latin = excluded.name_latin,
                    revelation = excluded.revelation,
                    verse_count = excluded.verse_count
                "#,
            )
            .bind(c.number as i64)
            .bind(&c.name)
            .bind(&c.name_latin)
            .bind(&c.revelation)
            .bind(c.verse_count as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace every verse of `chapter` with `verses` and refresh the
    /// chapter's index entries. All-or-nothing.
    ///
    /// Rows outside `chapter` in `verses` are ignored. Verse numbers must be
    /// unique within the batch.
    pub async fn upsert_chapter_verses(&self, chapter: u32, verses: &[Verse]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verses_fts WHERE rowid IN (SELECT id FROM verses WHERE chapter = ?)")
            .bind(chapter as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM verses WHERE chapter = ?")
            .bind(chapter as i64)
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for v in verses.iter().filter(|v| v.chapter == chapter) {
            let id = sqlx::query(
                r#"
                INSERT INTO verses (chapter, verse, text, annotation, translation, audio_url)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(v.chapter as i64)
            .bind(v.verse as i64)
            .bind(&v.text)
            .bind(&v.annotation)
            .bind(&v.translation)
            .bind(&v.audio_url)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            index_verse(&mut tx, id, &v.text, &v.translation).await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Drop and re-derive the whole full-text index from the verse table.
    /// The index table is recreated, so an older tokenizer definition is
    /// replaced too. Returns the number of indexed verses.
    pub async fn rebuild_index(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS verses_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_VERSES_FTS).execute(&mut *tx).await?;

        let rows = sqlx::query("SELECT id, text, translation FROM verses ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;

        let mut indexed = 0u64;
        for row in &rows {
            let text: String = row.get("text");
            let translation: String = row.get("translation");
            index_verse(&mut tx, row.get("id"), &text, &translation).await?;
            indexed += 1;
        }

        tx.commit().await?;
        Ok(indexed)
    }

    pub async fn record_ingest_run(&self, run: &IngestRun) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_runs (language, started_at, finished_at, chapters_written, verses_written, outcome)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.language)
        .bind(run.started_at.timestamp())
        .bind(run.finished_at.timestamp())
        .bind(run.chapters_written as i64)
        .bind(run.verses_written as i64)
        .bind(run.outcome.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============ Reads ============

    pub async fn list_chapters(&self) -> StoreResult<Vec<ChapterMeta>> {
        let rows = sqlx::query(
            "SELECT number, name, name_latin, revelation, verse_count FROM chapters ORDER BY number",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chapter_from_row).collect())
    }

    pub async fn get_chapter_meta(&self, number: u32) -> StoreResult<Option<ChapterMeta>> {
        let row = sqlx::query(
            "SELECT number, name, name_latin, revelation, verse_count FROM chapters WHERE number = ?",
        )
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chapter_from_row))
    }

    pub async fn get_verses(&self, chapter: u32) -> StoreResult<Vec<Verse>> {
        let rows = sqlx::query(
            r#"
            SELECT chapter, verse, text, annotation, translation, audio_url
            FROM verses
            WHERE chapter = ?
            ORDER BY verse
            "#,
        )
        .bind(chapter as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Verse {
                chapter: row.get::<i64, _>("chapter") as u32,
                verse: row.get::<i64, _>("verse") as u32,
                text: row.get("text"),
                annotation: row.get("annotation"),
                translation: row.get("translation"),
                audio_url: row.get("audio_url"),
            })
            .collect())
    }

    /// Full-text query. `match_expr` must be a well-formed FTS5 expression.
    /// Hits are ordered by BM25 relevance, ties broken by (chapter, verse).
    pub async fn search(
        &self,
        match_expr: &str,
        limit: u32,
        style: &SnippetStyle,
    ) -> StoreResult<Vec<Hit>> {
        // Column -1 lets FTS5 pick whichever of text/translation matched.
        let rows = sqlx::query(
            r#"
            SELECT v.chapter AS chapter,
                   v.verse AS verse,
                   snippet(verses_fts, -1, ?, ?, ?, ?) AS snippet
            FROM verses_fts
            JOIN verses v ON v.id = verses_fts.rowid
            WHERE verses_fts MATCH ?
            ORDER BY bm25(verses_fts), v.chapter, v.verse
            LIMIT ?
            "#,
        )
        .bind(&style.start)
        .bind(&style.end)
        .bind(&style.ellipsis)
        .bind(style.tokens as i64)
        .bind(match_expr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Hit {
                chapter: row.get::<i64, _>("chapter") as u32,
                verse: row.get::<i64, _>("verse") as u32,
                snippet: row
                    .get::<Option<String>, _>("snippet")
                    .filter(|s| !s.is_empty()),
            })
            .collect())
    }

    /// Every verse in corpus order, capped at `limit`. No snippet.
    pub async fn search_all(&self, limit: u32) -> StoreResult<Vec<Hit>> {
        let rows = sqlx::query("SELECT chapter, verse FROM verses ORDER BY chapter, verse LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Hit {
                chapter: row.get::<i64, _>("chapter") as u32,
                verse: row.get::<i64, _>("verse") as u32,
                snippet: None,
            })
            .collect())
    }

    /// Compare each chapter's stored verse count with its declared count.
    pub async fn consistency_report(&self) -> StoreResult<ConsistencyReport> {
        let rows = sqlx::query(
            r#"
            SELECT c.number AS number, c.verse_count AS declared, COUNT(v.id) AS actual
            FROM chapters c
            LEFT JOIN verses v ON v.chapter = c.number
            GROUP BY c.number
            ORDER BY c.number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let verse_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verses")
            .fetch_one(&self.pool)
            .await?;

        let mut mismatches = Vec::new();
        for row in &rows {
            let declared = row.get::<i64, _>("declared") as u32;
            let actual = row.get::<i64, _>("actual") as u32;
            if declared != actual {
                mismatches.push(ChapterMismatch {
                    chapter: row.get::<i64, _>("number") as u32,
                    declared,
                    actual,
                });
            }
        }

        Ok(ConsistencyReport {
            chapter_total: rows.len() as u32,
            verse_total: verse_total as u32,
            mismatches,
        })
    }

    pub async fn counts(&self) -> StoreResult<StoreCounts> {
        let chapters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chapters")
            .fetch_one(&self.pool)
            .await?;
        let verses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verses")
            .fetch_one(&self.pool)
            .await?;
        let indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verses_fts")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            chapters: chapters as u32,
            verses: verses as u32,
            indexed: indexed as u32,
        })
    }

    pub async fn last_ingest_run(&self) -> StoreResult<Option<IngestRun>> {
        let row = sqlx::query(
            r#"
            SELECT language, started_at, finished_at, chapters_written, verses_written, outcome
            FROM ingest_runs
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let outcome: String = row.get("outcome");
            IngestRun {
                language: row.get("language"),
                started_at: timestamp(row.get("started_at")),
                finished_at: timestamp(row.get("finished_at")),
                chapters_written: row.get::<i64, _>("chapters_written") as u32,
                verses_written: row.get::<i64, _>("verses_written") as u32,
                outcome: IngestOutcome::parse(&outcome).unwrap_or(IngestOutcome::Failed),
            }
        }))
    }
}

/// Write one index row. Canonical text is indexed in folded form.
async fn index_verse(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    text: &str,
    translation: &str,
) -> StoreResult<()> {
    sqlx::query("INSERT INTO verses_fts (rowid, text, translation) VALUES (?, ?, ?)")
        .bind(id)
        .bind(fold(text))
        .bind(translation)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn chapter_from_row(row: &sqlx::sqlite::SqliteRow) -> ChapterMeta {
    ChapterMeta {
        number: row.get::<i64, _>("number") as u32,
        name: row.get("name"),
        name_latin: row.get("name_latin"),
        revelation: row.get("revelation"),
        verse_count: row.get::<i64, _>("verse_count") as u32,
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("store.sqlite"))
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        (tmp, Store::new(pool))
    }

    fn meta(number: u32, verse_count: u32) -> ChapterMeta {
        ChapterMeta {
            number,
            name: format!("chapter {}", number),
            name_latin: None,
            revelation: Some("Mecca".to_string()),
            verse_count,
        }
    }

    fn verse(chapter: u32, n: u32, text: &str, translation: &str) -> Verse {
        Verse {
            chapter,
            verse: n,
            text: text.to_string(),
            annotation: String::new(),
            translation: translation.to_string(),
            audio_url: crate::source::audio_url("http://audio.test", chapter, n),
        }
    }

    #[tokio::test]
    async fn chapter_upsert_replaces_by_number() {
        let (_tmp, store) = open().await;
        store.upsert_chapters(&[meta(2, 5), meta(1, 7)]).await.unwrap();
        let mut updated = meta(1, 7);
        updated.name_latin = Some("Al-Fatiha".to_string());
        store.upsert_chapters(&[updated.clone()]).await.unwrap();

        let chapters = store.list_chapters().await.unwrap();
        assert_eq!(chapters.iter().map(|c| c.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(chapters[0], updated);
    }

    #[tokio::test]
    async fn verse_batch_replaces_chapter_scope_and_index() {
        let (_tmp, store) = open().await;
        store.upsert_chapters(&[meta(1, 2)]).await.unwrap();

        let first = vec![verse(1, 1, "alpha", "dawn"), verse(1, 2, "beta", "noon"), verse(1, 3, "gamma", "dusk")];
        assert_eq!(store.upsert_chapter_verses(1, &first).await.unwrap(), 3);

        let second = vec![verse(1, 1, "alpha", "dawn"), verse(1, 2, "delta", "night")];
        assert_eq!(store.upsert_chapter_verses(1, &second).await.unwrap(), 2);

        let verses = store.get_verses(1).await.unwrap();
        assert_eq!(verses, second);

        let style = SnippetStyle::default();
        assert!(store.search("\"beta\"", 10, &style).await.unwrap().is_empty());
        assert!(store.search("\"gamma\"", 10, &style).await.unwrap().is_empty());
        let hits = store.search("\"night\"", 10, &style).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].chapter, hits[0].verse), (1, 2));

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.verses, 2);
        assert_eq!(counts.indexed, 2);
    }

    async fn verse_ids(store: &Store) -> Vec<i64> {
        sqlx::query_scalar("SELECT id FROM verses ORDER BY chapter, verse")
            .fetch_all(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rewrite_reassigns_ids_and_index_follows() {
        let (_tmp, store) = open().await;
        store.upsert_chapters(&[meta(1, 2), meta(2, 1)]).await.unwrap();
        let batch = vec![verse(1, 1, "alpha", "dawn"), verse(1, 2, "beta", "noon")];
        store.upsert_chapter_verses(1, &batch).await.unwrap();
        store
            .upsert_chapter_verses(2, &[verse(2, 1, "omega", "night")])
            .await
            .unwrap();
        let before = verse_ids(&store).await;

        // Chapter 2 holds the highest id, so chapter 1's new rows get fresh ids.
        store.upsert_chapter_verses(1, &batch).await.unwrap();
        let after = verse_ids(&store).await;
        assert_eq!(after.len(), 3);
        assert!(after[..2].iter().all(|id| !before.contains(id)));
        assert_eq!(after[2], before[2]);

        let aligned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM verses v JOIN verses_fts f ON f.rowid = v.id",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(aligned, 3);

        // A repeated verse number fails the batch and leaves the chapter as it was.
        let dup = vec![verse(1, 1, "gamma", "dusk"), verse(1, 1, "delta", "night")];
        assert!(store.upsert_chapter_verses(1, &dup).await.is_err());
        assert_eq!(store.get_verses(1).await.unwrap(), batch);
        assert_eq!(verse_ids(&store).await, after);
    }

    #[tokio::test]
    async fn search_orders_ties_by_chapter_then_verse() {
        let (_tmp, store) = open().await;
        store.upsert_chapters(&[meta(1, 1), meta(2, 2)]).await.unwrap();
        store
            .upsert_chapter_verses(2, &[verse(2, 2, "word", ""), verse(2, 1, "word", "")])
            .await
            .unwrap();
        store
            .upsert_chapter_verses(1, &[verse(1, 1, "word", "")])
            .await
            .unwrap();

        let hits = store
            .search("\"word\"", 10, &SnippetStyle::default())
            .await
            .unwrap();
        let keys: Vec<_> = hits.iter().map(|h| (h.chapter, h.verse)).collect();
        assert_eq!(keys, vec![(1, 1), (2, 1), (2, 2)]);
        assert_eq!(hits[0].snippet.as_deref(), Some("<b>word</b>"));
    }

    #[tokio::test]
    async fn rebuild_index_restores_dropped_entries() {
        let (_tmp, store) = open().await;
        store.upsert_chapters(&[meta(1, 1)]).await.unwrap();
        store
            .upsert_chapter_verses(1, &[verse(1, 1, "light", "")])
            .await
            .unwrap();

        sqlx::query("DELETE FROM verses_fts")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.counts().await.unwrap().indexed, 0);

        assert_eq!(store.rebuild_index().await.unwrap(), 1);
        let hits = store
            .search("\"light\"", 5, &SnippetStyle::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn ingest_runs_round_trip_latest() {
        let (_tmp, store) = open().await;
        assert!(store.last_ingest_run().await.unwrap().is_none());

        let started = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let run = IngestRun {
            language: "en".to_string(),
            started_at: started,
            finished_at: started + chrono::Duration::seconds(42),
            chapters_written: 114,
            verses_written: 6236,
            outcome: IngestOutcome::Completed,
        };
        store.record_ingest_run(&run).await.unwrap();
        let mut later = run.clone();
        later.outcome = IngestOutcome::Cancelled;
        store.record_ingest_run(&later).await.unwrap();

        assert_eq!(store.last_ingest_run().await.unwrap(), Some(later));
    }
}
