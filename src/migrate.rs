use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::StoreResult;

pub async fn run_migrations(config: &Config) -> StoreResult<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Full-text index over folded canonical text and translation. Combining
/// marks (`Mn`) count as token characters so a mark left over after folding
/// never splits a word.
pub(crate) const CREATE_VERSES_FTS: &str = r#"
    CREATE VIRTUAL TABLE verses_fts USING fts5(
        text,
        translation,
        tokenize = "unicode61 remove_diacritics 2 categories 'L* N* Co Mn'"
    )
"#;

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            number INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            name_latin TEXT,
            revelation TEXT,
            verse_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `id` is the FTS rowid. It changes whenever a chapter is rewritten.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verses (
            id INTEGER PRIMARY KEY,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            text TEXT NOT NULL,
            annotation TEXT NOT NULL DEFAULT '',
            translation TEXT NOT NULL DEFAULT '',
            audio_url TEXT NOT NULL,
            UNIQUE(chapter, verse)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            language TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            chapters_written INTEGER NOT NULL,
            verses_written INTEGER NOT NULL,
            outcome TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='verses_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(CREATE_VERSES_FTS).execute(pool).await?;
    }

    Ok(())
}
