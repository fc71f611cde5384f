//! `quran chapters` and `quran read`: chapter listing and verse retrieval.

use anyhow::Result;

use crate::config::Config;
use crate::query::{parse_chapter, QueryService};
use crate::store::Store;

pub async fn run_chapters(config: &Config) -> Result<()> {
    let store = Store::open(config).await?;
    let chapters = QueryService::new(store.clone(), config.retrieval.clone())
        .list_chapters()
        .await?;
    store.close().await;

    if chapters.is_empty() {
        println!("No chapters. Run `quran ingest` first.");
        return Ok(());
    }

    println!(
        "{:>3}  {:<24} {:<24} {:<8} {:>6}",
        "#", "NAME", "LATIN", "PLACE", "VERSES"
    );
    for c in &chapters {
        println!(
            "{:>3}  {:<24} {:<24} {:<8} {:>6}",
            c.number,
            c.name,
            c.name_latin.as_deref().unwrap_or("-"),
            c.revelation.as_deref().unwrap_or("-"),
            c.verse_count
        );
    }

    Ok(())
}

/// `chapter` is taken as text so out-of-range and malformed values produce
/// the same error message as the HTTP surface.
pub async fn run_read(config: &Config, chapter: &str) -> Result<()> {
    let number = parse_chapter(chapter)?;

    let store = Store::open(config).await?;
    let service = QueryService::new(store.clone(), config.retrieval.clone());
    let meta = store.get_chapter_meta(number).await?;
    let verses = service.get_chapter(number).await;
    store.close().await;
    let verses = verses?;

    if let Some(meta) = meta {
        match &meta.name_latin {
            Some(latin) => println!("{}. {} ({})", meta.number, meta.name, latin),
            None => println!("{}. {}", meta.number, meta.name),
        }
        println!();
    }

    for v in &verses {
        println!("[{}:{}] {}", v.chapter, v.verse, v.text);
        if !v.annotation.is_empty() {
            println!("    {}", v.annotation);
        }
        if !v.translation.is_empty() {
            println!("    {}", v.translation);
        }
        println!("    {}", v.audio_url);
    }

    Ok(())
}
