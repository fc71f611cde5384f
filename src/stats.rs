//! `quran verify` and `quran reindex`: store health.
//!
//! `verify` runs the cross-table consistency check (every chapter holds
//! exactly its declared number of verses) and fails when it does not pass.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::CHAPTER_COUNT;
use crate::store::Store;

pub async fn run_verify(config: &Config) -> Result<()> {
    let store = Store::open(config).await?;
    let report = store.consistency_report().await?;
    let counts = store.counts().await?;
    let last_run = store.last_ingest_run().await?;
    store.close().await;

    println!("  Database:  {}", config.db.path.display());
    println!("  Chapters:  {} / {}", report.chapter_total, CHAPTER_COUNT);
    println!("  Verses:    {}", report.verse_total);
    println!("  Indexed:   {}", counts.indexed);
    if let Some(run) = &last_run {
        println!(
            "  Last run:  {} ({}, {} chapters, {} verses)",
            run.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.outcome.as_str(),
            run.chapters_written,
            run.verses_written
        );
    }

    if !report.mismatches.is_empty() {
        println!();
        println!("  Mismatched chapters:");
        for m in &report.mismatches {
            println!(
                "    {:>3}  declared {:>3}, stored {:>3}",
                m.chapter, m.declared, m.actual
            );
        }
    }
    if counts.indexed != counts.verses {
        println!();
        println!("  Index drift: run `quran reindex`.");
    }

    if !report.is_consistent() {
        bail!("{} chapter(s) failed verification", report.mismatches.len());
    }
    if !report.is_complete() {
        bail!(
            "corpus incomplete: {} of {} chapters present",
            report.chapter_total,
            CHAPTER_COUNT
        );
    }
    println!("ok");
    Ok(())
}

pub async fn run_reindex(config: &Config) -> Result<()> {
    let store = Store::open(config).await?;
    let indexed = store.rebuild_index().await?;
    store.close().await;

    println!("reindex");
    println!("  verses indexed: {}", indexed);
    println!("ok");
    Ok(())
}
