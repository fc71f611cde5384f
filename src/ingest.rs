//! Ingestion pipeline orchestration.
//!
//! Drives the whole corpus through source → normalize → store:
//!
//! 1. Fetch and normalize the chapter index; write every chapter row in one
//!    transaction.
//! 2. For each chapter 1..=114 in order: fetch the canonical text (required),
//!    the annotation and translation (optional; failures degrade to empty
//!    fields), normalize, and replace the chapter's verses in one
//!    transaction that also refreshes the chapter's index entries. A chapter
//!    with no usable index entry fails the same way a canonical fetch does.
//!
//! Only chapters are atomic. A run that stops partway leaves earlier
//! chapters committed. Every fetch races the cancellation token, so a
//! cancelled run stops at the next network boundary.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{IngestError, NormalizeError, SourceError};
use crate::models::{IngestOutcome, IngestRun, CHAPTER_COUNT};
use crate::normalize::{normalize_chapter_index, normalize_chapter_verses};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, ProgressMode};
use crate::source::{HttpSourceClient, SourceClient, SourceDocument};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Translation language code.
    pub language: String,
    /// Skip chapters whose canonical text cannot be fetched instead of
    /// aborting the run.
    pub keep_going: bool,
    pub fetch_annotation: bool,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            language: config.source.language.clone(),
            keep_going: false,
            fetch_annotation: config.source.fetch_annotation,
        }
    }
}

/// A chapter left out of a `keep_going` run.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedChapter {
    pub chapter: u32,
    pub reason: String,
}

/// What a run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Chapter rows written from the index.
    pub chapters_indexed: u32,
    /// Chapters whose verses were committed.
    pub chapters_written: u32,
    pub verses_written: u64,
    pub skipped_chapters: Vec<SkippedChapter>,
    /// Chapters whose annotation document could not be fetched or decoded.
    pub degraded_annotation: u32,
    /// Chapters whose translation document could not be fetched or decoded.
    pub degraded_translation: u32,
}

pub struct Ingestor {
    client: Arc<dyn SourceClient>,
    store: Store,
    audio_base: String,
    progress: Box<dyn IngestProgressReporter>,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(client: Arc<dyn SourceClient>, store: Store, audio_base: impl Into<String>) -> Self {
        Self {
            client,
            store,
            audio_base: audio_base.into(),
            progress: Box::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ingest the whole corpus and record the run's outcome.
    pub async fn ingest_all(&self, opts: &IngestOptions) -> Result<IngestReport, IngestError> {
        let started_at = Utc::now();
        let mut report = IngestReport::default();
        let result = self.run(opts, &mut report).await;

        let outcome = match &result {
            Ok(()) if report.skipped_chapters.is_empty() => IngestOutcome::Completed,
            Ok(()) => IngestOutcome::Partial,
            Err(IngestError::Cancelled) => IngestOutcome::Cancelled,
            Err(_) => IngestOutcome::Failed,
        };
        let run = IngestRun {
            language: opts.language.clone(),
            started_at,
            finished_at: Utc::now(),
            chapters_written: report.chapters_written,
            verses_written: report.verses_written as u32,
            outcome,
        };
        if let Err(e) = self.store.record_ingest_run(&run).await {
            tracing::warn!(error = %e, "failed to record ingest run");
        }

        match &result {
            Ok(()) => tracing::info!(
                chapters = report.chapters_written,
                verses = report.verses_written,
                skipped = report.skipped_chapters.len(),
                "ingestion finished"
            ),
            Err(e) => tracing::error!(
                error = %e,
                chapters = report.chapters_written,
                "ingestion stopped"
            ),
        }

        result.map(|()| report)
    }

    async fn run(&self, opts: &IngestOptions, report: &mut IngestReport) -> Result<(), IngestError> {
        let index = self
            .fetch(&SourceDocument::ChapterIndex)
            .await?
            .map_err(IngestError::Index)?;
        let chapters = normalize_chapter_index(&index).map_err(IngestError::IndexShape)?;
        if chapters.is_empty() {
            return Err(IngestError::EmptyIndex);
        }
        if chapters.len() as u32 != CHAPTER_COUNT {
            tracing::warn!(
                found = chapters.len(),
                expected = CHAPTER_COUNT,
                "chapter index is incomplete"
            );
        }

        self.store.upsert_chapters(&chapters).await?;
        let indexed: BTreeSet<u32> = chapters.iter().map(|c| c.number).collect();
        report.chapters_indexed = chapters.len() as u32;
        self.progress.report(IngestProgressEvent::Indexed {
            chapters: report.chapters_indexed,
        });

        for n in 1..=CHAPTER_COUNT {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            // Verses are only written under a chapter row.
            let result = if indexed.contains(&n) {
                self.ingest_chapter(n, opts, report).await
            } else {
                Err(IngestError::NotIndexed { chapter: n })
            };

            match result {
                Ok(written) => {
                    report.chapters_written += 1;
                    report.verses_written += written;
                    tracing::debug!(chapter = n, verses = written, "chapter committed");
                    self.progress.report(IngestProgressEvent::Chapter {
                        n,
                        total: CHAPTER_COUNT,
                        verses: written,
                    });
                }
                Err(
                    e @ (IngestError::Source { .. }
                    | IngestError::Normalize { .. }
                    | IngestError::NotIndexed { .. }),
                ) if opts.keep_going =>
                {
                    tracing::warn!(chapter = n, error = %e, "skipping chapter");
                    let reason = e.to_string();
                    self.progress.report(IngestProgressEvent::Skipped {
                        n,
                        total: CHAPTER_COUNT,
                        reason: reason.clone(),
                    });
                    report.skipped_chapters.push(SkippedChapter { chapter: n, reason });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn ingest_chapter(
        &self,
        chapter: u32,
        opts: &IngestOptions,
        report: &mut IngestReport,
    ) -> Result<u64, IngestError> {
        let canonical = self
            .fetch(&SourceDocument::Canonical(chapter))
            .await?
            .map_err(|source| IngestError::Source { chapter, source })?;

        let annotation = if opts.fetch_annotation {
            let doc = self.fetch(&SourceDocument::Annotation(chapter)).await?;
            self.optional(chapter, "annotation", doc, &mut report.degraded_annotation)
        } else {
            None
        };

        let translation_doc = SourceDocument::Translation {
            language: opts.language.clone(),
            chapter,
        };
        let doc = self.fetch(&translation_doc).await?;
        let translation = self.optional(chapter, "translation", doc, &mut report.degraded_translation);

        let verses = normalize_chapter_verses(
            chapter,
            &canonical,
            annotation.as_ref(),
            translation.as_ref(),
            &self.audio_base,
        )
        .map_err(|source| IngestError::Normalize { chapter, source })?;

        if verses.is_empty() {
            return Err(IngestError::Normalize {
                chapter,
                source: NormalizeError::Malformed {
                    reason: "canonical document contains no verses".to_string(),
                },
            });
        }

        Ok(self.store.upsert_chapter_verses(chapter, &verses).await?)
    }

    /// Fetch a document unless the run is cancelled first. The outer error is
    /// cancellation; the inner result is the fetch itself.
    async fn fetch(&self, doc: &SourceDocument) -> Result<Result<Value, SourceError>, IngestError> {
        let path = doc.path();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            result = self.client.fetch(&path) => Ok(result),
        }
    }

    fn optional(
        &self,
        chapter: u32,
        kind: &'static str,
        result: Result<Value, SourceError>,
        degraded: &mut u32,
    ) -> Option<Value> {
        match result {
            Ok(doc) => Some(doc),
            Err(e) => {
                *degraded += 1;
                tracing::warn!(chapter, document = kind, error = %e, "optional document unavailable");
                None
            }
        }
    }
}

/// `quran ingest`: run a full ingestion against the configured source.
pub async fn run_ingest(
    config: &Config,
    language: Option<String>,
    keep_going: bool,
    progress: ProgressMode,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Store::open(config).await?;

    let client = HttpSourceClient::from_config(&config.source)?;
    let ingestor = Ingestor::new(Arc::new(client), store.clone(), config.source.base_url.clone())
        .with_progress(progress.reporter())
        .with_cancellation(cancel);

    let mut opts = IngestOptions::from_config(config);
    if let Some(lang) = language {
        opts.language = lang;
    }
    opts.keep_going = keep_going;

    let result = ingestor.ingest_all(&opts).await;
    store.close().await;
    let report = result?;

    println!("ingest ({})", opts.language);
    println!("  chapters indexed: {}", report.chapters_indexed);
    println!("  chapters written: {}", report.chapters_written);
    println!("  verses written: {}", report.verses_written);
    if report.degraded_annotation > 0 {
        println!("  annotation unavailable: {} chapters", report.degraded_annotation);
    }
    if report.degraded_translation > 0 {
        println!("  translation unavailable: {} chapters", report.degraded_translation);
    }
    if report.skipped_chapters.is_empty() {
        println!("ok");
    } else {
        println!("  skipped chapters:");
        for s in &report.skipped_chapters {
            println!("    {:>3}  {}", s.chapter, s.reason);
        }
        println!("partial");
    }

    Ok(())
}
