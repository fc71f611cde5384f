//! Remote source documents.
//!
//! The corpus is published as a tree of JSON files under one base URL:
//!
//! | Document | Path |
//! |----------|------|
//! | Chapter index | `surah.json` |
//! | Canonical text | `surah/surah_<n>.json` |
//! | Annotation | `tajweed/surah_<n>.json` |
//! | Translation | `translation/<lang>/<lang>_translation_<n>.json` |
//!
//! [`SourceClient`] fetches one document and decodes it as generic JSON. It
//! knows nothing about what the documents mean; that is the normalizer's job.
//! There is no retry and no caching.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::SourceError;

/// One of the fixed set of source documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDocument {
    ChapterIndex,
    Canonical(u32),
    Annotation(u32),
    Translation { language: String, chapter: u32 },
}

impl SourceDocument {
    /// Path relative to the source base URL.
    pub fn path(&self) -> String {
        match self {
            Self::ChapterIndex => "surah.json".to_string(),
            Self::Canonical(n) => format!("surah/surah_{}.json", n),
            Self::Annotation(n) => format!("tajweed/surah_{}.json", n),
            Self::Translation { language, chapter } => format!(
                "translation/{lang}/{lang}_translation_{n}.json",
                lang = language,
                n = chapter
            ),
        }
    }
}

/// Fetches a single source document.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Value, SourceError>;
}

/// [`SourceClient`] over HTTP(S).
pub struct HttpSourceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSourceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quran-index/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, path: &str) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Network {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| SourceError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(SourceError::Remote {
                path: path.to_string(),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|source| SourceError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// Audio recitation URL for a verse. Computed, never fetched.
pub fn audio_url(base_url: &str, chapter: u32, verse: u32) -> String {
    format!(
        "{}/audio/{:03}/{:03}.mp3",
        base_url.trim_end_matches('/'),
        chapter,
        verse
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_paths() {
        assert_eq!(SourceDocument::ChapterIndex.path(), "surah.json");
        assert_eq!(SourceDocument::Canonical(2).path(), "surah/surah_2.json");
        assert_eq!(SourceDocument::Annotation(114).path(), "tajweed/surah_114.json");
        assert_eq!(
            SourceDocument::Translation {
                language: "en".to_string(),
                chapter: 36
            }
            .path(),
            "translation/en/en_translation_36.json"
        );
    }

    #[test]
    fn audio_url_zero_pads() {
        assert_eq!(
            audio_url("https://example.org/source/", 2, 7),
            "https://example.org/source/audio/002/007.mp3"
        );
        assert_eq!(
            audio_url("https://example.org/source", 114, 286),
            "https://example.org/source/audio/114/286.mp3"
        );
    }
}
