//! Source document normalization.
//!
//! The corpus has been published in (at least) two incompatible shapes:
//!
//! **Keyed**: verses live in one object under generated keys, and chapter
//! index entries use zero-padded string numbers plus a `count` field:
//!
//! ```json
//! { "index": "001", "verse": { "verse_1": "...", "verse_2": "..." }, "count": 7 }
//! [ { "index": "001", "titleAr": "...", "title": "Al-Fatiha", "place": "Mecca", "count": 7 } ]
//! ```
//!
//! **Listed**: verses are an ordered list of objects carrying their own
//! number, and index entries use numeric types directly:
//!
//! ```json
//! { "number": 1, "verses": [ { "number": 1, "text": "..." } ] }
//! [ { "number": 1, "name": "...", "name_latin": "Al-Fatiha", "place": "Mecca", "number_of_ayah": 7 } ]
//! ```
//!
//! Each document (or index entry) is classified by its discriminating field,
//! decoded into the matching typed variant, and mapped onto [`ChapterMeta`] /
//! [`Verse`]. Generic JSON never leaves this module.
//!
//! Malformed records are skipped with a warning; only an unrecognizable
//! document as a whole is an error.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::NormalizeError;
use crate::models::{is_valid_chapter, ChapterMeta, Verse};
use crate::source::audio_url;

// ============ Chapter index ============

/// Index entry in the keyed shape.
#[derive(Debug, Deserialize)]
struct PaddedIndexEntry {
    index: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "titleAr")]
    title_ar: Option<String>,
    #[serde(default)]
    place: Option<String>,
    count: Number,
}

/// Index entry in the listed shape.
#[derive(Debug, Deserialize)]
struct NumberedIndexEntry {
    number: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    name_latin: Option<String>,
    #[serde(default, alias = "place")]
    revelation: Option<String>,
    #[serde(alias = "number_of_ayah", alias = "verses_count")]
    verse_count: Number,
}

#[derive(Debug)]
enum IndexEntry {
    Padded(PaddedIndexEntry),
    Numbered(NumberedIndexEntry),
}

/// A number that may be encoded as a JSON number or a (possibly
/// zero-padded) string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    fn resolve(&self) -> Option<u32> {
        match self {
            Number::Int(n) => u32::try_from(*n).ok(),
            Number::Text(s) => parse_padded(s),
        }
    }
}

/// Parse `"007"` → 7. Empty and non-numeric strings yield `None`.
fn parse_padded(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = s.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

fn classify_index_entry(entry: &Value) -> Result<IndexEntry, NormalizeError> {
    let decoded = if entry.get("index").map_or(false, Value::is_string) {
        serde_json::from_value(entry.clone()).map(IndexEntry::Padded)
    } else if entry.get("number").map_or(false, Value::is_number) {
        serde_json::from_value(entry.clone()).map(IndexEntry::Numbered)
    } else {
        return Err(NormalizeError::UnrecognizedShape {
            document: "chapter index entry",
        });
    };
    decoded.map_err(|e| NormalizeError::Malformed {
        reason: e.to_string(),
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn index_entry_to_meta(entry: IndexEntry) -> Result<ChapterMeta, NormalizeError> {
    let (number, name, name_latin, revelation, count) = match entry {
        IndexEntry::Padded(e) => {
            let number = parse_padded(&e.index)
                .ok_or(NormalizeError::MissingField { field: "index" })?;
            let latin = non_empty(e.title);
            // Older index files carry only a latin title.
            let name = non_empty(e.title_ar).or_else(|| latin.clone());
            (number, name, latin, non_empty(e.place), e.count.resolve())
        }
        IndexEntry::Numbered(e) => (
            e.number,
            non_empty(e.name),
            non_empty(e.name_latin),
            non_empty(e.revelation),
            e.verse_count.resolve(),
        ),
    };

    if !is_valid_chapter(number) {
        return Err(NormalizeError::MissingField { field: "number" });
    }
    let name = name.ok_or(NormalizeError::MissingField { field: "name" })?;
    let verse_count = count
        .filter(|c| *c > 0)
        .ok_or(NormalizeError::MissingField { field: "count" })?;

    Ok(ChapterMeta {
        number,
        name,
        name_latin,
        revelation,
        verse_count,
    })
}

/// Normalize the chapter index document.
///
/// Entries are classified one by one, so a document mixing both shapes is
/// accepted. A malformed entry is logged and skipped. Duplicate numbers keep
/// the last entry. The result is ordered by chapter number.
pub fn normalize_chapter_index(doc: &Value) -> Result<Vec<ChapterMeta>, NormalizeError> {
    let entries = doc.as_array().ok_or(NormalizeError::UnrecognizedShape {
        document: "chapter index",
    })?;

    let mut chapters: BTreeMap<u32, ChapterMeta> = BTreeMap::new();
    for (pos, entry) in entries.iter().enumerate() {
        match classify_index_entry(entry).and_then(index_entry_to_meta) {
            Ok(meta) => {
                chapters.insert(meta.number, meta);
            }
            Err(e) => {
                tracing::warn!(position = pos, error = %e, "skipping chapter index entry");
            }
        }
    }

    Ok(chapters.into_values().collect())
}

// ============ Verse documents ============

/// Verse document in the keyed shape.
#[derive(Debug, Deserialize)]
struct KeyedVerseDocument {
    verse: BTreeMap<String, Value>,
    #[serde(default)]
    count: Option<Number>,
}

/// One entry of a listed verse document.
#[derive(Debug, Deserialize)]
struct ListedVerse {
    #[serde(alias = "verse", alias = "ayah")]
    number: Number,
    #[serde(default, alias = "arabic", alias = "translation", alias = "tajweed")]
    text: Option<Value>,
}

#[derive(Debug)]
enum VerseDocument {
    Keyed(KeyedVerseDocument),
    Listed(Vec<Value>),
}

/// Which kind of per-chapter document is being decoded (for diagnostics).
#[derive(Debug, Clone, Copy)]
enum VerseSource {
    Canonical,
    Annotation,
    Translation,
}

impl VerseSource {
    fn label(self) -> &'static str {
        match self {
            Self::Canonical => "canonical text",
            Self::Annotation => "annotation",
            Self::Translation => "translation",
        }
    }
}

fn classify_verse_document(doc: &Value, kind: VerseSource) -> Result<VerseDocument, NormalizeError> {
    let unrecognized = || NormalizeError::UnrecognizedShape {
        document: kind.label(),
    };

    if doc.get("verse").map_or(false, Value::is_object) {
        return serde_json::from_value(doc.clone())
            .map(VerseDocument::Keyed)
            .map_err(|e| NormalizeError::Malformed {
                reason: e.to_string(),
            });
    }
    if let Some(list) = doc.get("verses").and_then(Value::as_array) {
        return Ok(VerseDocument::Listed(list.clone()));
    }
    if let Some(list) = doc.as_array() {
        return Ok(VerseDocument::Listed(list.clone()));
    }
    Err(unrecognized())
}

/// Resolve `"verse_12"` → 12.
fn keyed_ordinal(key: &str) -> Option<u32> {
    key.strip_prefix("verse_").and_then(parse_padded)
}

/// Decode a verse document into ordinal → text. Verses with an unresolvable
/// ordinal are skipped; ordinal 0 (the prefatory line some chapters carry)
/// is not a numbered verse and is dropped silently.
fn decode_verse_texts(
    chapter: u32,
    doc: &Value,
    kind: VerseSource,
) -> Result<BTreeMap<u32, String>, NormalizeError> {
    let mut out = BTreeMap::new();

    match classify_verse_document(doc, kind)? {
        VerseDocument::Keyed(keyed) => {
            for (key, value) in &keyed.verse {
                let Some(n) = keyed_ordinal(key) else {
                    let e = NormalizeError::BadOrdinal { key: key.clone() };
                    tracing::warn!(chapter, document = kind.label(), error = %e, "skipping verse");
                    continue;
                };
                if n == 0 {
                    continue;
                }
                if let Some(text) = value.as_str() {
                    out.insert(n, text.to_string());
                }
            }
            if let Some(declared) = keyed.count.as_ref().and_then(Number::resolve) {
                if declared as usize != out.len() {
                    tracing::debug!(
                        chapter,
                        document = kind.label(),
                        declared,
                        found = out.len(),
                        "verse count differs from document count field"
                    );
                }
            }
        }
        VerseDocument::Listed(items) => {
            for (pos, item) in items.into_iter().enumerate() {
                let verse: ListedVerse = match serde_json::from_value(item) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(chapter, document = kind.label(), position = pos, error = %e, "skipping verse");
                        continue;
                    }
                };
                let Some(n) = verse.number.resolve() else {
                    let e = NormalizeError::BadOrdinal {
                        key: format!("{:?}", verse.number),
                    };
                    tracing::warn!(chapter, document = kind.label(), error = %e, "skipping verse");
                    continue;
                };
                if n == 0 {
                    continue;
                }
                if let Some(text) = verse.text.as_ref().and_then(Value::as_str) {
                    out.insert(n, text.to_string());
                }
            }
        }
    }

    Ok(out)
}

/// Decode an optional per-chapter document. Absence or an unrecognized
/// shape degrades to no values.
fn decode_optional(chapter: u32, doc: Option<&Value>, kind: VerseSource) -> BTreeMap<u32, String> {
    let Some(doc) = doc else {
        return BTreeMap::new();
    };
    decode_verse_texts(chapter, doc, kind).unwrap_or_else(|e| {
        tracing::warn!(chapter, document = kind.label(), error = %e, "ignoring optional document");
        BTreeMap::new()
    })
}

/// Normalize one chapter's documents into verse records, ordered by verse.
///
/// The canonical document drives the verse set. Missing annotation or
/// translation entries become empty strings. A verse whose canonical text is
/// blank is skipped. Fails only if the canonical document has no
/// recognizable shape.
pub fn normalize_chapter_verses(
    chapter: u32,
    canonical: &Value,
    annotation: Option<&Value>,
    translation: Option<&Value>,
    audio_base: &str,
) -> Result<Vec<Verse>, NormalizeError> {
    let texts = decode_verse_texts(chapter, canonical, VerseSource::Canonical)?;
    let mut annotations = decode_optional(chapter, annotation, VerseSource::Annotation);
    let mut translations = decode_optional(chapter, translation, VerseSource::Translation);

    let mut verses = Vec::with_capacity(texts.len());
    for (n, text) in texts {
        let text = text.trim();
        if text.is_empty() {
            let e = NormalizeError::EmptyText { verse: n };
            tracing::warn!(chapter, error = %e, "skipping verse");
            continue;
        }
        verses.push(Verse {
            chapter,
            verse: n,
            text: text.to_string(),
            annotation: annotations
                .remove(&n)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            translation: translations
                .remove(&n)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            audio_url: audio_url(audio_base, chapter, n),
        });
    }

    Ok(verses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://example.org/source";

    #[test]
    fn parse_padded_numbers() {
        assert_eq!(parse_padded("001"), Some(1));
        assert_eq!(parse_padded("114"), Some(114));
        assert_eq!(parse_padded("000"), Some(0));
        assert_eq!(parse_padded(""), None);
        assert_eq!(parse_padded("1a"), None);
        assert_eq!(parse_padded("-3"), None);
    }

    #[test]
    fn index_padded_shape() {
        let doc = json!([
            { "index": "001", "title": "Al-Fatiha", "titleAr": "الفاتحة", "place": "Mecca", "type": "Makkiyah", "count": 7 },
            { "index": "002", "title": "Al-Baqarah", "titleAr": "البقرة", "place": "Medina", "count": 286 }
        ]);
        let chapters = normalize_chapter_index(&doc).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(
            chapters[0],
            ChapterMeta {
                number: 1,
                name: "الفاتحة".to_string(),
                name_latin: Some("Al-Fatiha".to_string()),
                revelation: Some("Mecca".to_string()),
                verse_count: 7,
            }
        );
        assert_eq!(chapters[1].verse_count, 286);
    }

    #[test]
    fn index_numbered_shape() {
        let doc = json!([
            { "number": 112, "name": "الإخلاص", "name_latin": "Al-Ikhlas", "place": "Mecca", "number_of_ayah": 4 }
        ]);
        let chapters = normalize_chapter_index(&doc).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, 112);
        assert_eq!(chapters[0].name_latin.as_deref(), Some("Al-Ikhlas"));
        assert_eq!(chapters[0].revelation.as_deref(), Some("Mecca"));
        assert_eq!(chapters[0].verse_count, 4);
    }

    #[test]
    fn index_falls_back_to_latin_title_for_name() {
        let doc = json!([{ "index": "003", "title": "Ali 'Imran", "count": 200 }]);
        let chapters = normalize_chapter_index(&doc).unwrap();
        assert_eq!(chapters[0].name, "Ali 'Imran");
    }

    #[test]
    fn index_skips_malformed_entries_and_keeps_the_rest() {
        let doc = json!([
            { "index": "00x", "titleAr": "bad number", "count": 3 },
            { "index": "004", "count": 176 },
            { "index": "115", "titleAr": "out of range", "count": 1 },
            { "index": "005", "titleAr": "المائدة", "count": 0 },
            "not an object",
            { "something": "else" },
            { "index": "006", "titleAr": "الأنعام", "count": "165" }
        ]);
        let chapters = normalize_chapter_index(&doc).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, 6);
        assert_eq!(chapters[0].verse_count, 165);
    }

    #[test]
    fn index_duplicate_keeps_last() {
        let doc = json!([
            { "number": 1, "name": "first", "verses_count": 7 },
            { "number": 1, "name": "second", "verses_count": 7 }
        ]);
        let chapters = normalize_chapter_index(&doc).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].name, "second");
    }

    #[test]
    fn index_rejects_non_array_document() {
        let err = normalize_chapter_index(&json!({ "index": "001" })).unwrap_err();
        assert!(matches!(err, NormalizeError::UnrecognizedShape { .. }));
    }

    #[test]
    fn keyed_and_listed_shapes_produce_identical_records() {
        let keyed = json!({
            "index": "001",
            "verse": { "verse_1": " first ", "verse_2": "second" },
            "count": 2
        });
        let keyed_tr = json!({ "verse": { "verse_1": "one", "verse_2": "two" } });

        let listed = json!({
            "number": 2,
            "verses": [
                { "number": 1, "text": " first " },
                { "number": 2, "text": "second" }
            ]
        });
        let listed_tr = json!({
            "verses": [
                { "number": 1, "translation": "one" },
                { "number": 2, "translation": "two" }
            ]
        });

        let a = normalize_chapter_verses(1, &keyed, None, Some(&keyed_tr), BASE).unwrap();
        let b = normalize_chapter_verses(2, &listed, None, Some(&listed_tr), BASE).unwrap();

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.verse, y.verse);
            assert_eq!(x.text, y.text);
            assert_eq!(x.annotation, y.annotation);
            assert_eq!(x.translation, y.translation);
            assert!(!x.audio_url.is_empty() && !y.audio_url.is_empty());
        }
        assert_eq!(a[0].text, "first");
        assert_eq!(b[1].translation, "two");
        assert_eq!(b[0].audio_url, "https://example.org/source/audio/002/001.mp3");
    }

    #[test]
    fn top_level_list_is_accepted() {
        let doc = json!([{ "ayah": "3", "arabic": "ثالث" }, { "verse": 1, "arabic": "أول" }]);
        let verses = normalize_chapter_verses(9, &doc, None, None, BASE).unwrap();
        assert_eq!(verses.iter().map(|v| v.verse).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn missing_optional_documents_default_to_empty() {
        let doc = json!({ "verse": { "verse_1": "text" } });
        let tr = json!({ "verse": { "verse_2": "only the second" } });
        let verses = normalize_chapter_verses(1, &doc, None, Some(&tr), BASE).unwrap();
        assert_eq!(verses.len(), 1);
        assert_eq!(verses[0].annotation, "");
        assert_eq!(verses[0].translation, "");
    }

    #[test]
    fn unrecognized_optional_document_is_ignored() {
        let doc = json!({ "verse": { "verse_1": "text" } });
        let annotation = json!({ "rules": [] });
        let verses = normalize_chapter_verses(1, &doc, Some(&annotation), None, BASE).unwrap();
        assert_eq!(verses.len(), 1);
        assert_eq!(verses[0].annotation, "");
    }

    #[test]
    fn non_string_annotation_values_become_empty() {
        let doc = json!({ "verse": { "verse_1": "text" } });
        let annotation = json!({ "verse": { "verse_1": [{ "rule": "ghunnah", "start": 0, "end": 3 }] } });
        let verses = normalize_chapter_verses(1, &doc, Some(&annotation), None, BASE).unwrap();
        assert_eq!(verses[0].annotation, "");
    }

    #[test]
    fn unresolvable_ordinals_and_blank_text_are_skipped() {
        let doc = json!({
            "verse": {
                "verse_0": "prefatory line",
                "verse_1": "kept",
                "verse_x": "bad key",
                "intro": "bad key",
                "verse_2": "   ",
                "verse_3": "also kept"
            }
        });
        let verses = normalize_chapter_verses(2, &doc, None, None, BASE).unwrap();
        assert_eq!(verses.iter().map(|v| v.verse).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn listed_entries_without_number_are_skipped() {
        let doc = json!({ "verses": [ { "text": "no number" }, { "number": "x", "text": "bad" }, { "number": 4, "text": "ok" } ] });
        let verses = normalize_chapter_verses(5, &doc, None, None, BASE).unwrap();
        assert_eq!(verses.len(), 1);
        assert_eq!(verses[0].verse, 4);
    }

    #[test]
    fn unrecognized_canonical_document_is_an_error() {
        let err = normalize_chapter_verses(1, &json!({ "data": 1 }), None, None, BASE).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::UnrecognizedShape {
                document: "canonical text"
            }
        );
    }
}
