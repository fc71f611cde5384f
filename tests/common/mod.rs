//! Shared fixtures: a synthetic 114-chapter corpus published in both source
//! shapes, and an in-memory [`SourceClient`] serving it.
#![allow(dead_code)]

use async_trait::async_trait;
use quran_index::error::SourceError;
use quran_index::migrate::apply_schema;
use quran_index::models::CHAPTER_COUNT;
use quran_index::source::SourceClient;
use quran_index::store::Store;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;

pub const LANG: &str = "en";

/// Declared (and served) verse count of chapter `n`: 1..=5.
pub fn verse_count(n: u32) -> u32 {
    n % 5 + 1
}

pub fn total_verses() -> u32 {
    (1..=CHAPTER_COUNT).map(verse_count).sum()
}

pub fn arabic(n: u32, v: u32) -> String {
    format!("نص {} {}", n, v)
}

/// Every translation contains "common" plus a token unique to the verse.
pub fn translation(n: u32, v: u32) -> String {
    format!("marker{}x{} common words", n, v)
}

pub fn annotation(n: u32, v: u32) -> String {
    format!("nassu {} {}", n, v)
}

/// Chapter index: odd chapters in the padded shape, even in the numbered one.
pub fn chapter_index() -> Value {
    let entries: Vec<Value> = (1..=CHAPTER_COUNT)
        .map(|n| {
            if n % 2 == 1 {
                json!({
                    "index": format!("{:03}", n),
                    "titleAr": format!("سورة {}", n),
                    "title": format!("Surah {}", n),
                    "place": if n % 3 == 0 { "Medina" } else { "Mecca" },
                    "count": verse_count(n)
                })
            } else {
                json!({
                    "number": n,
                    "name": format!("سورة {}", n),
                    "name_latin": format!("Surah {}", n),
                    "place": if n % 3 == 0 { "Medina" } else { "Mecca" },
                    "number_of_ayah": verse_count(n)
                })
            }
        })
        .collect();
    Value::Array(entries)
}

/// Keyed shape: `{"verse": {"verse_1": ...}, "count": n}`. Chapter 1 also
/// carries the unnumbered prefatory line as `verse_0`.
fn keyed(n: u32, text: impl Fn(u32, u32) -> String) -> Value {
    let mut verses = Map::new();
    if n == 1 {
        verses.insert("verse_0".to_string(), json!("prefatory line"));
    }
    for v in 1..=verse_count(n) {
        verses.insert(format!("verse_{}", v), json!(text(n, v)));
    }
    json!({ "index": format!("{:03}", n), "verse": verses, "count": verse_count(n) })
}

/// Listed shape: `{"verses": [{"number": 1, "text": ...}]}`.
fn listed(n: u32, field: &str, text: impl Fn(u32, u32) -> String) -> Value {
    let verses: Vec<Value> = (1..=verse_count(n))
        .map(|v| {
            let mut obj = Map::new();
            obj.insert("number".to_string(), json!(v));
            obj.insert(field.to_string(), json!(text(n, v)));
            Value::Object(obj)
        })
        .collect();
    json!({ "number": n, "verses": verses })
}

/// Every document of the corpus, keyed by source path. Chapters alternate
/// between the two shapes.
pub fn corpus() -> HashMap<String, Value> {
    let mut docs = HashMap::new();
    docs.insert("surah.json".to_string(), chapter_index());

    for n in 1..=CHAPTER_COUNT {
        let (canonical, tajweed, tr) = if n % 2 == 1 {
            (keyed(n, arabic), keyed(n, annotation), keyed(n, translation))
        } else {
            (
                listed(n, "text", arabic),
                listed(n, "text", annotation),
                listed(n, "translation", translation),
            )
        };
        docs.insert(format!("surah/surah_{}.json", n), canonical);
        docs.insert(format!("tajweed/surah_{}.json", n), tajweed);
        docs.insert(
            format!("translation/{lang}/{lang}_translation_{n}.json", lang = LANG, n = n),
            tr,
        );
    }
    docs
}

/// In-memory source. Unknown or failing paths answer like a 404.
pub struct MapSource {
    docs: HashMap<String, Value>,
    failing: HashSet<String>,
    requested: Mutex<Vec<String>>,
}

impl MapSource {
    pub fn new(docs: HashMap<String, Value>) -> Self {
        Self {
            docs,
            failing: HashSet::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn full() -> Self {
        Self::new(corpus())
    }

    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for MapSource {
    async fn fetch(&self, path: &str) -> Result<Value, SourceError> {
        self.requested.lock().unwrap().push(path.to_string());
        if self.failing.contains(path) {
            return Err(SourceError::Remote {
                path: path.to_string(),
                status: 404,
                body: "Not Found".to_string(),
            });
        }
        self.docs
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::Remote {
                path: path.to_string(),
                status: 404,
                body: "Not Found".to_string(),
            })
    }
}

pub async fn open_store() -> (TempDir, Store) {
    let tmp = TempDir::new().unwrap();
    let pool = quran_index::db::connect_path(&tmp.path().join("quran.sqlite"))
        .await
        .unwrap();
    apply_schema(&pool).await.unwrap();
    (tmp, Store::new(pool))
}
