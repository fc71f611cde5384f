//! # Quran Index
//!
//! Ingests the Quran corpus (chapter index, canonical text, phonetic
//! annotation, one translation) from a remote JSON source into a local
//! SQLite store, and serves rate-limited full-text search over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────────┐
//! │ SourceClient │──▶│ Normalizer  │──▶│ Ingestor │──▶│    Store     │
//! │  (HTTP/JSON) │   │ shape detect│   │ per-chap │   │ SQLite+FTS5  │
//! └──────────────┘   └─────────────┘   └──────────┘   └──────┬───────┘
//!                                                            │
//!                     ┌──────────────┐   ┌──────────────┐    │
//!    client ────────▶ │ RateLimiter  │──▶│ QueryService │────┘
//!                     └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! quran init
//! quran ingest --lang en
//! quran verify
//! quran search "mercy"
//! quran serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Canonical chapter/verse types |
//! | [`source`] | Remote document fetching |
//! | [`normalize`] | Source shape detection and decoding |
//! | [`ingest`] | Corpus ingestion |
//! | [`progress`] | Ingestion progress reporting |
//! | [`store`] | Persistence and full-text index |
//! | [`fold`] | Arabic search folding |
//! | [`query`] | Search and lookup service |
//! | [`ratelimit`] | Per-client rate limiting |
//! | [`server`] | HTTP surface |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema |

pub mod config;
pub mod db;
pub mod error;
pub mod fold;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod ratelimit;
pub mod search;
pub mod server;
pub mod source;
pub mod stats;
pub mod store;
