//! # Quran index CLI (`quran`)
//!
//! ## Usage
//!
//! ```bash
//! quran --config ./config/quran.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quran init` | Create the SQLite database and schema |
//! | `quran ingest` | Fetch, normalize and store the whole corpus |
//! | `quran chapters` | List ingested chapters |
//! | `quran read <n>` | Print the verses of chapter `n` |
//! | `quran search "<query>"` | Full-text search over text and translation |
//! | `quran verify` | Check every chapter holds its declared verse count |
//! | `quran reindex` | Rebuild the full-text index from the verse table |
//! | `quran serve` | Start the rate-limited HTTP query server |
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quran_index::progress::ProgressMode;
use quran_index::{config, get, ingest, migrate, search, server, stats};

/// Ingest the Quran corpus into SQLite and search it.
#[derive(Parser)]
#[command(name = "quran", version)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when the
    /// file does not exist.
    #[arg(
        long,
        global = true,
        env = "QURAN_CONFIG",
        default_value = "./config/quran.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the whole corpus from the configured source.
    ///
    /// Chapters are committed one at a time; an interrupted run keeps the
    /// chapters already written.
    Ingest {
        /// Translation language code (overrides `[source].language`).
        #[arg(long)]
        lang: Option<String>,

        /// Skip chapters whose text cannot be fetched instead of aborting.
        #[arg(long)]
        keep_going: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal,
        /// otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List ingested chapters.
    Chapters,

    /// Print every verse of a chapter.
    Read {
        /// Chapter number (1-114).
        chapter: String,
    },

    /// Search verse text and translation.
    Search {
        query: String,

        /// Maximum number of hits (clamped to `[retrieval].max_limit`).
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Verify stored verse counts against the chapter index.
    Verify,

    /// Rebuild the full-text index from stored verses.
    Reindex,

    /// Start the HTTP query server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest {
            lang,
            keep_going,
            progress,
        } => {
            let cancel = cancel_on_ctrl_c();
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, lang, keep_going, progress, cancel).await?;
        }
        Commands::Chapters => {
            get::run_chapters(&cfg).await?;
        }
        Commands::Read { chapter } => {
            get::run_read(&cfg, &chapter).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Verify => {
            stats::run_verify(&cfg).await?;
        }
        Commands::Reindex => {
            stats::run_reindex(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, cancel_on_ctrl_c()).await?;
        }
    }

    Ok(())
}

/// A token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            child.cancel();
        }
    });
    token
}
