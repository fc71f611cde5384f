//! Ingestion progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. The
//! human reporter prints one line per event; the JSON reporter prints one
//! object per line.

use std::io::Write;

/// A single progress event emitted by the ingestor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestProgressEvent {
    /// Chapter index fetched and written.
    Indexed { chapters: u32 },
    /// Chapter `n` of `total` committed.
    Chapter { n: u32, total: u32, verses: u64 },
    /// Chapter `n` left out of this run (canonical text unavailable).
    Skipped { n: u32, total: u32, reason: String },
}

/// Receives progress events. Implementations must not block for long.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: `ingest  chapter  12 / 114  (111 verses)`.
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Indexed { chapters } => {
                format!("ingest  index  {} chapters\n", chapters)
            }
            IngestProgressEvent::Chapter { n, total, verses } => format!(
                "ingest  chapter  {:>3} / {}  ({} verses)\n",
                n,
                total,
                format_number(*verses)
            ),
            IngestProgressEvent::Skipped { n, total, reason } => {
                format!("ingest  chapter  {:>3} / {}  skipped: {}\n", n, total, reason)
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn event_json(event: &IngestProgressEvent) -> serde_json::Value {
    match event {
        IngestProgressEvent::Indexed { chapters } => serde_json::json!({
            "event": "progress",
            "phase": "index",
            "chapters": chapters
        }),
        IngestProgressEvent::Chapter { n, total, verses } => serde_json::json!({
            "event": "progress",
            "phase": "chapter",
            "n": n,
            "total": total,
            "verses": verses
        }),
        IngestProgressEvent::Skipped { n, total, reason } => serde_json::json!({
            "event": "progress",
            "phase": "skipped",
            "n": n,
            "total": total,
            "reason": reason
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Progress mode selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(6236), "6,236");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_event_shape() {
        let obj = event_json(&IngestProgressEvent::Chapter {
            n: 2,
            total: 114,
            verses: 286,
        });
        assert_eq!(obj["phase"], "chapter");
        assert_eq!(obj["n"], 2);
        assert_eq!(obj["verses"], 286);

        let skipped = event_json(&IngestProgressEvent::Skipped {
            n: 9,
            total: 114,
            reason: "HTTP 404".to_string(),
        });
        assert_eq!(skipped["phase"], "skipped");
        assert_eq!(skipped["reason"], "HTTP 404");
    }
}
