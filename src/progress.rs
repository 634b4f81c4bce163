//! Index progress reporting.
//!
//! Reports observable progress during `agentc index` so users see which
//! files are being read and how many descriptors still need an embedding.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an index run.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Walking the source directories. Total unknown.
    Discovering { kind: String },
    /// A source file was handed to its indexer.
    Indexing { kind: String, path: String, n: u64 },
    /// Embedding the descriptors the previous catalog could not supply.
    Embedding { kind: String, n: u64, total: u64 },
}

/// Reports index progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index tool  embedding  12 / 40 items".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Discovering { kind } => {
                format!("index {}  discovering...\n", kind)
            }
            IndexProgressEvent::Indexing { kind, path, n } => {
                format!("index {}  [{}] {}\n", kind, format_number(*n), path)
            }
            IndexProgressEvent::Embedding { kind, n, total } => format!(
                "index {}  embedding  {} / {} items\n",
                kind,
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Discovering { kind } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "discovering"
            }),
            IndexProgressEvent::Indexing { kind, path, n } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "indexing",
                "path": path,
                "n": n
            }),
            IndexProgressEvent::Embedding { kind, n, total } => serde_json::json!({
                "event": "progress",
                "kind": kind,
                "phase": "embedding",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
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
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
