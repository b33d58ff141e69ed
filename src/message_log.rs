//! Append-only transcript of relayed messages.
//!
//! Separate from diagnostic tracing: this is the operator-facing record of
//! what crossed the bridge. A write failure is reported and swallowed; the
//! relay never stops over a transcript problem.

use std::io::Write;
use std::path::PathBuf;

use crate::message::Direction;

#[derive(Debug, Clone)]
pub struct MessageLog {
    path: PathBuf,
    enabled: bool,
}

impl MessageLog {
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    /// A transcript that never writes.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            enabled: false,
        }
    }

    /// Append one transcript line: `[timestamp] Discord -> IRC <sender> text`.
    pub fn write(&self, direction: Direction, sender: &str, text: &str) {
        if !self.enabled {
            return;
        }

        let line = format!(
            "[{}] {} <{}> {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            direction,
            sender,
            text
        );
        tracing::info!("{line}");

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), "Error writing transcript: {e}");
        }
    }
}
