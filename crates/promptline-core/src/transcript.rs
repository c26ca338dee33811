//! On-disk session transcripts.
//!
//! A transcript mirrors the in-memory buffer byte for byte: no framing, no
//! timestamps, same order.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log file for one session.
#[derive(Debug)]
pub struct TranscriptSink {
    path: PathBuf,
    file: File,
}

impl TranscriptSink {
    /// Create (or truncate) the transcript, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Append a chunk and flush it through to the file.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())?;
        self.file.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build an auto-generated transcript path:
/// `<dir>/session-<command basename>-<YYYYmmdd-HHMMSS>-<seq>.log`.
pub fn auto_log_path(dir: &Path, command: &str, now: DateTime<Local>, seq: u64) -> PathBuf {
    let base = Path::new(command)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session");
    let base: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    dir.join(format!(
        "session-{}-{}-{}.log",
        base,
        now.format("%Y%m%d-%H%M%S"),
        seq
    ))
}
