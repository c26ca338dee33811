//! Background output reader, one OS thread per session.

use crate::decoder::Utf8Decoder;
use crate::process::ProcessHandle;
use crate::session::Shared;
use crate::transcript::TranscriptSink;
use promptline_types::SessionId;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const READ_CHUNK: usize = 4096;

/// How often the reader polls for the exit status after end-of-stream.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drains a child's PTY output into its session buffer.
pub(crate) struct OutputReader {
    session_id: SessionId,
    source: Box<dyn Read + Send>,
    shared: Arc<Shared>,
    process: Arc<ProcessHandle>,
    sink: Option<TranscriptSink>,
    decoder: Utf8Decoder,
}

impl OutputReader {
    pub(crate) fn new(
        session_id: SessionId,
        source: Box<dyn Read + Send>,
        shared: Arc<Shared>,
        process: Arc<ProcessHandle>,
        sink: Option<TranscriptSink>,
    ) -> Self {
        Self {
            session_id,
            source,
            shared,
            process,
            sink,
            decoder: Utf8Decoder::new(),
        }
    }

    /// Start the reader thread (PTY reads are blocking).
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("promptline-reader-{}", self.session_id))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let session_id = self.session_id;
        debug!(target: "promptline::reader", "Reader thread started for session {}", session_id);

        let mut buf = [0u8; READ_CHUNK];
        let mut total_bytes = 0usize;

        loop {
            match self.source.read(&mut buf) {
                Ok(0) => {
                    debug!(target: "promptline::reader", "EOF for session {}", session_id);
                    break;
                }
                Ok(n) => {
                    total_bytes += n;
                    trace!(target: "promptline::reader", "Session {} read {} bytes (total {})", session_id, n, total_bytes);
                    let text = self.decoder.decode(&buf[..n]);
                    if !self.deliver(&text) {
                        debug!(target: "promptline::reader", "Session {} buffer frozen, reader stopping", session_id);
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO on the master once the slave side is gone.
                    if !self.shared.is_stopping() && e.raw_os_error() != Some(libc::EIO) {
                        error!(target: "promptline::reader", "PTY read error for session {}: {}", session_id, e);
                    }
                    break;
                }
            }
        }

        let tail = self.decoder.finish();
        self.deliver(&tail);

        let exit_code = self.reap();
        if self.shared.finish_exited(exit_code) {
            self.process.close_input();
            self.process.release_pty();
            info!(
                target: "promptline::session",
                "Session {} exited with code {:?} ({} bytes captured)",
                session_id, exit_code, total_bytes
            );
        }
        debug!(target: "promptline::reader", "Reader thread exiting for session {}", session_id);
    }

    /// Append to the buffer, mirroring to the transcript under the same lock
    /// so the two never diverge. Returns `false` once the session is frozen.
    fn deliver(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return !self.shared.is_frozen();
        }
        let session_id = self.session_id;
        let sink = &mut self.sink;
        self.shared.append(text, |chunk| {
            if let Some(s) = sink.as_mut() {
                if let Err(e) = s.write(chunk) {
                    warn!(
                        target: "promptline::reader",
                        "Transcript write to {:?} failed for session {}, disabling it: {}",
                        s.path(), session_id, e
                    );
                    *sink = None;
                }
            }
        })
    }

    /// Wait for the child's exit status after end-of-stream. Gives up if an
    /// explicit exit takes over, since that path reaps the child itself.
    fn reap(&self) -> Option<i32> {
        loop {
            match self.process.try_wait() {
                Ok(Some(code)) => return Some(code),
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "promptline::reader", "Failed to reap session {}: {}", self.session_id, e);
                    return None;
                }
            }
            if self.shared.is_stopping() {
                return None;
            }
            std::thread::sleep(REAP_POLL_INTERVAL);
        }
    }
}
