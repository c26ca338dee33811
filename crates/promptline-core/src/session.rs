//! A managed session: one child process, its captured output and lifecycle.

use crate::buffer::OutputBuffer;
use crate::matcher::find_earliest;
use crate::process::{LaunchSpec, ProcessHandle};
use crate::reader::OutputReader;
use crate::transcript::TranscriptSink;
use crate::{PromptlineError, Result};
use chrono::{DateTime, Utc};
use promptline_types::{SessionId, SessionInfo, SessionState, SessionSummary, WaitOutcome};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Poll interval while waiting for a signalled child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the kernel to reap a child after SIGKILL.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for the reader thread to drain trailing output.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default limit on how long a write may stay blocked on a full input queue.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for `send_command`.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Append `\n` after the command.
    pub newline: bool,
    /// Skip unconsumed output before writing.
    pub preflush: bool,
    /// Give up with `WriteFailure` if the child has not taken the input by then.
    pub write_timeout: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            newline: true,
            preflush: false,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Lifecycle state and output, guarded by one lock per session.
pub(crate) struct Inner {
    pub(crate) state: SessionState,
    pub(crate) exit_code: Option<i32>,
    pub(crate) buffer: OutputBuffer,
    /// Set once an explicit exit has started; the reader then leaves the
    /// final transition to the exit path.
    pub(crate) stopping: bool,
    pub(crate) last_activity: Instant,
}

/// State shared between the session, its reader thread and waiters.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Signalled on every append and state change.
    changed: Notify,
}

impl Shared {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Starting,
                exit_code: None,
                buffer: OutputBuffer::new(),
                stopping: false,
                last_activity: Instant::now(),
            }),
            changed: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append output, calling `mirror` with the same text while the lock is
    /// held. Returns `false` without appending once the buffer is frozen.
    pub(crate) fn append(&self, text: &str, mirror: impl FnOnce(&str)) -> bool {
        {
            let mut inner = self.lock();
            if inner.buffer.is_frozen() {
                return false;
            }
            mirror(text);
            inner.buffer.append(text);
        }
        self.changed.notify_waiters();
        true
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.lock().buffer.is_frozen()
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.lock().stopping
    }

    /// Natural end of the process. Returns `false` unless the session is
    /// running and no explicit exit owns the transition.
    pub(crate) fn finish_exited(&self, exit_code: Option<i32>) -> bool {
        let done = {
            let mut inner = self.lock();
            if inner.state != SessionState::Running || inner.stopping {
                false
            } else {
                inner.buffer.freeze();
                inner.state = SessionState::Exited;
                inner.exit_code = exit_code;
                true
            }
        };
        if done {
            self.changed.notify_waiters();
        }
        done
    }

    fn finish_terminated(&self, exit_code: Option<i32>) {
        {
            let mut inner = self.lock();
            inner.buffer.freeze();
            inner.state = SessionState::Terminated;
            inner.exit_code = exit_code;
        }
        self.changed.notify_waiters();
    }
}

/// One managed child process plus its captured output and lifecycle state.
pub struct Session {
    id: SessionId,
    command: String,
    args: Vec<String>,
    log_file: Option<PathBuf>,
    created_at: DateTime<Utc>,
    process: Arc<ProcessHandle>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Serializes concurrent exit requests.
    exit_lock: tokio::sync::Mutex<()>,
}

impl Session {
    /// Wrap a freshly spawned process and start its output reader.
    pub(crate) fn start(
        id: SessionId,
        spec: LaunchSpec,
        process: ProcessHandle,
        output: Box<dyn Read + Send>,
        sink: Option<TranscriptSink>,
    ) -> Result<Arc<Self>> {
        let process = Arc::new(process);
        let shared = Arc::new(Shared::new());
        let log_file = sink.as_ref().map(|s| s.path().to_path_buf());

        // The child is already spawned; the reader only ever moves a running
        // session to EXITED.
        shared.lock().state = SessionState::Running;

        let handle = OutputReader::new(id, output, shared.clone(), process.clone(), sink)
            .spawn()
            .map_err(|e| {
                process.kill();
                PromptlineError::SpawnFailure(format!("reader thread: {}", e))
            })?;

        info!(
            target: "promptline::session",
            "Session {} running: {} {:?} (pid {:?})",
            id, spec.command, spec.args, process.pid()
        );

        Ok(Arc::new(Self {
            id,
            command: spec.command,
            args: spec.args,
            log_file,
            created_at: Utc::now(),
            process,
            shared,
            reader: Mutex::new(Some(handle)),
            exit_lock: tokio::sync::Mutex::new(()),
        }))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.shared.lock().exit_code
    }

    /// Time since a caller last touched this session.
    pub fn idle_for(&self) -> Duration {
        self.shared.lock().last_activity.elapsed()
    }

    pub fn info(&self) -> SessionInfo {
        let inner = self.shared.lock();
        SessionInfo {
            id: self.id,
            command: self.command.clone(),
            args: self.args.clone(),
            state: inner.state,
            exit_code: inner.exit_code,
            pid: self.process.pid(),
            log_file: self.log_file.clone(),
            created_at: self.created_at,
            buffered_bytes: inner.buffer.len(),
            unconsumed_bytes: inner.buffer.unconsumed_len(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from(&self.info())
    }

    /// Whole captured output, consumed or not.
    pub fn transcript(&self) -> String {
        self.shared.lock().buffer.contents().to_string()
    }

    fn not_running(&self, inner: &Inner) -> PromptlineError {
        PromptlineError::SessionNotRunning {
            id: self.id,
            state: inner.state,
            exit_code: inner.exit_code,
        }
    }

    /// Write a command to the child's input. Does not wait for a response.
    pub async fn send_command(&self, command: &str, opts: SendOptions) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            if inner.state != SessionState::Running {
                return Err(self.not_running(&inner));
            }
            if opts.preflush {
                let skipped = inner.buffer.skip_to_end();
                debug!(target: "promptline::session", "Session {} preflush skipped {} bytes", self.id, skipped);
            }
            inner.last_activity = Instant::now();
        }

        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        if opts.newline {
            data.push(b'\n');
        }

        // The write may block on a full PTY; keep it off the runtime threads
        // and outside the state lock. A write that outlives the timeout is
        // left to fail once the child dies or the session is exited.
        let process = self.process.clone();
        let write = tokio::task::spawn_blocking(move || process.write_all(&data));
        let result = match tokio::time::timeout(opts.write_timeout, write).await {
            Ok(joined) => joined.unwrap_or_else(|e| Err(std::io::Error::other(e))),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("input not accepted within {:?}", opts.write_timeout),
            )),
        };

        match result {
            Ok(()) => {
                debug!(target: "promptline::session", "Session {} <- {:?}", self.id, command);
                Ok(())
            }
            Err(source) => {
                let inner = self.shared.lock();
                if inner.state.is_terminal() {
                    return Err(self.not_running(&inner));
                }
                warn!(target: "promptline::session", "Write to session {} failed: {}", self.id, source);
                Err(PromptlineError::WriteFailure {
                    id: self.id,
                    source,
                })
            }
        }
    }

    /// Wait until one of `prompts` appears in unconsumed output, the process
    /// ends, or `timeout` elapses.
    ///
    /// With no prompts this drains: it waits out the timeout (or the process)
    /// and returns everything unconsumed. A timeout leaves the cursor where it
    /// was so the next call can still match the same text.
    pub async fn wait_for_output(&self, prompts: &[String], timeout: Duration) -> Result<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut first = true;

        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            // Register before inspecting the buffer so an append between the
            // check and the await is not missed.
            notified.as_mut().enable();

            {
                let mut inner = self.shared.lock();
                let ended = inner.state.is_terminal();

                if first {
                    first = false;
                    if ended && inner.buffer.unconsumed_len() == 0 {
                        return Err(self.not_running(&inner));
                    }
                    if !ended && inner.state != SessionState::Running {
                        return Err(self.not_running(&inner));
                    }
                    inner.last_activity = Instant::now();
                }

                if let Some(m) = find_earliest(inner.buffer.unconsumed(), prompts) {
                    let text = inner.buffer.consume(m.end);
                    debug!(
                        target: "promptline::session",
                        "Session {} matched prompt {:?} ({} bytes)",
                        self.id, prompts[m.index], text.len()
                    );
                    return Ok(WaitOutcome {
                        matched: Some(prompts[m.index].clone()),
                        text,
                        timed_out: false,
                        process_ended: ended,
                        remaining_bytes: inner.buffer.unconsumed_len(),
                    });
                }

                if ended {
                    return Ok(WaitOutcome {
                        matched: None,
                        text: inner.buffer.consume_all(),
                        timed_out: false,
                        process_ended: true,
                        remaining_bytes: 0,
                    });
                }

                if tokio::time::Instant::now() >= deadline {
                    if prompts.is_empty() {
                        return Ok(WaitOutcome {
                            matched: None,
                            text: inner.buffer.consume_all(),
                            timed_out: false,
                            process_ended: false,
                            remaining_bytes: 0,
                        });
                    }
                    debug!(target: "promptline::session", "Session {} wait timed out", self.id);
                    return Ok(WaitOutcome {
                        matched: None,
                        text: inner.buffer.unconsumed().to_string(),
                        timed_out: true,
                        process_ended: false,
                        remaining_bytes: inner.buffer.unconsumed_len(),
                    });
                }
            }

            // Either side firing leads back to a fresh check.
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    /// Stop the session: hang up and SIGTERM, wait `grace`, then SIGKILL.
    ///
    /// Idempotent; a session that already ended reports its existing state.
    /// When this returns the buffer is frozen and the reader appends nothing more.
    pub async fn exit(&self, grace: Duration) -> (SessionState, Option<i32>) {
        let _exiting = self.exit_lock.lock().await;
        {
            let mut inner = self.shared.lock();
            if inner.state.is_terminal() {
                return (inner.state, inner.exit_code);
            }
            inner.stopping = true;
        }
        // Wake waiters and the reader's reap loop.
        self.shared.changed.notify_waiters();

        info!(target: "promptline::session", "Terminating session {}", self.id);
        // Signal first: a write blocked on a full input queue only fails once
        // the child is gone, and closing input must not wait for it.
        self.process.terminate();
        self.process.close_input();

        let mut exit_code = self.poll_exit(grace).await;
        if exit_code.is_none() {
            info!(
                target: "promptline::session",
                "Session {} still alive after {:?}, killing",
                self.id, grace
            );
            self.process.kill();
            exit_code = self.poll_exit(KILL_REAP_TIMEOUT).await;
            if exit_code.is_none() {
                warn!(target: "promptline::session", "Session {} could not be reaped", self.id);
            }
        }

        self.join_reader().await;
        self.shared.finish_terminated(exit_code);
        self.process.release_pty();

        info!(
            target: "promptline::session",
            "Session {} terminated (exit code {:?})",
            self.id, exit_code
        );
        (SessionState::Terminated, exit_code)
    }

    async fn poll_exit(&self, limit: Duration) -> Option<i32> {
        let deadline = Instant::now() + limit;
        loop {
            match self.process.try_wait() {
                Ok(Some(code)) => return Some(code),
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "promptline::session", "try_wait failed for session {}: {}", self.id, e);
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Give the reader a bounded chance to drain trailing output. A reader
    /// that stays blocked is detached; the frozen buffer stops it later.
    async fn join_reader(&self) {
        let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        let deadline = Instant::now() + READER_JOIN_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                debug!(target: "promptline::session", "Reader for session {} did not finish in time, detaching", self.id);
                return;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        if handle.join().is_err() {
            warn!(target: "promptline::session", "Reader thread for session {} panicked", self.id);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
