//! Child process ownership over a pseudo-terminal.

use crate::{PromptlineError, Result};
use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use tracing::{debug, info, warn};

/// Initial terminal size. Wide enough that typical REPL lines don't wrap.
const PTY_ROWS: u16 = 50;
const PTY_COLS: u16 = 200;

/// What to launch.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Working directory; defaults to the controller's current directory.
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
        }
    }
}

/// Owns one spawned child: its PTY master, input writer and exit status.
///
/// Stdout and stderr share the PTY, so output arrives as a single interleaved
/// stream through the reader returned by [`ProcessHandle::spawn`].
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Mutex<Box<dyn PtyChild + Send + Sync>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    /// Set by `close_input`; checked before and after taking the writer so a
    /// write that was queued behind a blocked one never reaches the child.
    input_closed: AtomicBool,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Take the value out of `m` unless another thread holds the lock.
fn try_take<T>(m: &Mutex<Option<T>>) -> Option<T> {
    match m.try_lock() {
        Ok(mut guard) => guard.take(),
        Err(TryLockError::Poisoned(e)) => e.into_inner().take(),
        Err(TryLockError::WouldBlock) => None,
    }
}

fn closed_input() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "input channel closed")
}

impl ProcessHandle {
    /// Spawn the child and return the handle plus the output reader.
    pub fn spawn(spec: &LaunchSpec) -> Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PromptlineError::SpawnFailure(format!("openpty: {}", e)))?;

        let mut cmd = CommandBuilder::new(&spec.command);
        cmd.args(&spec.args);
        // portable-pty falls back to $HOME without an explicit cwd.
        match &spec.cwd {
            Some(dir) => cmd.cwd(dir),
            None => {
                if let Ok(dir) = std::env::current_dir() {
                    cmd.cwd(dir);
                }
            }
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            warn!(target: "promptline::process", "Failed to spawn {:?}: {}", spec.command, e);
            PromptlineError::SpawnFailure(format!("{}: {}", spec.command, e))
        })?;
        // Our copy of the slave must go, or the reader never sees end-of-stream.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PromptlineError::SpawnFailure(format!("PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PromptlineError::SpawnFailure(format!("PTY writer: {}", e)))?;

        let pid = child.process_id();
        info!(target: "promptline::process", "Spawned {:?} (pid {:?})", spec.command, pid);

        Ok((
            Self {
                pid,
                child: Mutex::new(child),
                writer: Mutex::new(Some(writer)),
                input_closed: AtomicBool::new(false),
                master: Mutex::new(Some(pair.master)),
            },
            reader,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write bytes to the child's input and flush.
    ///
    /// Blocks while the terminal's input queue is full, so callers run it off
    /// the async runtime and bound how long they wait for it.
    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if self.input_closed() {
            return Err(closed_input());
        }
        let mut writer = lock(&self.writer);
        let w = match writer.as_mut() {
            Some(w) if !self.input_closed() => w,
            _ => return Err(closed_input()),
        };
        w.write_all(data)?;
        w.flush()
    }

    /// Close the input channel; later writes fail with `BrokenPipe`.
    ///
    /// Never blocks: if a write currently holds the writer, the writer is
    /// dropped later by `release_pty` once that write has failed.
    pub fn close_input(&self) {
        self.input_closed.store(true, Ordering::Release);
        try_take(&self.writer);
    }

    pub fn input_closed(&self) -> bool {
        self.input_closed.load(Ordering::Acquire)
    }

    /// Non-blocking reap. Returns the exit code once the child has ended.
    pub fn try_wait(&self) -> io::Result<Option<i32>> {
        let mut child = lock(&self.child);
        Ok(child.try_wait()?.map(|status| status.exit_code() as i32))
    }

    /// Ask the child to stop: hang up its terminal and send SIGTERM.
    pub fn terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            debug!(target: "promptline::process", "Sending SIGHUP/SIGTERM to process group {}", pid);
            signal_group(pid, libc::SIGHUP);
            signal_group(pid, libc::SIGTERM);
            return;
        }
        self.kill();
    }

    /// Forcefully kill the child and its process group.
    pub fn kill(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            info!(target: "promptline::process", "Sending SIGKILL to process group {}", pid);
            signal_group(pid, libc::SIGKILL);
            return;
        }
        if let Err(e) = lock(&self.child).kill() {
            debug!(target: "promptline::process", "kill failed (already exited?): {}", e);
        }
    }

    /// Close the PTY master and, if no write is in flight, the writer.
    pub fn release_pty(&self) {
        self.input_closed.store(true, Ordering::Release);
        try_take(&self.writer);
        try_take(&self.master);
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Signal the whole process group. The PTY child is a session leader, so its
/// pid is also its group id.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        // Fall back to the leader alone if the group is already gone.
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}
