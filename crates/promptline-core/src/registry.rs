//! Session registry orchestrating process sessions.

use crate::process::{LaunchSpec, ProcessHandle};
use crate::session::{SendOptions, Session};
use crate::transcript::TranscriptSink;
use crate::{PromptlineError, Result};
use dashmap::DashMap;
use promptline_types::{SessionId, SessionInfo, SessionState, SessionSummary, WaitOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Configuration for the session registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long `exit_session` waits after SIGTERM before SIGKILL.
    pub grace_period: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
        }
    }
}

/// Options for starting a new session.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub command: String,
    pub args: Vec<String>,
    pub log_file: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
}

impl StartOptions {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            log_file: None,
            cwd: None,
        }
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Table of sessions keyed by id.
///
/// Built once by the embedding server and shared by reference; `shutdown`
/// is the teardown path.
pub struct SessionRegistry {
    config: RegistryConfig,
    next_id: AtomicU64,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawn a process and register it as a new session.
    ///
    /// The id is allocated only once the spawn succeeded, so failed starts
    /// never consume ids.
    pub fn start(&self, opts: StartOptions) -> Result<SessionId> {
        let sink = match &opts.log_file {
            Some(path) => Some(TranscriptSink::create(path).map_err(|e| {
                warn!(target: "promptline::registry", "Cannot create transcript {:?}: {}", path, e);
                PromptlineError::Io(e)
            })?),
            None => None,
        };

        let spec = LaunchSpec {
            command: opts.command,
            args: opts.args,
            cwd: opts.cwd,
        };
        let (process, output) = ProcessHandle::spawn(&spec)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Session::start(id, spec, process, output, sink)?;
        self.sessions.insert(id, session);

        info!(target: "promptline::registry", "Registered session {}", id);
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(PromptlineError::SessionNotFound(id))
    }

    /// Snapshot of all sessions, ascending by id.
    pub fn list(&self) -> Vec<(SessionId, SessionSummary)> {
        let mut sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by_key(|s| s.id());
        sessions.iter().map(|s| (s.id(), s.summary())).collect()
    }

    pub fn info(&self, id: SessionId) -> Result<SessionInfo> {
        Ok(self.get(id)?.info())
    }

    pub fn transcript(&self, id: SessionId) -> Result<String> {
        Ok(self.get(id)?.transcript())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn send_command(&self, id: SessionId, command: &str, opts: SendOptions) -> Result<()> {
        let session = self.get(id)?;
        session.send_command(command, opts).await
    }

    pub async fn wait_for_output(
        &self,
        id: SessionId,
        prompts: &[String],
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        if prompts.iter().any(String::is_empty) {
            return Err(PromptlineError::InvalidArgument("prompts must not be empty strings".into()));
        }
        let session = self.get(id)?;
        session.wait_for_output(prompts, timeout).await
    }

    /// Stop a session. Repeated calls return the same terminal state.
    pub async fn exit_session(&self, id: SessionId) -> Result<(SessionState, Option<i32>)> {
        let session = self.get(id)?;
        Ok(session.exit(self.config.grace_period).await)
    }

    /// Delete a terminal session's record.
    pub fn remove(&self, id: SessionId) -> Result<()> {
        let session = self.get(id)?;
        let state = session.state();
        if !state.is_terminal() {
            return Err(PromptlineError::SessionStillRunning(id));
        }
        self.sessions.remove(&id);
        debug!(target: "promptline::registry", "Removed session {} ({})", id, state);
        Ok(())
    }

    /// Terminate and remove sessions nobody has touched for `max_idle`.
    /// Returns the removed ids.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let idle: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for() >= max_idle)
            .map(|e| e.value().clone())
            .collect();

        let mut removed = Vec::with_capacity(idle.len());
        for session in idle {
            let id = session.id();
            if !session.state().is_terminal() {
                info!(target: "promptline::registry", "Session {} idle for {:?}, terminating", id, session.idle_for());
                session.exit(self.config.grace_period).await;
            }
            self.sessions.remove(&id);
            removed.push(id);
        }
        removed
    }

    /// Terminate every live session. Records stay for inspection.
    pub async fn shutdown(&self) {
        let live: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|e| !e.value().state().is_terminal())
            .map(|e| e.value().clone())
            .collect();
        if live.is_empty() {
            return;
        }

        info!(target: "promptline::registry", "Shutting down {} live sessions", live.len());
        let grace = self.config.grace_period;
        let mut tasks = JoinSet::new();
        for session in live {
            tasks.spawn(async move { session.exit(grace).await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(target: "promptline::registry", "Session shutdown task failed: {}", e);
            }
        }
    }
}
