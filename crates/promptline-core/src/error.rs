//! Error types for promptline.

use promptline_types::{InvalidRequest, SessionId, SessionState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptlineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Process spawn failed: {0}")]
    SpawnFailure(String),

    #[error("Session {id} is not running (state: {state}, exit code: {exit_code:?})")]
    SessionNotRunning {
        id: SessionId,
        state: SessionState,
        exit_code: Option<i32>,
    },

    #[error("Write to session {id} failed: {source}")]
    WriteFailure {
        id: SessionId,
        #[source]
        source: std::io::Error,
    },

    #[error("Session {0} is still running; exit it before removal")]
    SessionStillRunning(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PromptlineError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PromptlineError::InvalidArgument(_) => "invalid_argument",
            PromptlineError::SessionNotFound(_) => "session_not_found",
            PromptlineError::SpawnFailure(_) => "spawn_failure",
            PromptlineError::SessionNotRunning { .. } => "session_not_running",
            PromptlineError::WriteFailure { .. } => "write_failure",
            PromptlineError::SessionStillRunning(_) => "session_still_running",
            PromptlineError::Io(_) => "io",
        }
    }
}

impl From<InvalidRequest> for PromptlineError {
    fn from(e: InvalidRequest) -> Self {
        PromptlineError::InvalidArgument(e.0)
    }
}
