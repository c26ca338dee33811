//! Session types and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Session identifier, assigned monotonically by the registry.
pub type SessionId = u64;

/// Session state in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Process is being spawned.
    Starting,
    /// Process is alive and its output reader is active.
    Running,
    /// Process ended on its own.
    Exited,
    /// Process was stopped by an explicit exit request.
    Terminated,
}

impl SessionState {
    /// Terminal states are final; no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Exited | SessionState::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Exited => "exited",
            SessionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full view of a managed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub command: String,
    pub args: Vec<String>,
    pub state: SessionState,
    /// Populated once the session reaches a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    /// Bytes captured so far.
    pub buffered_bytes: usize,
    /// Bytes not yet returned by a wait.
    pub unconsumed_bytes: usize,
}

/// Summary view of a session for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub state: SessionState,
    /// Command line, e.g. `python3 -i`.
    pub command: String,
}

impl From<&SessionInfo> for SessionSummary {
    fn from(info: &SessionInfo) -> Self {
        Self {
            state: info.state,
            command: command_summary(&info.command, &info.args),
        }
    }
}

/// Render a launch specification as a single display line.
pub fn command_summary(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
