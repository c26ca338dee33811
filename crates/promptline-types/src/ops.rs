//! Typed request and response bodies for the session operations.
//!
//! Requests are validated here, at the boundary, so the core only ever sees
//! well-formed arguments.

use crate::{SessionId, SessionState, SessionSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default `wait_for_output` timeout in seconds.
pub const DEFAULT_WAIT_TIMEOUT_SECS: f64 = 5.0;

/// Longest wait a single request may ask for (one day).
pub const MAX_WAIT_TIMEOUT_SECS: f64 = 86_400.0;

/// A request failed boundary validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidRequest(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Explicit transcript path.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Create an auto-named transcript when no `log_file` is given.
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl StartSessionRequest {
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.command.trim().is_empty() {
            return Err(InvalidRequest("command must not be empty".into()));
        }
        if self.command.contains('\0') || self.args.iter().any(|a| a.contains('\0')) {
            return Err(InvalidRequest("command and args must not contain NUL bytes".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitForOutputRequest {
    /// Substrings to look for; empty means drain whatever arrives.
    #[serde(default)]
    pub prompts: Vec<String>,
    /// Seconds to wait.
    #[serde(default = "default_wait_timeout")]
    pub timeout: f64,
    /// When false only the status is returned; the output is still consumed.
    #[serde(default = "default_true")]
    pub return_output: bool,
}

fn default_wait_timeout() -> f64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

impl WaitForOutputRequest {
    /// Check the prompts and convert the timeout into a `Duration`.
    pub fn validate(&self) -> Result<Duration, InvalidRequest> {
        if let Some(index) = self.prompts.iter().position(String::is_empty) {
            return Err(InvalidRequest(format!("prompt {} is empty", index)));
        }
        parse_timeout(self.timeout)
    }
}

/// Validate a timeout given in seconds.
pub fn parse_timeout(secs: f64) -> Result<Duration, InvalidRequest> {
    if !secs.is_finite() {
        return Err(InvalidRequest(format!("timeout must be a finite number, got {}", secs)));
    }
    if secs < 0.0 {
        return Err(InvalidRequest(format!("timeout must not be negative, got {}", secs)));
    }
    if secs > MAX_WAIT_TIMEOUT_SECS {
        return Err(InvalidRequest(format!(
            "timeout must be at most {} seconds, got {}",
            MAX_WAIT_TIMEOUT_SECS, secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Result of a `wait_for_output` call.
///
/// A timeout is a normal outcome carrying partial output, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOutcome {
    /// The prompt that matched, if any.
    pub matched: Option<String>,
    /// Unconsumed text returned by this call.
    pub text: String,
    pub timed_out: bool,
    pub process_ended: bool,
    /// Unconsumed bytes still buffered after this call.
    pub remaining_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCommandRequest {
    pub command: String,
    /// Append a line terminator.
    #[serde(default = "default_true")]
    pub send_newline: bool,
    /// Skip any unconsumed output before writing.
    #[serde(default)]
    pub preflush: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCommandResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSessionResponse {
    pub ok: bool,
    pub state: SessionState,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: BTreeMap<SessionId, SessionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub session_id: SessionId,
    pub text: String,
}
