//! Session management routes.

use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use promptline_core::{SendOptions, StartOptions};
use promptline_types::{
    ExitSessionResponse, SendCommandRequest, SendCommandResponse, SessionId, SessionInfo,
    SessionListResponse, StartSessionRequest, StartSessionResponse, TranscriptResponse,
    WaitForOutputRequest, WaitOutcome,
};
use std::sync::Arc;
use tracing::{debug, info};

type ApiResult<T> = Result<T, ApiError>;

pub async fn list(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let sessions = state.registry.list().into_iter().collect();
    Json(SessionListResponse { sessions })
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<StartSessionRequest>,
) -> ApiResult<Json<StartSessionResponse>> {
    req.validate()?;

    let log_file = match req.log_file {
        Some(path) => Some(path),
        None if req.log => Some(state.next_log_path(&req.command)),
        None => None,
    };

    let mut opts = StartOptions::new(req.command, req.args);
    if let Some(path) = &log_file {
        opts = opts.log_file(path);
    }
    if let Some(cwd) = req.cwd {
        opts = opts.cwd(cwd);
    }

    let command = opts.command.clone();
    let session_id = state.registry.start(opts)?;
    info!(target: "promptline::api", "Started session {} ({})", session_id, command);

    Ok(Json(StartSessionResponse {
        session_id,
        log_file,
    }))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
) -> ApiResult<Json<SessionInfo>> {
    Ok(Json(state.registry.info(id)?))
}

pub async fn wait_for_output(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
    JsonBody(req): JsonBody<WaitForOutputRequest>,
) -> ApiResult<Json<WaitOutcome>> {
    let timeout = req.validate()?;
    debug!(
        target: "promptline::api",
        "Session {} wait for {:?} up to {:?}",
        id, req.prompts, timeout
    );
    let mut outcome = state.registry.wait_for_output(id, &req.prompts, timeout).await?;
    if !req.return_output {
        outcome.text.clear();
    }
    Ok(Json(outcome))
}

pub async fn send_command(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
    JsonBody(req): JsonBody<SendCommandRequest>,
) -> ApiResult<Json<SendCommandResponse>> {
    let opts = SendOptions {
        newline: req.send_newline,
        preflush: req.preflush,
        ..SendOptions::default()
    };
    state.registry.send_command(id, &req.command, opts).await?;
    Ok(Json(SendCommandResponse { ok: true }))
}

pub async fn exit(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
) -> ApiResult<Json<ExitSessionResponse>> {
    let (session_state, exit_code) = state.registry.exit_session(id).await?;
    info!(
        target: "promptline::api",
        "Session {} exited: {} ({:?})",
        id, session_state, exit_code
    );
    Ok(Json(ExitSessionResponse {
        ok: true,
        state: session_state,
        exit_code,
    }))
}

/// Delete a terminal session's record.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
) -> ApiResult<StatusCode> {
    state.registry.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Whole captured output, regardless of what has been consumed.
pub async fn transcript(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<SessionId>,
) -> ApiResult<Json<TranscriptResponse>> {
    let text = state.registry.transcript(id)?;
    Ok(Json(TranscriptResponse {
        session_id: id,
        text,
    }))
}
