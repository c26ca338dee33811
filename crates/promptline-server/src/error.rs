//! Mapping of session errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use promptline_core::PromptlineError;
use promptline_types::InvalidRequest;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Error returned by every API handler.
#[derive(Debug)]
pub struct ApiError(pub PromptlineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PromptlineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            PromptlineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            PromptlineError::SpawnFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PromptlineError::SessionNotRunning { .. } => StatusCode::CONFLICT,
            PromptlineError::WriteFailure { .. } => StatusCode::BAD_GATEWAY,
            PromptlineError::SessionStillRunning(_) => StatusCode::CONFLICT,
            PromptlineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PromptlineError> for ApiError {
    fn from(e: PromptlineError) -> Self {
        ApiError(e)
    }
}

impl From<InvalidRequest> for ApiError {
    fn from(e: InvalidRequest) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(target: "promptline::api", "{}", self.0);
        } else {
            warn!(target: "promptline::api", "{}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}
