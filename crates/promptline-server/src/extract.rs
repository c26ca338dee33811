//! Request extractors whose rejections use the API error body.

use crate::error::ApiError;
use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    FromRequest, FromRequestParts,
};
use promptline_core::PromptlineError;

/// JSON request body; malformed input is an `invalid_argument` 400.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Path parameters; an unparsable session id is an `invalid_argument` 400.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(PromptlineError::InvalidArgument(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(PromptlineError::InvalidArgument(rejection.body_text()))
    }
}
