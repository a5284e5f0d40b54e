//! HTTP endpoints.
//!
//! Errors leave handlers as `(StatusCode, Json<ErrorResponse>)` in the
//! OpenAI error shape.

mod chat;
mod health;

use axum::http::StatusCode;
use axum::Json;

use threadgate_core::chat::ErrorResponse;
use threadgate_core::BridgeError;

pub use chat::chat_completions;
pub use health::{health, HealthResponse};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(err: &BridgeError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err)))
}
