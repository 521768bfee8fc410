pub mod beir;
pub mod health;
pub mod metrics;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Longest error detail echoed back to clients.
pub const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}
