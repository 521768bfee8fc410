use crate::handlers::{api_error, ApiError};
use axum::{http::StatusCode, Json};
use beir_eval::evaluator::{calculate_metrics, MetricsError, MetricsPayload};
use std::collections::BTreeMap;
use tracing::error;

pub async fn calculate(
    Json(payload): Json<MetricsPayload>,
) -> Result<Json<BTreeMap<String, f64>>, ApiError> {
    calculate_metrics(&payload).map(Json).map_err(|e| match e {
        MetricsError::Validation(detail) => api_error(StatusCode::BAD_REQUEST, detail),
        MetricsError::Computation(detail) => {
            error!("Metric computation failed: {}", detail);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, detail)
        }
    })
}
