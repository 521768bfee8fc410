use crate::handlers::{api_error, ApiError, MAX_DETAIL_CHARS};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use beir_eval::datasets::normalize::read_json;
use beir_eval::datasets::{available_dataset_names, list_local_datasets, validate_dataset_name};
use beir_eval::evaluator::{load_results_file, Evaluation, FallbackReason, QrelsSource};
use beir_eval::BeirError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::utils::truncate_chars;
use shared::{Artifact, DatasetSummary, MetricsReport};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub dataset_name: String,
    pub corpus_path: String,
    pub queries_path: String,
    pub qrels_path: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub results: Value,
    #[serde(default)]
    pub k_values: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateFromFileRequest {
    pub file_path: PathBuf,
    #[serde(default)]
    pub k_values: Option<Vec<usize>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub metrics: MetricsReport,
    pub dataset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

impl EvaluationResponse {
    fn new(dataset_name: String, evaluation: Evaluation) -> Self {
        Self {
            metrics: evaluation.metrics,
            dataset_name,
            fallback_reason: evaluation.fallback,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableDatasetsResponse {
    pub available_datasets: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<DatasetSummary>,
}

fn truncated(prefix: &str, e: impl ToString) -> String {
    let message = e.to_string();
    format!("{}: {}", prefix, truncate_chars(&message, MAX_DETAIL_CHARS))
}

fn task_failed(e: tokio::task::JoinError) -> ApiError {
    error!("Blocking task failed: {}", e);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        truncated("Internal error", e),
    )
}

/// Runs file-bound work on the blocking pool so large datasets do not stall
/// the runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(task_failed)
}

fn checked_name(dataset_name: &str) -> Result<(), ApiError> {
    validate_dataset_name(dataset_name)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

pub async fn download_dataset(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
) -> Result<Json<DownloadResponse>, ApiError> {
    checked_name(&dataset_name)?;
    info!("Download requested for dataset {}", dataset_name);

    match state.fetcher.fetch(&dataset_name).await {
        Ok(paths) => Ok(Json(DownloadResponse {
            message: format!(
                "Dataset {} downloaded and processed successfully",
                dataset_name
            ),
            dataset_name,
            corpus_path: paths.corpus_path.display().to_string(),
            queries_path: paths.queries_path.display().to_string(),
            qrels_path: paths.qrels_path.display().to_string(),
            success: true,
        })),
        Err(e @ BeirError::InvalidDatasetName(_)) => {
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            error!("Error downloading dataset {}: {}", dataset_name, e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                truncated("Error downloading dataset", e),
            ))
        }
    }
}

fn artifact_title(artifact: Artifact) -> &'static str {
    match artifact {
        Artifact::Corpus => "Corpus",
        Artifact::Queries => "Queries",
        Artifact::Qrels => "Qrels",
    }
}

async fn read_artifact(
    state: &AppState,
    dataset_name: &str,
    artifact: Artifact,
) -> Result<Json<Value>, ApiError> {
    checked_name(dataset_name)?;
    let path = state.data_root().join(dataset_name).join(artifact.file_name());

    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!(
                "{} for dataset {} not found. Please download it first.",
                artifact_title(artifact),
                dataset_name
            ),
        ));
    }

    let read_path = path.clone();
    let content = blocking(move || read_json::<Value>(&read_path)).await?;
    content.map(Json).map_err(|e| {
        error!("Failed to read {}: {}", path.display(), e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            truncated(&format!("Error reading {} file", artifact), e),
        )
    })
}

pub async fn get_corpus(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    read_artifact(&state, &dataset_name, Artifact::Corpus).await
}

pub async fn get_queries(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    read_artifact(&state, &dataset_name, Artifact::Queries).await
}

pub async fn get_qrels(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    read_artifact(&state, &dataset_name, Artifact::Qrels).await
}

fn k_values_or_default(state: &AppState, k_values: Option<Vec<usize>>) -> Vec<usize> {
    match k_values {
        Some(k_values) if !k_values.is_empty() => k_values,
        _ => state.config.default_k_values.clone(),
    }
}

pub async fn evaluate_results(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    checked_name(&dataset_name)?;
    let k_values = k_values_or_default(&state, request.k_values);
    let qrels_path = state
        .data_root()
        .join(&dataset_name)
        .join(Artifact::Qrels.file_name());

    if !qrels_path.is_file() {
        warn!(
            "Qrels file not found for {}, returning empty metrics",
            dataset_name
        );
    }

    let evaluator = state.evaluator.clone();
    let evaluation = blocking(move || {
        evaluator.evaluate_detailed(&request.results, QrelsSource::File(&qrels_path), &k_values)
    })
    .await?;
    Ok(Json(EvaluationResponse::new(dataset_name, evaluation)))
}

pub async fn evaluate_results_from_file(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
    Json(request): Json<EvaluateFromFileRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    checked_name(&dataset_name)?;
    let k_values = k_values_or_default(&state, request.k_values);

    if !request.file_path.is_file() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Results file not found: {}", request.file_path.display()),
        ));
    }

    let file_path = request.file_path.clone();
    let results = blocking(move || load_results_file(&file_path))
        .await?
        .map_err(|e| match e {
            BeirError::Json(e) => api_error(
                StatusCode::BAD_REQUEST,
                truncated("Invalid JSON in results file", e),
            ),
            e => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                truncated("Error reading results file", e),
            ),
        })?;

    let qrels_path = state
        .data_root()
        .join(&dataset_name)
        .join(Artifact::Qrels.file_name());
    let evaluator = state.evaluator.clone();
    let evaluation = blocking(move || {
        evaluator.evaluate_detailed(&results, QrelsSource::File(&qrels_path), &k_values)
    })
    .await?;
    Ok(Json(EvaluationResponse::new(dataset_name, evaluation)))
}

pub async fn available_datasets(
    State(state): State<AppState>,
) -> Result<Json<AvailableDatasetsResponse>, ApiError> {
    let data_root = state.data_root().to_path_buf();
    blocking(move || available_dataset_names(&data_root))
        .await?
        .map(|available_datasets| Json(AvailableDatasetsResponse { available_datasets }))
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                truncated("Error listing datasets", e),
            )
        })
}

pub async fn list_datasets(
    State(state): State<AppState>,
) -> Result<Json<DatasetsResponse>, ApiError> {
    let data_root = state.data_root().to_path_buf();
    blocking(move || list_local_datasets(&data_root))
        .await?
        .map(|datasets| Json(DatasetsResponse { datasets }))
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                truncated("Error listing datasets", e),
            )
        })
}
