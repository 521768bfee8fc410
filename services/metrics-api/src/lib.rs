use axum::{
    routing::{get, post},
    Router,
};
use beir_eval::datasets::{ArchiveSource, BeirFetcher};
use beir_eval::evaluator::BeirEvaluator;
use shared::BeirConfig;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;

pub mod config;
pub mod handlers;
pub mod middleware;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BeirConfig>,
    pub fetcher: BeirFetcher,
    pub evaluator: BeirEvaluator,
}

impl AppState {
    pub fn new(config: BeirConfig) -> Self {
        Self {
            fetcher: BeirFetcher::from_config(&config),
            evaluator: BeirEvaluator::default().with_default_k_values(&config.default_k_values),
            config: Arc::new(config),
        }
    }

    /// Builds the state around a specific archive source, e.g. a local
    /// fixture in tests.
    pub fn with_source(config: BeirConfig, source: Arc<dyn ArchiveSource>) -> Self {
        let fetcher = BeirFetcher::new(config.data_root.clone(), source);
        let evaluator = BeirEvaluator::default().with_default_k_values(&config.default_k_values);
        Self {
            config: Arc::new(config),
            fetcher,
            evaluator,
        }
    }

    pub fn data_root(&self) -> &Path {
        self.fetcher.data_root()
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        // Datasets
        .route("/beir/download/:dataset_name", post(handlers::beir::download_dataset))
        .route("/beir/corpus/:dataset_name", get(handlers::beir::get_corpus))
        .route("/beir/queries/:dataset_name", get(handlers::beir::get_queries))
        .route("/beir/qrels/:dataset_name", get(handlers::beir::get_qrels))
        .route("/beir/available-datasets", get(handlers::beir::available_datasets))
        .route("/beir/datasets", get(handlers::beir::list_datasets))
        // Evaluation
        .route("/beir/evaluate/:dataset_name", post(handlers::beir::evaluate_results))
        .route(
            "/beir/evaluate-from-file/:dataset_name",
            post(handlers::beir::evaluate_results_from_file),
        )
        .route("/calculate_metrics", post(handlers::metrics::calculate))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::trace_layer())
                .layer(middleware::cors_layer()),
        )
        .with_state(state)
}
