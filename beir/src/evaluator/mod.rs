pub mod beir;
pub mod bleu;
pub mod classification;
pub mod metrics;
pub mod payload;

pub use beir::{
    create_empty_metrics, format_metrics, load_results_file, BeirEvaluator, Evaluation,
    FallbackReason, QrelsSource,
};
pub use classification::{Average, ClassificationData, Label, ZeroDivision};
pub use metrics::{EngineError, MetricEngine, TrecEvalEngine};
pub use payload::{calculate_metrics, BleuData, MetricsError, MetricsPayload};
