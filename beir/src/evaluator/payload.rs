use crate::evaluator::bleu::corpus_bleu;
use crate::evaluator::classification::{ClassificationData, ClassificationMetric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Computation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BleuData {
    pub predictions: Vec<String>,
    pub references: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub metrics_to_calculate: Vec<String>,
    #[serde(default)]
    pub bleu_data: Option<BleuData>,
    #[serde(default)]
    pub classification_data: Option<ClassificationData>,
}

impl MetricsPayload {
    fn requests(&self, metric: &str) -> bool {
        self.metrics_to_calculate.iter().any(|m| m == metric)
    }

    fn requested_classification(&self) -> Vec<ClassificationMetric> {
        [
            ClassificationMetric::F1,
            ClassificationMetric::Recall,
            ClassificationMetric::Precision,
        ]
        .into_iter()
        .filter(|metric| self.requests(metric.name()))
        .collect()
    }

    /// Every requested metric must come with its data block.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.requests("bleu") && self.bleu_data.is_none() {
            return Err(MetricsError::Validation(
                "bleu_data is required when 'bleu' is in metrics_to_calculate".to_string(),
            ));
        }
        if !self.requested_classification().is_empty() && self.classification_data.is_none() {
            return Err(MetricsError::Validation(
                "classification_data is required when 'f1', 'recall', or 'precision' are in metrics_to_calculate"
                    .to_string(),
            ));
        }
        if let Some(data) = &self.classification_data {
            data.validate()?;
        }
        Ok(())
    }
}

fn ensure_finite(name: &str, value: f64) -> Result<f64, MetricsError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricsError::Computation(format!(
            "Error calculating {}: result is not a finite number",
            name
        )))
    }
}

/// Computes every requested BLEU and classification metric, keyed by metric
/// name. Unknown metric names are ignored.
pub fn calculate_metrics(payload: &MetricsPayload) -> Result<BTreeMap<String, f64>, MetricsError> {
    debug!("Received metrics payload: {:?}", payload.metrics_to_calculate);
    payload.validate()?;

    let mut results = BTreeMap::new();

    if let (true, Some(bleu)) = (payload.requests("bleu"), &payload.bleu_data) {
        let score = corpus_bleu(&bleu.predictions, &bleu.references)?;
        results.insert("bleu".to_string(), ensure_finite("BLEU", score)?);
    }

    if let Some(data) = &payload.classification_data {
        for metric in payload.requested_classification() {
            let value = data.compute(metric)?;
            results.insert(metric.name().to_string(), ensure_finite(metric.name(), value)?);
        }
    }

    if results.is_empty() {
        return Err(MetricsError::Validation(
            "No metrics were calculated. Check requested metrics and provided data.".to_string(),
        ));
    }

    info!("Calculated metrics: {:?}", results);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> MetricsPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_bleu_and_classification_together() {
        let payload = parse(json!({
            "metrics_to_calculate": ["bleu", "f1", "recall"],
            "bleu_data": {
                "predictions": ["the cat sat on the mat"],
                "references": [["the cat sat on the mat", "a cat was on a mat"]]
            },
            "classification_data": {
                "predictions": ["yes", "no", "yes"],
                "ground_truth": ["yes", "no", "no"],
                "average": "binary",
                "positive_label": "yes"
            }
        }));

        let results = calculate_metrics(&payload).unwrap();

        assert_eq!(results.len(), 3);
        assert!((results["bleu"] - 1.0).abs() < 1e-9);
        assert!((results["f1"] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(results["recall"], 1.0);
        assert!(!results.contains_key("precision"));
    }

    #[test]
    fn test_missing_data_block_is_validation_error() {
        let payload = parse(json!({"metrics_to_calculate": ["bleu"]}));
        assert!(matches!(calculate_metrics(&payload), Err(MetricsError::Validation(_))));

        let payload = parse(json!({"metrics_to_calculate": ["precision"]}));
        assert!(matches!(calculate_metrics(&payload), Err(MetricsError::Validation(_))));
    }

    #[test]
    fn test_nothing_computed_is_validation_error() {
        let payload = parse(json!({"metrics_to_calculate": ["rouge"]}));
        let err = calculate_metrics(&payload).unwrap_err();
        assert!(err.to_string().starts_with("No metrics were calculated"));
    }

    #[test]
    fn test_bleu_length_mismatch() {
        let payload = parse(json!({
            "metrics_to_calculate": ["bleu"],
            "bleu_data": {"predictions": ["a", "b"], "references": [["a"]]}
        }));
        assert!(matches!(calculate_metrics(&payload), Err(MetricsError::Validation(_))));
    }
}
