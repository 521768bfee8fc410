//! Evaluation of retrieval results against BEIR relevance judgments.
//!
//! Inputs arrive as loosely typed JSON (HTTP bodies, saved result files) and
//! are coerced entry by entry; anything malformed is dropped with a warning.
//! Structural problems never fail the call: they produce an all-zero report
//! together with a [`FallbackReason`] so callers can tell a degraded
//! evaluation from genuinely poor retrieval.

use crate::datasets::normalize::read_json;
use crate::evaluator::metrics::{MetricEngine, TrecEvalEngine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::config::DEFAULT_K_VALUES;
use shared::{MetricFamily, MetricsReport, Qrels, Results};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the relevance judgments for an evaluation come from.
#[derive(Debug, Clone, Copy)]
pub enum QrelsSource<'a> {
    Inline(&'a Value),
    File(&'a Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    EmptyQrels,
    EmptyResults,
    NoCommonQueries,
    EngineFailure,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            FallbackReason::EmptyQrels => "qrels missing, empty or not a mapping",
            FallbackReason::EmptyResults => "results missing, empty or not a mapping",
            FallbackReason::NoCommonQueries => "no common queries between results and qrels",
            FallbackReason::EngineFailure => "metric engine failed",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metrics: MetricsReport,
    pub fallback: Option<FallbackReason>,
    pub common_queries: usize,
}

impl Evaluation {
    fn fallback(k_values: &[usize], reason: FallbackReason) -> Self {
        Self {
            metrics: format_metrics(&create_empty_metrics(k_values), k_values),
            fallback: Some(reason),
            common_queries: 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Every family with each cutoff in `k_values` (bare keys) set to zero.
pub fn create_empty_metrics(k_values: &[usize]) -> MetricsReport {
    let mut report = MetricsReport::default();
    for family in MetricFamily::ALL {
        let scores = report.family_mut(family);
        for k in k_values {
            scores.insert(k.to_string(), 0.0);
        }
    }
    report
}

/// Reshapes a report into display keys (`NDCG@10`, `MAP@10`, `Recall@10`,
/// `P@10`). Each family is seeded with zeros for `k_values`; keys that already
/// carry the family prefix are kept, so formatting twice changes nothing.
pub fn format_metrics(metrics: &MetricsReport, k_values: &[usize]) -> MetricsReport {
    let mut formatted = MetricsReport::default();
    for family in MetricFamily::ALL {
        let prefix = family.display_prefix();
        let target = formatted.family_mut(family);
        for k in k_values {
            target.insert(family.display_key(*k), 0.0);
        }
        for (key, value) in metrics.family(family) {
            let display_key = if key.starts_with(prefix) {
                key.clone()
            } else {
                format!("{}{}", prefix, key)
            };
            target.insert(display_key, *value);
        }
    }
    formatted
}

/// Drops zero cutoffs and duplicates; an empty result means `defaults`.
pub fn normalize_k_values(k_values: &[usize], defaults: &[usize]) -> Vec<usize> {
    let mut normalized: Vec<usize> = Vec::with_capacity(k_values.len());
    for &k in k_values {
        if k == 0 {
            warn!("Ignoring cutoff k=0");
            continue;
        }
        if !normalized.contains(&k) {
            normalized.push(k);
        }
    }
    if normalized.is_empty() {
        defaults.to_vec()
    } else {
        normalized
    }
}

fn relevance_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn score_as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerces a `{query: {doc: grade}}` mapping. A query whose value is not a
/// mapping is kept with no judgments.
pub fn coerce_qrels(raw: &Map<String, Value>) -> Qrels {
    let mut qrels = Qrels::with_capacity(raw.len());
    for (query_id, docs) in raw {
        let judgments = qrels.entry(query_id.clone()).or_default();
        let Some(docs) = docs.as_object() else {
            warn!(
                "Unexpected format for docs in qrels for query {}, skipping.",
                query_id
            );
            continue;
        };
        for (doc_id, relevance) in docs {
            match relevance_as_int(relevance) {
                Some(grade) => {
                    judgments.insert(doc_id.clone(), grade);
                }
                None => warn!(
                    "Skipping invalid non-integer relevance score '{}' for query {}, doc {} in qrels.",
                    relevance, query_id, doc_id
                ),
            }
        }
    }
    qrels
}

/// Coerces a `{query: {doc: score}}` mapping. A query whose value is not a
/// mapping is kept with no retrieved documents.
pub fn coerce_results(raw: &Map<String, Value>) -> Results {
    let mut results = Results::with_capacity(raw.len());
    for (query_id, docs) in raw {
        let Some(docs) = docs.as_object() else {
            warn!(
                "Inner documents for query '{}' in results is not a dict, skipping.",
                query_id
            );
            results.insert(query_id.clone(), HashMap::new());
            continue;
        };
        let mut scored = HashMap::with_capacity(docs.len());
        for (doc_id, score) in docs {
            match score_as_float(score) {
                Some(score) => {
                    scored.insert(doc_id.clone(), score);
                }
                None => warn!(
                    "Skipping invalid score '{}' (cannot convert to float) for query {}, doc {} in results.",
                    score, query_id, doc_id
                ),
            }
        }
        results.insert(query_id.clone(), scored);
    }
    results
}

/// Reads a saved results file: either `{"results": {...}}` or the mapping
/// itself.
pub fn load_results_file(path: &Path) -> crate::Result<Value> {
    let mut content: Value = read_json(path)?;
    if let Some(results) = content.get_mut("results").filter(|r| r.is_object()) {
        return Ok(results.take());
    }
    Ok(content)
}

fn load_qrels_file(path: &Path) -> Value {
    if !path.exists() {
        error!("Qrels file not found at {}", path.display());
        return Value::Null;
    }
    match read_json(path) {
        Ok(qrels) => qrels,
        Err(e) => {
            error!("Failed to read qrels from {}: {}", path.display(), e);
            Value::Null
        }
    }
}

/// Validates inputs, delegates to the metric engine and formats its output.
#[derive(Clone)]
pub struct BeirEvaluator {
    engine: Arc<dyn MetricEngine>,
    default_k_values: Vec<usize>,
}

impl Default for BeirEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(TrecEvalEngine::default()))
    }
}

impl BeirEvaluator {
    pub fn new(engine: Arc<dyn MetricEngine>) -> Self {
        Self {
            engine,
            default_k_values: DEFAULT_K_VALUES.to_vec(),
        }
    }

    /// Cutoffs used when a request brings none that are usable.
    pub fn with_default_k_values(mut self, k_values: &[usize]) -> Self {
        let k_values = normalize_k_values(k_values, &DEFAULT_K_VALUES);
        self.default_k_values = k_values;
        self
    }

    pub fn default_k_values(&self) -> &[usize] {
        &self.default_k_values
    }

    pub fn evaluate(&self, results: &Value, qrels: QrelsSource<'_>, k_values: &[usize]) -> MetricsReport {
        self.evaluate_detailed(results, qrels, k_values).metrics
    }

    pub fn evaluate_detailed(
        &self,
        results: &Value,
        qrels: QrelsSource<'_>,
        k_values: &[usize],
    ) -> Evaluation {
        let k_values = normalize_k_values(k_values, &self.default_k_values);

        let loaded;
        let raw_qrels = match qrels {
            QrelsSource::Inline(value) => value,
            QrelsSource::File(path) => {
                loaded = load_qrels_file(path);
                &loaded
            }
        };

        let raw_qrels = match raw_qrels.as_object() {
            Some(map) if !map.is_empty() => map,
            _ => {
                error!("Invalid qrels format or empty qrels provided");
                return Evaluation::fallback(&k_values, FallbackReason::EmptyQrels);
            }
        };
        let raw_results = match results.as_object() {
            Some(map) if !map.is_empty() => map,
            _ => {
                error!("Invalid results format or empty results from input");
                return Evaluation::fallback(&k_values, FallbackReason::EmptyResults);
            }
        };

        let qrels = coerce_qrels(raw_qrels);
        let results = coerce_results(raw_results);

        let common_queries = results.keys().filter(|q| qrels.contains_key(*q)).count();
        if common_queries == 0 {
            error!("No common queries between results and qrels");
            return Evaluation::fallback(&k_values, FallbackReason::NoCommonQueries);
        }

        info!(
            "Evaluating {} queries against {} qrels",
            results.len(),
            qrels.len()
        );
        info!("Common queries: {}", common_queries);

        match self.engine.compute(&qrels, &results, &k_values) {
            Ok(metrics) => Evaluation {
                metrics: format_metrics(&metrics, &k_values),
                fallback: None,
                common_queries,
            },
            Err(e) => {
                error!("Error in evaluation: {}", e);
                Evaluation::fallback(&k_values, FallbackReason::EngineFailure)
            }
        }
    }

    /// Evaluates a saved results file. A missing or unreadable file yields the
    /// all-zero report.
    pub fn evaluate_from_file(
        &self,
        results_path: &Path,
        qrels_path: &Path,
        k_values: &[usize],
    ) -> Evaluation {
        let results = if results_path.exists() {
            match load_results_file(results_path) {
                Ok(results) => results,
                Err(e) => {
                    error!("Error loading results file: {}", e);
                    Value::Null
                }
            }
        } else {
            error!("Results file not found: {}", results_path.display());
            Value::Null
        };

        self.evaluate_detailed(&results, QrelsSource::File(qrels_path), k_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::metrics::EngineError;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct BrokenEngine;

    impl MetricEngine for BrokenEngine {
        fn compute(
            &self,
            _qrels: &Qrels,
            _results: &Results,
            _k_values: &[usize],
        ) -> Result<MetricsReport, EngineError> {
            Err(EngineError::Failed("boom".to_string()))
        }
    }

    /// Returns bare-keyed output for only the first cutoff.
    struct PartialEngine;

    impl MetricEngine for PartialEngine {
        fn compute(
            &self,
            _qrels: &Qrels,
            _results: &Results,
            k_values: &[usize],
        ) -> Result<MetricsReport, EngineError> {
            let mut report = MetricsReport::default();
            report.ndcg.insert(k_values[0].to_string(), 0.5);
            Ok(report)
        }
    }

    #[test]
    fn test_create_empty_metrics() {
        let report = create_empty_metrics(&[1, 3, 5]);
        for family in MetricFamily::ALL {
            let scores = report.family(family);
            assert_eq!(scores.len(), 3);
            for k in ["1", "3", "5"] {
                assert_eq!(scores[k], 0.0);
            }
        }
    }

    #[test]
    fn test_format_metrics_prefixes_and_is_idempotent() {
        let mut report = create_empty_metrics(&[1, 10]);
        report.ndcg.insert("10".to_string(), 0.42);
        report.precision.insert("P@1".to_string(), 0.7);

        let once = format_metrics(&report, &[1, 10]);
        let twice = format_metrics(&once, &[1, 10]);

        assert_eq!(once, twice);
        assert_eq!(once.ndcg["NDCG@10"], 0.42);
        assert_eq!(once.precision["P@1"], 0.7);
        assert_eq!(once.recall["Recall@1"], 0.0);
        assert!(once.map.contains_key("MAP@10"));
        assert!(!once.ndcg.contains_key("NDCG@NDCG@10"));
        assert_eq!(once.ndcg.len(), 2);
    }

    #[test]
    fn test_single_matching_query() {
        let evaluator = BeirEvaluator::default();
        let results = json!({"q1": {"d1": 0.9}});
        let qrels = json!({"q1": {"d1": 1}});

        let evaluation = evaluator.evaluate_detailed(&results, QrelsSource::Inline(&qrels), &[1]);

        assert!(!evaluation.is_degraded());
        assert_eq!(evaluation.common_queries, 1);
        for family in MetricFamily::ALL {
            let value = evaluation.metrics.family(family)[&family.display_key(1)];
            assert!((0.0..=1.0).contains(&value));
        }
        assert_eq!(evaluation.metrics.ndcg["NDCG@1"], 1.0);
    }

    #[test]
    fn test_disjoint_queries_fall_back_to_zero() {
        let evaluator = BeirEvaluator::default();
        let results = json!({"q2": {"d1": 0.9}});
        let qrels = json!({"q1": {"d1": 1}});

        let evaluation = evaluator.evaluate_detailed(&results, QrelsSource::Inline(&qrels), &[1, 3]);

        assert_eq!(evaluation.fallback, Some(FallbackReason::NoCommonQueries));
        assert!(evaluation.metrics.is_all_zero());
        assert_eq!(evaluation.metrics.map.len(), 2);
    }

    #[test]
    fn test_empty_inputs_fall_back_in_order() {
        let evaluator = BeirEvaluator::default();

        let evaluation =
            evaluator.evaluate_detailed(&json!({}), QrelsSource::Inline(&json!({})), &[1]);
        assert_eq!(evaluation.fallback, Some(FallbackReason::EmptyQrels));

        let evaluation = evaluator.evaluate_detailed(
            &json!([1, 2]),
            QrelsSource::Inline(&json!({"q1": {"d1": 1}})),
            &[1],
        );
        assert_eq!(evaluation.fallback, Some(FallbackReason::EmptyResults));
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let evaluator = BeirEvaluator::default();
        let results = json!({"q1": {"d1": "0.9", "d2": null, "d3": [1]}, "q2": "oops"});
        let qrels = json!({"q1": {"d1": "1", "d2": "high", "d9": 1.0}});

        let evaluation = evaluator.evaluate_detailed(&results, QrelsSource::Inline(&qrels), &[1]);

        assert!(!evaluation.is_degraded());
        assert_eq!(evaluation.metrics.precision["P@1"], 1.0);
        assert_eq!(evaluation.metrics.recall["Recall@1"], 0.5);
    }

    #[test]
    fn test_coercion_rules() {
        let qrels = coerce_qrels(
            json!({"q1": {"a": 2, "b": 1.9, "c": true, "d": " 3 ", "e": "2.5", "f": null}, "q2": 5})
                .as_object()
                .unwrap(),
        );
        assert_eq!(qrels["q1"]["a"], 2);
        assert_eq!(qrels["q1"]["b"], 1);
        assert_eq!(qrels["q1"]["c"], 1);
        assert_eq!(qrels["q1"]["d"], 3);
        assert!(!qrels["q1"].contains_key("e"));
        assert!(!qrels["q1"].contains_key("f"));
        assert!(qrels["q2"].is_empty());

        let results = coerce_results(json!({"q1": {"a": 1, "b": "0.25", "c": {}}}).as_object().unwrap());
        assert_eq!(results["q1"]["a"], 1.0);
        assert_eq!(results["q1"]["b"], 0.25);
        assert!(!results["q1"].contains_key("c"));
    }

    #[test]
    fn test_engine_failure_degrades() {
        let evaluator = BeirEvaluator::new(Arc::new(BrokenEngine));
        let results = json!({"q1": {"d1": 0.9}});
        let qrels = json!({"q1": {"d1": 1}});

        let evaluation = evaluator.evaluate_detailed(&results, QrelsSource::Inline(&qrels), &[1, 5]);

        assert_eq!(evaluation.fallback, Some(FallbackReason::EngineFailure));
        assert!(evaluation.metrics.is_all_zero());
        assert_eq!(evaluation.metrics.ndcg.len(), 2);
    }

    #[test]
    fn test_missing_engine_values_default_to_zero() {
        let evaluator = BeirEvaluator::new(Arc::new(PartialEngine));
        let results = json!({"q1": {"d1": 0.9}});
        let qrels = json!({"q1": {"d1": 1}});

        let report = evaluator.evaluate(&results, QrelsSource::Inline(&qrels), &[3, 10]);

        assert_eq!(report.ndcg["NDCG@3"], 0.5);
        assert_eq!(report.ndcg["NDCG@10"], 0.0);
        assert_eq!(report.precision["P@3"], 0.0);
    }

    #[test]
    fn test_k_values_default_when_empty() {
        assert_eq!(normalize_k_values(&[], &DEFAULT_K_VALUES), DEFAULT_K_VALUES.to_vec());
        assert_eq!(normalize_k_values(&[0, 5, 5, 1], &DEFAULT_K_VALUES), vec![5, 1]);
        assert_eq!(normalize_k_values(&[0], &[2, 4]), vec![2, 4]);
    }

    #[test]
    fn test_configured_defaults_replace_unusable_cutoffs() {
        let evaluator = BeirEvaluator::default().with_default_k_values(&[2, 4]);
        let qrels = json!({"q1": {"d1": 1}});
        let results = json!({"q1": {"d1": 0.9}});

        let evaluation = evaluator.evaluate_detailed(&results, QrelsSource::Inline(&qrels), &[0]);

        let keys: Vec<&String> = evaluation.metrics.ndcg.keys().collect();
        assert_eq!(keys, vec!["NDCG@2", "NDCG@4"]);

        let fallback = evaluator.evaluate_detailed(&json!({}), QrelsSource::Inline(&qrels), &[]);
        assert_eq!(fallback.metrics.precision.len(), 2);
        assert!(fallback.metrics.precision.contains_key("P@4"));
    }

    #[test]
    fn test_evaluate_from_files() {
        let dir = TempDir::new().unwrap();
        let results_path = dir.path().join("run.json");
        let qrels_path = dir.path().join("qrels.json");
        fs::write(&results_path, r#"{"results": {"q1": {"d1": 0.9, "d2": 0.1}}}"#).unwrap();
        fs::write(&qrels_path, r#"{"q1": {"d1": 1.0}}"#).unwrap();

        let evaluator = BeirEvaluator::default();
        let evaluation = evaluator.evaluate_from_file(&results_path, &qrels_path, &[1]);
        assert_eq!(evaluation.metrics.precision["P@1"], 1.0);

        let missing = evaluator.evaluate_from_file(&dir.path().join("nope.json"), &qrels_path, &[1]);
        assert_eq!(missing.fallback, Some(FallbackReason::EmptyResults));

        let no_qrels = evaluator.evaluate_from_file(&results_path, &dir.path().join("none.json"), &[1]);
        assert_eq!(no_qrels.fallback, Some(FallbackReason::EmptyQrels));
    }

    #[test]
    fn test_bare_results_file_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.json");
        fs::write(&path, r#"{"q1": {"d1": 0.5}}"#).unwrap();

        let results = load_results_file(&path).unwrap();
        assert_eq!(results, json!({"q1": {"d1": 0.5}}));
    }
}
