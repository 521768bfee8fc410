use shared::{MetricFamily, MetricsReport, Qrels, Results};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No cutoffs requested")]
    NoCutoffs,
    #[error("Invalid cutoff: {0}")]
    InvalidCutoff(usize),
    #[error("No queries in common between results and qrels")]
    NoCommonQueries,
    #[error("Metric engine failed: {0}")]
    Failed(String),
}

/// Computes ranking metrics for a set of results against relevance
/// judgments. Implementations return every family keyed by display key
/// (`NDCG@10`, `MAP@10`, `Recall@10`, `P@10`) for each requested cutoff.
pub trait MetricEngine: Send + Sync {
    fn compute(
        &self,
        qrels: &Qrels,
        results: &Results,
        k_values: &[usize],
    ) -> Result<MetricsReport, EngineError>;
}

/// Native engine following trec_eval conventions (`ndcg_cut`, `map_cut`,
/// `recall`, `P`), averaged over the queries present in both inputs.
#[derive(Debug, Clone)]
pub struct TrecEvalEngine {
    ignore_identical_ids: bool,
}

impl Default for TrecEvalEngine {
    fn default() -> Self {
        Self {
            ignore_identical_ids: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CutoffScores {
    ndcg: f64,
    map: f64,
    recall: f64,
    precision: f64,
}

impl TrecEvalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, a retrieved document whose id equals the query id is dropped
    /// before ranking.
    pub fn with_ignore_identical_ids(mut self, ignore: bool) -> Self {
        self.ignore_identical_ids = ignore;
        self
    }

    /// Orders documents by score descending, ties broken by doc id descending.
    fn rank<'a>(&self, query_id: &str, docs: &'a HashMap<String, f64>) -> Vec<&'a str> {
        let mut scored: Vec<(&str, f64)> = docs
            .iter()
            .filter(|(doc_id, _)| !(self.ignore_identical_ids && doc_id.as_str() == query_id))
            .map(|(doc_id, score)| (doc_id.as_str(), *score))
            .collect();
        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => b.0.cmp(a.0),
            other => other,
        });
        scored.into_iter().map(|(doc_id, _)| doc_id).collect()
    }

    fn score_query(
        ranked: &[&str],
        judgments: &HashMap<String, i64>,
        k: usize,
    ) -> CutoffScores {
        let num_relevant = judgments.values().filter(|rel| **rel >= 1).count();

        CutoffScores {
            ndcg: Self::calculate_ndcg(ranked, judgments, k),
            map: Self::calculate_map(ranked, judgments, k, num_relevant),
            recall: Self::calculate_recall(ranked, judgments, k, num_relevant),
            precision: Self::calculate_precision(ranked, judgments, k),
        }
    }

    fn is_relevant(judgments: &HashMap<String, i64>, doc_id: &str) -> bool {
        judgments.get(doc_id).map_or(false, |rel| *rel >= 1)
    }

    fn calculate_ndcg(ranked: &[&str], judgments: &HashMap<String, i64>, k: usize) -> f64 {
        let gain = |rel: i64| rel.max(0) as f64;
        let discount = |i: usize| (i as f64 + 2.0).log2();

        let dcg: f64 = ranked
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, doc_id)| gain(judgments.get(*doc_id).copied().unwrap_or(0)) / discount(i))
            .sum();

        let mut ideal: Vec<i64> = judgments.values().copied().filter(|rel| *rel > 0).collect();
        ideal.sort_unstable_by(|a, b| b.cmp(a));
        let idcg: f64 = ideal
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, rel)| gain(rel) / discount(i))
            .sum();

        if idcg == 0.0 {
            0.0
        } else {
            dcg / idcg
        }
    }

    fn calculate_map(
        ranked: &[&str],
        judgments: &HashMap<String, i64>,
        k: usize,
        num_relevant: usize,
    ) -> f64 {
        if num_relevant == 0 {
            return 0.0;
        }

        let mut sum_precision = 0.0;
        let mut relevant_found = 0;
        for (i, doc_id) in ranked.iter().take(k).enumerate() {
            if Self::is_relevant(judgments, doc_id) {
                relevant_found += 1;
                sum_precision += relevant_found as f64 / (i + 1) as f64;
            }
        }

        sum_precision / num_relevant as f64
    }

    fn calculate_recall(
        ranked: &[&str],
        judgments: &HashMap<String, i64>,
        k: usize,
        num_relevant: usize,
    ) -> f64 {
        if num_relevant == 0 {
            return 0.0;
        }

        let relevant_in_top_k = ranked
            .iter()
            .take(k)
            .filter(|doc_id| Self::is_relevant(judgments, doc_id))
            .count();

        relevant_in_top_k as f64 / num_relevant as f64
    }

    /// Precision at a fixed depth: the denominator is `k` even when fewer
    /// documents were retrieved.
    fn calculate_precision(ranked: &[&str], judgments: &HashMap<String, i64>, k: usize) -> f64 {
        let relevant_in_top_k = ranked
            .iter()
            .take(k)
            .filter(|doc_id| Self::is_relevant(judgments, doc_id))
            .count();

        relevant_in_top_k as f64 / k as f64
    }
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

impl MetricEngine for TrecEvalEngine {
    fn compute(
        &self,
        qrels: &Qrels,
        results: &Results,
        k_values: &[usize],
    ) -> Result<MetricsReport, EngineError> {
        if k_values.is_empty() {
            return Err(EngineError::NoCutoffs);
        }
        if let Some(k) = k_values.iter().find(|k| **k == 0) {
            return Err(EngineError::InvalidCutoff(*k));
        }

        let mut totals = vec![CutoffScores::default(); k_values.len()];
        let mut evaluated = 0usize;

        for (query_id, docs) in results {
            let Some(judgments) = qrels.get(query_id) else {
                continue;
            };
            evaluated += 1;

            let ranked = self.rank(query_id, docs);
            for (total, &k) in totals.iter_mut().zip(k_values) {
                let scores = Self::score_query(&ranked, judgments, k);
                total.ndcg += scores.ndcg;
                total.map += scores.map;
                total.recall += scores.recall;
                total.precision += scores.precision;
            }
        }

        if evaluated == 0 {
            return Err(EngineError::NoCommonQueries);
        }

        let count = evaluated as f64;
        let mut report = MetricsReport::default();
        for (total, &k) in totals.iter().zip(k_values) {
            let averaged = [
                (MetricFamily::Ndcg, total.ndcg),
                (MetricFamily::Map, total.map),
                (MetricFamily::Recall, total.recall),
                (MetricFamily::Precision, total.precision),
            ];
            for (family, sum) in averaged {
                report
                    .family_mut(family)
                    .insert(family.display_key(k), round5(sum / count));
            }
        }

        Ok(report)
    }
}
