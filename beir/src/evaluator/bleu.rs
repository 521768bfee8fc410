use crate::evaluator::payload::MetricsError;
use std::collections::HashMap;

const MAX_ORDER: usize = 4;
const SMOOTHING_EPSILON: f64 = 0.1;

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Clipped n-gram matches and the number of hypothesis n-grams (at least 1).
fn modified_precision(hypothesis: &[String], references: &[Vec<String>], n: usize) -> (usize, usize) {
    let hyp_counts = ngram_counts(hypothesis, n);

    let mut max_ref_counts: HashMap<&[String], usize> = HashMap::new();
    for reference in references {
        for (ngram, count) in ngram_counts(reference, n) {
            let slot = max_ref_counts.entry(ngram).or_insert(0);
            *slot = (*slot).max(count);
        }
    }

    let matches = hyp_counts
        .iter()
        .map(|(ngram, count)| (*count).min(max_ref_counts.get(ngram).copied().unwrap_or(0)))
        .sum();
    let total = hyp_counts.values().sum::<usize>().max(1);
    (matches, total)
}

/// Reference length closest to the hypothesis length; ties go to the shorter.
fn closest_reference_length(hyp_len: usize, references: &[Vec<String>]) -> usize {
    references
        .iter()
        .map(Vec::len)
        .min_by_key(|len| (len.abs_diff(hyp_len), *len))
        .unwrap_or(0)
}

fn brevity_penalty(hyp_len: usize, ref_len: usize) -> f64 {
    if hyp_len > ref_len {
        1.0
    } else if hyp_len == 0 {
        0.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    }
}

/// Sentence-level BLEU-4 with uniform weights. Orders without any match are
/// smoothed with a fixed epsilon, but a hypothesis sharing no unigram with any
/// reference scores zero.
pub fn sentence_bleu(references: &[Vec<String>], hypothesis: &[String]) -> f64 {
    if references.is_empty() || hypothesis.is_empty() {
        return 0.0;
    }

    let mut log_sum = 0.0;
    for n in 1..=MAX_ORDER {
        let (matches, total) = modified_precision(hypothesis, references, n);
        if n == 1 && matches == 0 {
            return 0.0;
        }
        let precision = if matches == 0 {
            SMOOTHING_EPSILON / total as f64
        } else {
            matches as f64 / total as f64
        };
        log_sum += precision.ln() / MAX_ORDER as f64;
    }

    let ref_len = closest_reference_length(hypothesis.len(), references);
    brevity_penalty(hypothesis.len(), ref_len) * log_sum.exp()
}

/// Mean sentence BLEU over aligned predictions and reference lists.
pub fn corpus_bleu(predictions: &[String], references: &[Vec<String>]) -> Result<f64, MetricsError> {
    if predictions.len() != references.len() {
        return Err(MetricsError::Validation(format!(
            "BLEU needs one reference list per prediction, got {} predictions and {} reference lists",
            predictions.len(),
            references.len()
        )));
    }
    if predictions.is_empty() {
        return Ok(0.0);
    }

    let total: f64 = predictions
        .iter()
        .zip(references)
        .map(|(prediction, refs)| {
            let refs: Vec<Vec<String>> = refs.iter().map(|r| tokenize(r)).collect();
            sentence_bleu(&refs, &tokenize(prediction))
        })
        .sum();
    Ok(total / predictions.len() as f64)
}
