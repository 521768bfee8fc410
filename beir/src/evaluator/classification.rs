//! F1, precision and recall for single-label classification output, with the
//! averaging and zero-division conventions of scikit-learn.

use crate::evaluator::payload::MetricsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Bool(b) => write!(f, "{}", b),
            Label::Int(i) => write!(f, "{}", i),
            Label::Text(s) => write!(f, "'{}'", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    Binary,
    Micro,
    Macro,
    Weighted,
    Samples,
}

/// Value reported when a score has a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ZeroDivision {
    #[default]
    Zero,
    One,
    Warn,
}

impl ZeroDivision {
    fn value(&self) -> f64 {
        match self {
            ZeroDivision::One => 1.0,
            ZeroDivision::Zero | ZeroDivision::Warn => 0.0,
        }
    }
}

impl TryFrom<Value> for ZeroDivision {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(ZeroDivision::Zero),
            Value::Number(n) if n.as_f64() == Some(1.0) => Ok(ZeroDivision::One),
            Value::String(s) if s == "warn" => Ok(ZeroDivision::Warn),
            _ => Err(format!(
                "zero_division must be 0, 1 or \"warn\", got {}",
                value
            )),
        }
    }
}

impl From<ZeroDivision> for Value {
    fn from(zero_division: ZeroDivision) -> Self {
        match zero_division {
            ZeroDivision::Zero => Value::from(0),
            ZeroDivision::One => Value::from(1),
            ZeroDivision::Warn => Value::from("warn"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationData {
    pub predictions: Vec<Label>,
    pub ground_truth: Vec<Label>,
    pub average: Average,
    #[serde(default)]
    pub positive_label: Option<Label>,
    #[serde(default)]
    pub labels: Option<Vec<Label>>,
    #[serde(default)]
    pub zero_division: ZeroDivision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMetric {
    F1,
    Precision,
    Recall,
}

impl ClassificationMetric {
    pub fn name(&self) -> &'static str {
        match self {
            ClassificationMetric::F1 => "f1",
            ClassificationMetric::Precision => "precision",
            ClassificationMetric::Recall => "recall",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "f1" => Some(ClassificationMetric::F1),
            "precision" => Some(ClassificationMetric::Precision),
            "recall" => Some(ClassificationMetric::Recall),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LabelCounts {
    true_positives: usize,
    predicted: usize,
    actual: usize,
}

impl LabelCounts {
    fn add(&mut self, other: LabelCounts) {
        self.true_positives += other.true_positives;
        self.predicted += other.predicted;
        self.actual += other.actual;
    }
}

fn ratio(numerator: usize, denominator: usize, zero_division: ZeroDivision, what: &str) -> f64 {
    if denominator == 0 {
        if zero_division == ZeroDivision::Warn {
            warn!("{} is ill-defined and being set to 0.0 due to a zero denominator", what);
        }
        zero_division.value()
    } else {
        numerator as f64 / denominator as f64
    }
}

fn score(counts: LabelCounts, metric: ClassificationMetric, zero_division: ZeroDivision) -> f64 {
    match metric {
        ClassificationMetric::Precision => {
            ratio(counts.true_positives, counts.predicted, zero_division, "Precision")
        }
        ClassificationMetric::Recall => {
            ratio(counts.true_positives, counts.actual, zero_division, "Recall")
        }
        ClassificationMetric::F1 => ratio(
            2 * counts.true_positives,
            counts.predicted + counts.actual,
            zero_division,
            "F-score",
        ),
    }
}

impl ClassificationData {
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.predictions.len() != self.ground_truth.len() {
            return Err(MetricsError::Validation(format!(
                "Length of ground_truth ({}) must match length of predictions ({})",
                self.ground_truth.len(),
                self.predictions.len()
            )));
        }
        if self.predictions.is_empty() {
            return Err(MetricsError::Validation(
                "Classification metrics need at least one prediction".to_string(),
            ));
        }
        if self.average == Average::Binary && self.positive_label.is_none() {
            return Err(MetricsError::Validation(
                "positive_label is required when average='binary'".to_string(),
            ));
        }
        if self.average == Average::Samples {
            return Err(MetricsError::Validation(
                "average='samples' is only meaningful for multilabel classification".to_string(),
            ));
        }
        Ok(())
    }

    fn present_labels(&self) -> BTreeSet<&Label> {
        self.ground_truth.iter().chain(&self.predictions).collect()
    }

    fn counts_for(&self, label: &Label) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for (truth, prediction) in self.ground_truth.iter().zip(&self.predictions) {
            let is_true = truth == label;
            let is_predicted = prediction == label;
            if is_true {
                counts.actual += 1;
            }
            if is_predicted {
                counts.predicted += 1;
            }
            if is_true && is_predicted {
                counts.true_positives += 1;
            }
        }
        counts
    }

    /// Labels scored under a non-binary average: the explicit list when given,
    /// otherwise every label seen in either sequence.
    fn scored_labels(&self) -> Vec<&Label> {
        match &self.labels {
            Some(labels) if !labels.is_empty() => labels.iter().collect(),
            _ => self.present_labels().into_iter().collect(),
        }
    }

    fn binary_score(&self, metric: ClassificationMetric) -> Result<f64, MetricsError> {
        let positive = self.positive_label.as_ref().ok_or_else(|| {
            MetricsError::Validation("positive_label is required when average='binary'".to_string())
        })?;
        let present = self.present_labels();
        if present.len() > 2 {
            return Err(MetricsError::Validation(
                "Target is multiclass but average='binary'. Please choose another average setting, one of [micro, macro, weighted]".to_string(),
            ));
        }
        if present.len() == 2 && !present.contains(positive) {
            let valid: Vec<String> = present.iter().map(|l| l.to_string()).collect();
            return Err(MetricsError::Validation(format!(
                "pos_label={} is not a valid label. It should be one of [{}]",
                positive,
                valid.join(", ")
            )));
        }
        Ok(score(self.counts_for(positive), metric, self.zero_division))
    }

    pub fn compute(&self, metric: ClassificationMetric) -> Result<f64, MetricsError> {
        self.validate()?;

        match self.average {
            Average::Binary => self.binary_score(metric),
            Average::Micro => {
                let mut total = LabelCounts::default();
                for label in self.scored_labels() {
                    total.add(self.counts_for(label));
                }
                Ok(score(total, metric, self.zero_division))
            }
            Average::Macro => {
                let labels = self.scored_labels();
                let sum: f64 = labels
                    .iter()
                    .map(|label| score(self.counts_for(label), metric, self.zero_division))
                    .sum();
                Ok(sum / labels.len() as f64)
            }
            Average::Weighted => {
                let mut weighted_sum = 0.0;
                let mut support = 0;
                for label in self.scored_labels() {
                    let counts = self.counts_for(label);
                    if counts.actual > 0 {
                        weighted_sum += score(counts, metric, self.zero_division) * counts.actual as f64;
                        support += counts.actual;
                    }
                }
                if support == 0 {
                    return Ok(self.zero_division.value());
                }
                Ok(weighted_sum / support as f64)
            }
            Average::Samples => Err(MetricsError::Validation(
                "average='samples' is only meaningful for multilabel classification".to_string(),
            )),
        }
    }
}
