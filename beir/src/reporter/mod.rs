use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{MetricFamily, MetricsReport};
use std::fs;
use std::path::Path;
use tracing::info;

/// Metrics shown side by side when comparing two runs.
pub const COMPARED_METRICS: [(MetricFamily, usize); 4] = [
    (MetricFamily::Precision, 1),
    (MetricFamily::Recall, 10),
    (MetricFamily::Ndcg, 10),
    (MetricFamily::Map, 10),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub metric: String,
    pub value_a: f64,
    pub value_b: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub label_a: String,
    pub label_b: String,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ComparisonRow>,
}

/// Parses a saved evaluation: `{"metrics": {...}, ...}` as written by the CLI
/// and the HTTP service, or a bare metrics report.
pub fn parse_report(content: &Value, source: &str) -> Result<MetricsReport> {
    let metrics = match content.get("metrics") {
        Some(metrics) => metrics,
        None if MetricFamily::ALL
            .iter()
            .any(|family| content.get(family.name()).is_some()) =>
        {
            content
        }
        None => return Err(anyhow!("'metrics' key not found in {}", source)),
    };

    serde_json::from_value(metrics.clone())
        .with_context(|| format!("Invalid metrics block in {}", source))
}

pub fn load_report(path: &Path) -> Result<MetricsReport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    parse_report(&value, &path.display().to_string())
}

/// Looks a value up by display key first, then by bare cutoff.
fn lookup(report: &MetricsReport, family: MetricFamily, k: usize) -> f64 {
    let scores = report.family(family);
    scores
        .get(&family.display_key(k))
        .or_else(|| scores.get(&k.to_string()))
        .copied()
        .unwrap_or(0.0)
}

pub fn compare_reports(
    a: &MetricsReport,
    b: &MetricsReport,
    label_a: &str,
    label_b: &str,
) -> ComparisonReport {
    let rows = COMPARED_METRICS
        .iter()
        .map(|(family, k)| {
            let value_a = lookup(a, *family, *k);
            let value_b = lookup(b, *family, *k);
            ComparisonRow {
                metric: family.display_key(*k),
                value_a,
                value_b,
                difference: (value_a - value_b).abs(),
            }
        })
        .collect();

    ComparisonReport {
        label_a: label_a.to_string(),
        label_b: label_b.to_string(),
        generated_at: Utc::now(),
        rows,
    }
}

impl ComparisonReport {
    pub fn render_table(&self) -> String {
        let metric_width = self
            .rows
            .iter()
            .map(|row| row.metric.len())
            .chain(["Metric".len()])
            .max()
            .unwrap_or(6);
        let a_width = self.label_a.len().max(8);
        let b_width = self.label_b.len().max(8);

        let mut table = format!(
            "{:<mw$}  {:>aw$}  {:>bw$}  {:>8}\n",
            "Metric",
            self.label_a,
            self.label_b,
            "Diff",
            mw = metric_width,
            aw = a_width,
            bw = b_width,
        );
        table.push_str(&"-".repeat(metric_width + a_width + b_width + 14));
        table.push('\n');
        for row in &self.rows {
            table.push_str(&format!(
                "{:<mw$}  {:>aw$.4}  {:>bw$.4}  {:>8.4}\n",
                row.metric,
                row.value_a,
                row.value_b,
                row.difference,
                mw = metric_width,
                aw = a_width,
                bw = b_width,
            ));
        }
        table
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["metric", self.label_a.as_str(), self.label_b.as_str(), "difference"])?;
        for row in &self.rows {
            writer.write_record([
                row.metric.clone(),
                format!("{:.5}", row.value_a),
                format!("{:.5}", row.value_b),
                format!("{:.5}", row.difference),
            ])?;
        }
        writer.flush()?;

        info!("Comparison CSV written: {}", path.display());
        Ok(())
    }
}
