//! `beir` command line tool.
//!
//! ```bash
//! beir download scifact
//! beir list
//! beir evaluate runs/scifact_results.json scifact --k-values 1,10
//! beir compare ours_metrics.json baseline_metrics.json --labels ours bm25 --csv cmp.csv
//! ```

use anyhow::{bail, Context, Result};
use beir_eval::datasets::{list_local_datasets, BeirFetcher, HttpArchiveSource, KNOWN_DATASETS};
use beir_eval::evaluator::{BeirEvaluator, Evaluation};
use beir_eval::reporter::{compare_reports, load_report};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use shared::telemetry::init_tracing;
use shared::{Artifact, BeirConfig, DatasetSummary, MetricFamily};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "beir")]
#[command(about = "Download BEIR datasets and evaluate retrieval results against them")]
struct Cli {
    /// Root directory for downloaded datasets (overrides BEIR_DATA_ROOT_PATH)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and normalize a dataset
    Download { name: String },
    /// List downloaded datasets
    List,
    /// Evaluate a results file against a dataset's qrels
    Evaluate {
        results_file: PathBuf,
        dataset: String,
        /// Cutoffs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        k_values: Option<Vec<usize>>,
    },
    /// Compare two saved metric reports
    Compare {
        first: PathBuf,
        second: PathBuf,
        /// Display names for the two reports
        #[arg(long, num_args = 2, value_names = ["A", "B"])]
        labels: Option<Vec<String>>,
        /// Also write the comparison as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    init_tracing("beir", default_filter)?;

    let mut config = BeirConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_root(data_dir);
    }

    match cli.command {
        Command::Download { name } => download(&config, &name).await,
        Command::List => list(&config),
        Command::Evaluate {
            results_file,
            dataset,
            k_values,
        } => evaluate(&config, &results_file, &dataset, k_values),
        Command::Compare {
            first,
            second,
            labels,
            csv,
        } => compare(&first, &second, labels, csv.as_deref()),
    }
}

async fn download(config: &BeirConfig, name: &str) -> Result<()> {
    let source = HttpArchiveSource::new(config.download_url.clone()).with_progress(true);
    let fetcher = BeirFetcher::new(config.data_root.clone(), Arc::new(source));

    let paths = fetcher
        .fetch(name)
        .await
        .with_context(|| format!("Failed to download dataset {}", name))?;

    println!("Dataset '{}' is ready", name);
    println!("  corpus:  {}", paths.corpus_path.display());
    println!("  queries: {}", paths.queries_path.display());
    println!("  qrels:   {}", paths.qrels_path.display());
    Ok(())
}

fn list(config: &BeirConfig) -> Result<()> {
    let summaries = list_local_datasets(config.data_root())?;
    if summaries.is_empty() {
        println!("No datasets found in {}", config.data_root().display());
    } else {
        print_summaries(&summaries);
    }

    println!();
    println!("Downloadable datasets: {}", KNOWN_DATASETS.join(", "));
    Ok(())
}

fn print_summaries(summaries: &[DatasetSummary]) {
    println!(
        "{:<24} {:>10} {:>10} {:>10}",
        "Dataset", "Corpus", "Queries", "Qrels"
    );
    for summary in summaries {
        let cell = |artifact: Artifact| {
            if summary.missing.contains(&artifact) {
                "missing".to_string()
            } else {
                summary.count(artifact).to_string()
            }
        };
        println!(
            "{:<24} {:>10} {:>10} {:>10}",
            summary.name,
            cell(Artifact::Corpus),
            cell(Artifact::Queries),
            cell(Artifact::Qrels)
        );
    }
}

fn metrics_output_path(results_file: &Path) -> PathBuf {
    let stem = results_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    results_file.with_file_name(format!("{}_metrics.json", stem))
}

fn print_evaluation(dataset: &str, evaluation: &Evaluation) {
    println!("Metrics for {}:", dataset);
    if let Some(reason) = evaluation.fallback {
        println!("  (evaluation degraded: {})", reason);
    }
    for family in MetricFamily::ALL {
        for (key, value) in evaluation.metrics.sorted_entries(family) {
            println!("  {:<12} {:.5}", key, value);
        }
    }
}

fn evaluate(
    config: &BeirConfig,
    results_file: &Path,
    dataset: &str,
    k_values: Option<Vec<usize>>,
) -> Result<()> {
    let dataset_dir = config.dataset_dir(dataset);
    if !dataset_dir.is_dir() {
        bail!(
            "Dataset '{}' not found in {}. Run `beir download {}` first.",
            dataset,
            config.data_root().display(),
            dataset
        );
    }
    let qrels_path = dataset_dir.join(Artifact::Qrels.file_name());
    if !qrels_path.is_file() {
        bail!("Qrels file not found at {}", qrels_path.display());
    }
    let k_values = k_values.unwrap_or_else(|| config.default_k_values.clone());

    let evaluation = BeirEvaluator::default()
        .with_default_k_values(&config.default_k_values)
        .evaluate_from_file(results_file, &qrels_path, &k_values);
    print_evaluation(dataset, &evaluation);

    let output = json!({
        "dataset_name": dataset,
        "results_file": results_file.display().to_string(),
        "metrics": evaluation.metrics,
        "fallback_reason": evaluation.fallback,
        "generated_at": Utc::now(),
    });
    let output_path = metrics_output_path(results_file);
    fs::write(&output_path, serde_json::to_string_pretty(&output)?)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!("Metrics saved to {}", output_path.display());
    println!("Saved metrics to {}", output_path.display());
    Ok(())
}

fn compare(
    first: &Path,
    second: &Path,
    labels: Option<Vec<String>>,
    csv: Option<&Path>,
) -> Result<()> {
    let report_a = load_report(first)?;
    let report_b = load_report(second)?;

    let (label_a, label_b) = match labels.as_deref() {
        Some([a, b]) => (a.clone(), b.clone()),
        _ => (file_label(first), file_label(second)),
    };

    let comparison = compare_reports(&report_a, &report_b, &label_a, &label_b);
    print!("{}", comparison.render_table());

    if let Some(path) = csv {
        comparison.write_csv(path)?;
        println!("Saved comparison to {}", path.display());
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
