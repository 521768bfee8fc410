#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use beir_eval::datasets::ArchiveSource;
use beir_eval::BeirError;
use metrics_api::{create_app, AppState};
use serde_json::{json, Value};
use shared::BeirConfig;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Serves one in-memory archive for every dataset name.
pub struct FixtureArchiveSource {
    pub archive: Vec<u8>,
}

#[async_trait]
impl ArchiveSource for FixtureArchiveSource {
    async fn fetch_archive(&self, _dataset_name: &str, destination: &Path) -> beir_eval::Result<()> {
        fs::write(destination, &self.archive)?;
        Ok(())
    }
}

pub struct UnreachableArchiveSource;

#[async_trait]
impl ArchiveSource for UnreachableArchiveSource {
    async fn fetch_archive(&self, dataset_name: &str, _destination: &Path) -> beir_eval::Result<()> {
        Err(BeirError::Download {
            dataset: dataset_name.to_string(),
            reason: "connection refused ".repeat(40),
        })
    }
}

pub fn fixture_zip(dataset_name: &str) -> Result<Vec<u8>> {
    let entries = [
        (
            "corpus.jsonl",
            "{\"_id\":\"d1\",\"title\":\"Doc 1\",\"text\":\"alpha\"}\n{\"_id\":\"d2\",\"title\":\"Doc 2\",\"text\":\"beta\"}\n",
        ),
        ("queries.jsonl", "{\"_id\":\"q1\",\"text\":\"find alpha\"}\n"),
        ("qrels/test.tsv", "query-id\tcorpus-id\tscore\nq1\td1\t1\n"),
    ];

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(format!("{}/{}", dataset_name, name), FileOptions::default())?;
        writer.write_all(content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

pub fn setup_test_app(source: Arc<dyn ArchiveSource>) -> (TempDir, AppState, axum::Router) {
    let data_root = TempDir::new().expect("temp dir");
    let config = BeirConfig::default().with_data_root(data_root.path());
    let state = AppState::with_source(config, source);
    let app = create_app(state.clone());
    (data_root, state, app)
}

pub fn setup_offline_app() -> (TempDir, AppState, axum::Router) {
    setup_test_app(Arc::new(UnreachableArchiveSource))
}

/// Writes canonical artifacts directly, as if the dataset had been fetched.
pub fn seed_dataset(root: &Path, dataset_name: &str, qrels: Option<Value>) -> Result<()> {
    let dir = root.join(dataset_name);
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("corpus.json"),
        json!({
            "d1": {"_id": "d1", "title": "Doc 1", "text": "alpha"},
            "d2": {"_id": "d2", "title": "Doc 2", "text": "beta"}
        })
        .to_string(),
    )?;
    fs::write(
        dir.join("queries.json"),
        json!({"q1": {"_id": "q1", "text": "find alpha"}}).to_string(),
    )?;
    if let Some(qrels) = qrels {
        fs::write(dir.join("qrels.json"), qrels.to_string())?;
    }
    Ok(())
}
