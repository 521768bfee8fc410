use crate::datasets::download::{ArchiveSource, HttpArchiveSource};
use crate::datasets::normalize::{self, NormalizeSummary, CORPUS_JSONL};
use crate::datasets::validate_dataset_name;
use crate::error::{BeirError, Result};
use shared::{Artifact, BeirConfig, DatasetPaths};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Downloads BEIR archives into a data root and turns them into canonical
/// JSON artifacts, one directory per dataset.
#[derive(Clone)]
pub struct BeirFetcher {
    data_root: PathBuf,
    source: Arc<dyn ArchiveSource>,
}

impl BeirFetcher {
    pub fn new(data_root: impl Into<PathBuf>, source: Arc<dyn ArchiveSource>) -> Self {
        Self {
            data_root: data_root.into(),
            source,
        }
    }

    pub fn from_config(config: &BeirConfig) -> Self {
        Self::new(
            config.data_root.clone(),
            Arc::new(HttpArchiveSource::new(config.download_url.clone())),
        )
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn canonical_paths(&self, dataset_name: &str) -> DatasetPaths {
        canonical_paths(&self.data_root.join(dataset_name))
    }

    /// Makes sure `dataset_name` is available as canonical artifacts and
    /// returns their paths. Nothing is downloaded when the artifacts are
    /// already present, or when the archive is already on disk.
    pub async fn fetch(&self, dataset_name: &str) -> Result<DatasetPaths> {
        validate_dataset_name(dataset_name)?;

        let dataset_dir = self.data_root.join(dataset_name);
        tokio::fs::create_dir_all(&dataset_dir).await?;
        let paths = canonical_paths(&dataset_dir);

        if paths.corpus_path.exists() && paths.queries_path.exists() && paths.qrels_path.exists()
        {
            info!(
                "Files already exist in {}, skipping processing",
                dataset_dir.display()
            );
            return Ok(paths);
        }

        info!("Downloading BEIR dataset: {}", dataset_name);
        info!("Output directory: {}", dataset_dir.display());

        let zip_path = self.data_root.join(format!("{}.zip", dataset_name));
        if zip_path.exists() {
            info!("Zip file already exists at {}", zip_path.display());
        } else if let Err(e) = self.source.fetch_archive(dataset_name, &zip_path).await {
            error!("Failed to download dataset: {}", e);
            return Err(e);
        }

        let data_root = self.data_root.clone();
        let prepared = paths.clone();
        let summary = tokio::task::spawn_blocking(move || {
            prepare_dataset(&zip_path, &data_root, &dataset_dir, &prepared)
        })
        .await??;

        info!(
            "Successfully processed {}: {} documents, {:?} queries, {} judged queries",
            dataset_name, summary.documents, summary.queries, summary.qrels_queries
        );
        Ok(paths)
    }
}

pub fn canonical_paths(dataset_dir: &Path) -> DatasetPaths {
    DatasetPaths {
        corpus_path: dataset_dir.join(Artifact::Corpus.file_name()),
        queries_path: dataset_dir.join(Artifact::Queries.file_name()),
        qrels_path: dataset_dir.join(Artifact::Qrels.file_name()),
    }
}

/// Extracts the archive, flattens a nested layout and writes the canonical
/// artifacts. Runs on the blocking pool.
fn prepare_dataset(
    zip_path: &Path,
    data_root: &Path,
    dataset_dir: &Path,
    paths: &DatasetPaths,
) -> Result<NormalizeSummary> {
    info!("Extracting zip file to {}", data_root.display());
    extract_archive(zip_path, data_root)?;

    reconcile_layout(dataset_dir)?;

    if !dataset_dir.join(CORPUS_JSONL).is_file() {
        let found = list_files(dataset_dir);
        error!("Could not find {} in {}", CORPUS_JSONL, dataset_dir.display());
        error!("Found files: {:?}", found);
        return Err(BeirError::MissingArtifact {
            path: dataset_dir.to_path_buf(),
            found,
        });
    }

    normalize::normalize_dataset(dataset_dir, paths)
}

fn extract_archive(zip_path: &Path, destination: &Path) -> Result<()> {
    let extract_error = |reason: String| BeirError::Extract {
        path: zip_path.to_path_buf(),
        reason,
    };

    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| extract_error(e.to_string()))?;
    archive
        .extract(destination)
        .map_err(|e| extract_error(e.to_string()))
}

/// Some archives nest the dataset one directory deeper. When `corpus.jsonl`
/// is not at the top level, copies the contents of the first subdirectory
/// holding it up into `dataset_dir`. Returns whether anything was moved.
pub fn reconcile_layout(dataset_dir: &Path) -> Result<bool> {
    if dataset_dir.join(CORPUS_JSONL).is_file() {
        return Ok(false);
    }

    let mut subdirs: Vec<PathBuf> = fs::read_dir(dataset_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    for subdir in subdirs {
        if subdir.join(CORPUS_JSONL).is_file() {
            info!("Found corpus in subdirectory: {}", subdir.display());
            copy_dir_contents(&subdir, dataset_dir)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Recursively copies everything under `source` into `destination`,
/// overwriting files and merging directories.
fn copy_dir_contents(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().display().to_string())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    /// Serves a prebuilt zip from memory and counts how often it was asked.
    struct MockArchiveSource {
        archive: Vec<u8>,
        calls: AtomicUsize,
    }

    impl MockArchiveSource {
        fn new(archive: Vec<u8>) -> Self {
            Self {
                archive,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArchiveSource for MockArchiveSource {
        async fn fetch_archive(&self, _dataset_name: &str, destination: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(destination, &self.archive)?;
            Ok(())
        }
    }

    struct FailingArchiveSource;

    #[async_trait]
    impl ArchiveSource for FailingArchiveSource {
        async fn fetch_archive(&self, dataset_name: &str, _destination: &Path) -> Result<()> {
            Err(BeirError::Download {
                dataset: dataset_name.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
        }
    }

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn scifact_zip() -> Vec<u8> {
        build_zip(&[
            (
                "scifact/corpus.jsonl",
                "{\"_id\":\"d1\",\"title\":\"T\",\"text\":\"X\"}\n{\"_id\":\"d2\",\"title\":\"\",\"text\":\"Y\"}\n",
            ),
            ("scifact/queries.jsonl", "{\"_id\":\"q1\",\"text\":\"what is X\"}\n"),
            (
                "scifact/qrels/test.tsv",
                "query-id\tcorpus-id\tscore\nq1\td1\t1\n",
            ),
        ])
    }

    #[tokio::test]
    async fn test_fetch_writes_canonical_artifacts() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(MockArchiveSource::new(scifact_zip()));
        let fetcher = BeirFetcher::new(root.path(), source.clone());

        let paths = fetcher.fetch("scifact").await.unwrap();

        assert_eq!(source.calls(), 1);
        let corpus: serde_json::Value = normalize::read_json(&paths.corpus_path).unwrap();
        assert_eq!(corpus["d1"]["title"], "T");
        let qrels: serde_json::Value = normalize::read_json(&paths.qrels_path).unwrap();
        assert_eq!(qrels["q1"]["d1"], 1.0);
        // raw files and archive are kept around
        assert!(root.path().join("scifact.zip").exists());
        assert!(root.path().join("scifact").join(CORPUS_JSONL).exists());
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(MockArchiveSource::new(scifact_zip()));
        let fetcher = BeirFetcher::new(root.path(), source.clone());

        let first = fetcher.fetch("scifact").await.unwrap();
        fs::remove_file(root.path().join("scifact.zip")).unwrap();
        let second = fetcher.fetch("scifact").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_fetches_of_different_datasets() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(MockArchiveSource::new(scifact_zip()));
        let fetcher = BeirFetcher::new(root.path(), source.clone());
        let nfcorpus_zip = build_zip(&[
            ("nfcorpus/corpus.jsonl", "{\"_id\":\"n1\",\"text\":\"N\"}\n"),
            ("nfcorpus/queries.jsonl", "{\"_id\":\"q1\",\"text\":\"Q\"}\n"),
            ("nfcorpus/qrels/test.tsv", "q1\tn1\t1\n"),
        ]);
        let other = BeirFetcher::new(root.path(), Arc::new(MockArchiveSource::new(nfcorpus_zip)));

        let (first, second) = tokio::join!(fetcher.fetch("scifact"), other.fetch("nfcorpus"));

        assert!(first.unwrap().qrels_path.is_file());
        let corpus: serde_json::Value = normalize::read_json(&second.unwrap().corpus_path).unwrap();
        assert_eq!(corpus["n1"]["text"], "N");
    }

    #[tokio::test]
    async fn test_existing_archive_is_reused() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("scifact.zip"), scifact_zip()).unwrap();
        let source = Arc::new(MockArchiveSource::new(Vec::new()));
        let fetcher = BeirFetcher::new(root.path(), source.clone());

        let paths = fetcher.fetch("scifact").await.unwrap();

        assert_eq!(source.calls(), 0);
        assert!(paths.corpus_path.exists());
    }

    #[tokio::test]
    async fn test_nested_layout_is_reconciled() {
        let root = TempDir::new().unwrap();
        let archive = build_zip(&[
            ("nested/inner/corpus.jsonl", "{\"_id\":\"d1\",\"text\":\"X\"}\n"),
            ("nested/inner/queries.jsonl", "{\"_id\":\"q1\",\"text\":\"Q\"}\n"),
            ("nested/inner/qrels/test.tsv", "q1\td1\t2\n"),
        ]);
        let fetcher = BeirFetcher::new(root.path(), Arc::new(MockArchiveSource::new(archive)));

        let paths = fetcher.fetch("nested").await.unwrap();

        let dataset_dir = root.path().join("nested");
        assert!(dataset_dir.join(CORPUS_JSONL).exists());
        assert!(dataset_dir.join("qrels").join("test.tsv").exists());
        let qrels: serde_json::Value = normalize::read_json(&paths.qrels_path).unwrap();
        assert_eq!(qrels["q1"]["d1"], 2.0);
    }

    #[tokio::test]
    async fn test_missing_corpus_lists_found_files() {
        let root = TempDir::new().unwrap();
        let archive = build_zip(&[("broken/readme.txt", "no corpus here")]);
        let fetcher = BeirFetcher::new(root.path(), Arc::new(MockArchiveSource::new(archive)));

        match fetcher.fetch("broken").await {
            Err(BeirError::MissingArtifact { found, .. }) => {
                assert!(found.iter().any(|f| f.ends_with("readme.txt")));
            }
            other => panic!("expected MissingArtifact, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_failure_propagates() {
        let root = TempDir::new().unwrap();
        let fetcher = BeirFetcher::new(root.path(), Arc::new(FailingArchiveSource));

        let result = fetcher.fetch("scifact").await;

        assert!(matches!(result, Err(BeirError::Download { .. })));
        assert!(!root.path().join("scifact.zip").exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_extract_error() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("scifact.zip"), b"definitely not a zip").unwrap();
        let fetcher = BeirFetcher::new(root.path(), Arc::new(FailingArchiveSource));

        let result = fetcher.fetch("scifact").await;
        assert!(matches!(result, Err(BeirError::Extract { .. })));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_io() {
        let root = TempDir::new().unwrap();
        let fetcher = BeirFetcher::new(root.path(), Arc::new(FailingArchiveSource));

        let result = fetcher.fetch("../etc").await;
        assert!(matches!(result, Err(BeirError::InvalidDatasetName(_))));
    }
}
