use crate::error::Result;
use serde::de::IgnoredAny;
use shared::{Artifact, DatasetSummary};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

/// Commonly used BEIR datasets that can be downloaded by name.
pub const KNOWN_DATASETS: &[&str] = &[
    "scifact",
    "fiqa",
    "arguana",
    "scidocs",
    "nfcorpus",
    "quora",
    "dbpedia-entity",
    "nq",
    "hotpotqa",
    "fever",
    "climate-fever",
    "trec-covid",
    "webis-touche2020",
];

/// Names of the dataset directories under `root`, sorted. A missing root
/// simply means nothing has been downloaded yet.
pub fn available_dataset_names(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Number of top-level entries in a canonical artifact, without keeping the
/// records themselves in memory.
fn count_entries(path: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let entries: HashMap<String, IgnoredAny> = serde_json::from_reader(reader)?;
    Ok(entries.len())
}

pub fn summarize_dataset(root: &Path, name: &str) -> DatasetSummary {
    let dataset_dir = root.join(name);
    let mut counts = [0usize; 3];
    let mut missing = BTreeSet::new();

    for (slot, artifact) in Artifact::ALL.iter().enumerate() {
        let path = dataset_dir.join(artifact.file_name());
        if !path.is_file() {
            missing.insert(*artifact);
            continue;
        }
        match count_entries(&path) {
            Ok(count) => counts[slot] = count,
            Err(e) => {
                warn!("Unreadable {} for dataset {}: {}", artifact, name, e);
                missing.insert(*artifact);
            }
        }
    }

    DatasetSummary {
        name: name.to_string(),
        corpus_count: counts[0],
        queries_count: counts[1],
        qrels_count: counts[2],
        missing,
    }
}

/// One summary per dataset directory under `root`, sorted by name.
pub fn list_local_datasets(root: &Path) -> Result<Vec<DatasetSummary>> {
    Ok(available_dataset_names(root)?
        .iter()
        .map(|name| summarize_dataset(root, name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, dataset: &str, file: &str, content: &str) {
        let dir = root.join(dataset);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");
        assert!(available_dataset_names(&missing).unwrap().is_empty());
        assert!(list_local_datasets(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_counts_and_missing_artifacts() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "scifact",
            "corpus.json",
            r#"{"d1":{"_id":"d1","text":"a"},"d2":{"_id":"d2","text":"b"}}"#,
        );
        write(root.path(), "scifact", "queries.json", r#"{"q1":{"_id":"q1","text":"q"}}"#);
        write(root.path(), "fiqa", "corpus.json", r#"{"d1":{"_id":"d1","text":"a"}}"#);
        fs::write(root.path().join("fiqa.zip"), b"archive").unwrap();

        let summaries = list_local_datasets(root.path()).unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "fiqa");
        assert_eq!(summaries[1].name, "scifact");
        assert_eq!(summaries[1].corpus_count, 2);
        assert_eq!(summaries[1].queries_count, 1);
        assert_eq!(
            summaries[1].missing,
            [Artifact::Qrels].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(summaries[0].missing.contains(&Artifact::Queries));
    }

    #[test]
    fn test_corrupt_file_does_not_fail_listing() {
        let root = TempDir::new().unwrap();
        write(root.path(), "broken", "corpus.json", "{ this is not json");
        write(root.path(), "broken", "qrels.json", r#"{"q1":{"d1":1.0}}"#);
        write(root.path(), "ok", "corpus.json", "{}");

        let summaries = list_local_datasets(root.path()).unwrap();

        let broken = &summaries[0];
        assert_eq!(broken.name, "broken");
        assert!(broken.missing.contains(&Artifact::Corpus));
        assert_eq!(broken.corpus_count, 0);
        assert_eq!(broken.count(Artifact::Qrels), 1);
        assert_eq!(summaries[1].corpus_count, 0);
        assert!(!summaries[1].missing.contains(&Artifact::Corpus));
    }
}
