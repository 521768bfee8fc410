//! Conversion of raw BEIR files (JSONL records, TSV judgments) into the
//! canonical `corpus.json` / `queries.json` / `qrels.json` artifacts.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shared::{Corpus, DatasetPaths, Queries, QueryRecord, RawQrels};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CORPUS_JSONL: &str = "corpus.jsonl";
pub const QUERIES_JSONL: &str = "queries.jsonl";
pub const QUERIES_DIR: &str = "queries";
pub const QRELS_DIR: &str = "qrels";

const QRELS_HEADER: [&str; 3] = ["query-id", "corpus-id", "score"];

/// Counts of what a normalization pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub documents: usize,
    /// `None` when the dataset ships no queries in either format.
    pub queries: Option<usize>,
    pub qrels_queries: usize,
}

/// Iterates the lines of `reader`, skipping blank lines and lines that are not
/// valid UTF-8. Other I/O errors abort.
fn for_each_line<R: BufRead>(
    reader: R,
    mut handle: impl FnMut(usize, &str),
) -> Result<()> {
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Skipping line {}: {}", line_no, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        handle(line_no, &line);
    }
    Ok(())
}

/// Parses one JSONL record carrying an `_id`. Numeric ids are stringified.
fn parse_keyed_record<T: DeserializeOwned>(line: &str, line_no: usize) -> Option<(String, T)> {
    let mut value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!("Error decoding line {}: {}", line_no, e);
            return None;
        }
    };

    let id = match value.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            warn!("Record on line {} has no usable _id, skipping", line_no);
            return None;
        }
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("_id".to_string(), Value::String(id.clone()));
    }

    match serde_json::from_value(value) {
        Ok(record) => Some((id, record)),
        Err(e) => {
            warn!("Malformed record {} on line {}: {}", id, line_no, e);
            None
        }
    }
}

pub fn read_corpus<R: BufRead>(reader: R) -> Result<Corpus> {
    let mut corpus = Corpus::new();
    for_each_line(reader, |line_no, line| {
        if let Some((id, document)) = parse_keyed_record(line, line_no) {
            corpus.insert(id, document);
        }
    })?;
    Ok(corpus)
}

pub fn read_queries_jsonl<R: BufRead>(reader: R) -> Result<Queries> {
    let mut queries = Queries::new();
    for_each_line(reader, |line_no, line| {
        if let Some((id, query)) = parse_keyed_record(line, line_no) {
            queries.insert(id, query);
        }
    })?;
    Ok(queries)
}

/// Reads `query_id<TAB>query_text` lines.
pub fn read_queries_tsv<R: BufRead>(reader: R) -> Result<Queries> {
    let mut queries = Queries::new();
    for_each_line(reader, |_, line| {
        let parts: Vec<&str> = line.trim().split('\t').collect();
        if parts.len() >= 2 {
            queries.insert(parts[0].to_string(), QueryRecord::new(parts[0], parts[1]));
        }
    })?;
    Ok(queries)
}

/// Merges `query_id<TAB>doc_id<TAB>score` lines into `qrels`, returning how
/// many judgments were taken from this reader.
pub fn read_qrels_tsv<R: BufRead>(reader: R, qrels: &mut RawQrels) -> Result<usize> {
    let mut parsed = 0;
    for_each_line(reader, |line_no, line| {
        let parts: Vec<&str> = line.trim().split('\t').collect();
        if parts.len() < 3 {
            return;
        }
        if parts[..3] == QRELS_HEADER {
            return;
        }

        let score = match parts[2].trim().parse::<f64>() {
            Ok(score) if score.is_finite() => score,
            _ => {
                warn!("Invalid score {:?} on qrels line {}, skipping", parts[2], line_no);
                return;
            }
        };

        qrels
            .entry(parts[0].to_string())
            .or_default()
            .insert(parts[1].to_string(), score);
        parsed += 1;
    })?;
    Ok(parsed)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

/// `*.tsv` files directly inside `dir`, sorted by name.
fn tsv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("tsv"))
        .collect();
    files.sort();
    Ok(files)
}

/// Loads queries from `queries.jsonl`, falling back to the first
/// `queries/*.tsv`. Returns `None` when neither exists.
pub fn load_queries(dataset_dir: &Path) -> Result<Option<Queries>> {
    let jsonl = dataset_dir.join(QUERIES_JSONL);
    if jsonl.is_file() {
        return read_queries_jsonl(open(&jsonl)?).map(Some);
    }

    match tsv_files(&dataset_dir.join(QUERIES_DIR))?.first() {
        Some(tsv) => {
            info!("Converting queries from TSV: {}", tsv.display());
            read_queries_tsv(open(tsv)?).map(Some)
        }
        None => Ok(None),
    }
}

/// Loads every `qrels/*.tsv` split into one mapping.
pub fn load_qrels(dataset_dir: &Path) -> Result<RawQrels> {
    let mut qrels = RawQrels::new();
    let qrels_dir = dataset_dir.join(QRELS_DIR);
    if !qrels_dir.is_dir() {
        warn!("No qrels directory found in {}", dataset_dir.display());
        return Ok(qrels);
    }

    for path in tsv_files(&qrels_dir)? {
        let parsed = read_qrels_tsv(open(&path)?, &mut qrels)?;
        info!("Read {} judgments from {}", parsed, path.display());
    }
    Ok(qrels)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_reader(open(path)?)?)
}

/// Converts the raw files in `dataset_dir` into the canonical artifacts at
/// `paths`. The corpus must exist; queries and qrels are optional.
pub fn normalize_dataset(dataset_dir: &Path, paths: &DatasetPaths) -> Result<NormalizeSummary> {
    let corpus = read_corpus(open(&dataset_dir.join(CORPUS_JSONL))?)?;
    write_json(&paths.corpus_path, &corpus)?;
    info!(
        "Corpus saved to: {} ({} documents)",
        paths.corpus_path.display(),
        corpus.len()
    );

    let queries = load_queries(dataset_dir)?;
    match &queries {
        Some(queries) => {
            write_json(&paths.queries_path, queries)?;
            info!(
                "Queries saved to: {} ({} queries)",
                paths.queries_path.display(),
                queries.len()
            );
        }
        None => warn!("No queries found in {}", dataset_dir.display()),
    }

    let qrels = load_qrels(dataset_dir)?;
    if qrels.is_empty() {
        warn!("No qrels found");
    } else {
        write_json(&paths.qrels_path, &qrels)?;
        info!("Qrels saved to: {}", paths.qrels_path.display());
    }

    Ok(NormalizeSummary {
        documents: corpus.len(),
        queries: queries.map(|q| q.len()),
        qrels_queries: qrels.len(),
    })
}
