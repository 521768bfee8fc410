use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

/// A corpus document as stored in `corpus.json`. Everything besides `_id` is
/// kept as raw JSON, so `title` and `text` may be any value or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DocumentRecord {
    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.fields.get("text").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl QueryRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String(text.into()));
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.fields.get("text").and_then(Value::as_str)
    }
}

pub type Corpus = BTreeMap<String, DocumentRecord>;
pub type Queries = BTreeMap<String, QueryRecord>;

/// Relevance judgments as parsed from the raw TSV files (scores kept as floats).
pub type RawQrels = BTreeMap<String, BTreeMap<String, f64>>;

/// Relevance judgments after coercion: query id -> doc id -> integer grade.
pub type Qrels = HashMap<String, HashMap<String, i64>>;

/// Ranking output of a retrieval system: query id -> doc id -> score.
pub type Results = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Ndcg,
    Map,
    Recall,
    Precision,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Ndcg,
        MetricFamily::Map,
        MetricFamily::Recall,
        MetricFamily::Precision,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricFamily::Ndcg => "ndcg",
            MetricFamily::Map => "map",
            MetricFamily::Recall => "recall",
            MetricFamily::Precision => "precision",
        }
    }

    /// Prefix used for display keys, e.g. `NDCG@` in `NDCG@10`.
    pub fn display_prefix(&self) -> &'static str {
        match self {
            MetricFamily::Ndcg => "NDCG@",
            MetricFamily::Map => "MAP@",
            MetricFamily::Recall => "Recall@",
            MetricFamily::Precision => "P@",
        }
    }

    pub fn display_key(&self, k: usize) -> String {
        format!("{}{}", self.display_prefix(), k)
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type FamilyScores = BTreeMap<String, f64>;

/// Retrieval metrics grouped by family. Keys inside a family are either bare
/// cutoffs (`"10"`) or display keys (`"NDCG@10"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(default)]
    pub ndcg: FamilyScores,
    #[serde(default)]
    pub map: FamilyScores,
    #[serde(default)]
    pub recall: FamilyScores,
    #[serde(default)]
    pub precision: FamilyScores,
}

impl MetricsReport {
    pub fn family(&self, family: MetricFamily) -> &FamilyScores {
        match family {
            MetricFamily::Ndcg => &self.ndcg,
            MetricFamily::Map => &self.map,
            MetricFamily::Recall => &self.recall,
            MetricFamily::Precision => &self.precision,
        }
    }

    pub fn family_mut(&mut self, family: MetricFamily) -> &mut FamilyScores {
        match family {
            MetricFamily::Ndcg => &mut self.ndcg,
            MetricFamily::Map => &mut self.map,
            MetricFamily::Recall => &mut self.recall,
            MetricFamily::Precision => &mut self.precision,
        }
    }

    /// Entries of a family ordered by cutoff rather than lexically.
    pub fn sorted_entries(&self, family: MetricFamily) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> = self
            .family(family)
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        entries.sort_by_key(|(key, _)| (cutoff_of(key).unwrap_or(usize::MAX), key.to_string()));
        entries
    }

    pub fn is_all_zero(&self) -> bool {
        MetricFamily::ALL
            .iter()
            .all(|family| self.family(*family).values().all(|v| *v == 0.0))
    }
}

/// Extracts the numeric cutoff from `"10"` or `"NDCG@10"`.
pub fn cutoff_of(key: &str) -> Option<usize> {
    let digits = key.rsplit('@').next().unwrap_or(key);
    digits.trim().parse().ok()
}

/// Locations of the three canonical artifacts of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPaths {
    pub corpus_path: PathBuf,
    pub queries_path: PathBuf,
    pub qrels_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Corpus,
    Queries,
    Qrels,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Corpus, Artifact::Queries, Artifact::Qrels];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Corpus => "corpus.json",
            Artifact::Queries => "queries.json",
            Artifact::Qrels => "qrels.json",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Artifact::Corpus => "corpus",
            Artifact::Queries => "queries",
            Artifact::Qrels => "qrels",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    pub corpus_count: usize,
    pub queries_count: usize,
    pub qrels_count: usize,
    pub missing: BTreeSet<Artifact>,
}

impl DatasetSummary {
    pub fn count(&self, artifact: Artifact) -> usize {
        match artifact {
            Artifact::Corpus => self.corpus_count,
            Artifact::Queries => self.queries_count,
            Artifact::Qrels => self.qrels_count,
        }
    }
}
