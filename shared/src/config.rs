use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_DATA_ROOT: &str = "beir_data";
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://public.ukp.informatik.tu-darmstadt.de/thakur/BEIR/datasets";
pub const DEFAULT_K_VALUES: [usize; 5] = [1, 3, 5, 10, 100];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Where datasets live and how they are fetched and evaluated.
#[derive(Debug, Clone)]
pub struct BeirConfig {
    pub data_root: PathBuf,
    pub download_url: String,
    pub default_k_values: Vec<usize>,
}

impl Default for BeirConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            default_k_values: DEFAULT_K_VALUES.to_vec(),
        }
    }
}

impl BeirConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_root = env::var("BEIR_DATA_ROOT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_root);
        let download_url = env::var("BEIR_DOWNLOAD_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.download_url);
        let default_k_values = match env::var("BEIR_DEFAULT_K_VALUES") {
            Ok(raw) => parse_k_values(&raw).map_err(|_| ConfigError::InvalidValue {
                var: "BEIR_DEFAULT_K_VALUES".to_string(),
                value: raw.clone(),
            })?,
            Err(_) => defaults.default_k_values,
        };

        Ok(Self {
            data_root,
            download_url,
            default_k_values,
        })
    }

    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }

    pub fn dataset_dir(&self, dataset_name: &str) -> PathBuf {
        self.data_root.join(dataset_name)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

/// Parses a comma-separated list of positive cutoffs such as `1,3,5,10`.
pub fn parse_k_values(raw: &str) -> Result<Vec<usize>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        var: "k_values".to_string(),
        value: raw.to_string(),
    };

    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<usize>() {
            Ok(k) if k > 0 => Ok(k),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.is_empty() {
        return Err(invalid());
    }
    Ok(values)
}
