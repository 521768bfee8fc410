pub mod beir;
pub mod catalog;
pub mod download;
pub mod normalize;

pub use beir::{canonical_paths, BeirFetcher};
pub use catalog::{available_dataset_names, list_local_datasets, KNOWN_DATASETS};
pub use download::{ArchiveSource, HttpArchiveSource};

use crate::error::{BeirError, Result};

/// Dataset names become directory and archive names, so they must be a single
/// plain path component.
pub fn validate_dataset_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\')
        && !name.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(BeirError::InvalidDatasetName(name.to_string()))
    }
}
