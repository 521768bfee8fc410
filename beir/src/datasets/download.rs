use crate::error::{BeirError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

/// Somewhere a dataset archive can be fetched from.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Writes the `<dataset_name>.zip` archive to `destination`.
    async fn fetch_archive(&self, dataset_name: &str, destination: &Path) -> Result<()>;
}

/// Streams archives over HTTP from `<url_base>/<dataset_name>.zip`.
pub struct HttpArchiveSource {
    client: Client,
    url_base: String,
    show_progress: bool,
}

impl HttpArchiveSource {
    pub fn new(url_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url_base: url_base.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn archive_url(&self, dataset_name: &str) -> String {
        format!(
            "{}/{}.zip",
            self.url_base.trim_end_matches('/'),
            dataset_name
        )
    }

    fn progress_bar(&self, total_size: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let progress_bar = ProgressBar::new(total_size);
        progress_bar.set_style(style);
        progress_bar
    }
}

fn download_error(dataset_name: &str, reason: impl ToString) -> BeirError {
    BeirError::Download {
        dataset: dataset_name.to_string(),
        reason: reason.to_string(),
    }
}

/// The archive only appears under its final name once fully written.
fn partial_path(destination: &Path) -> PathBuf {
    destination.with_extension("zip.part")
}

async fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial download {}: {}", path.display(), e);
        }
    }
}

async fn stream_to_file(
    dataset_name: &str,
    response: Response,
    path: &Path,
    progress_bar: &ProgressBar,
) -> Result<u64> {
    let mut file = BufWriter::new(File::create(path).await?);
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| download_error(dataset_name, e))?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        progress_bar.set_position(downloaded);
    }

    file.flush().await?;
    Ok(downloaded)
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch_archive(&self, dataset_name: &str, destination: &Path) -> Result<()> {
        let url = self.archive_url(dataset_name);
        info!("Downloading from {} to {}", url, destination.display());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| download_error(dataset_name, e))?;

        if !response.status().is_success() {
            return Err(download_error(
                dataset_name,
                format!("HTTP {}", response.status()),
            ));
        }

        let progress_bar = self.progress_bar(response.content_length().unwrap_or(0));
        let partial = partial_path(destination);

        let downloaded = match stream_to_file(dataset_name, response, &partial, &progress_bar).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&partial, destination).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }

        progress_bar.finish_with_message("Download completed");
        info!("Downloaded {} bytes for {}", downloaded, dataset_name);
        Ok(())
    }
}
