//! On-demand downloads of curated data files.

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::DataError;

/// Downloads `url` to `dest`.
///
/// Implementations must be idempotent: an existing `dest` is left untouched.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DataError>;
}

/// Blocking HTTP downloads.
///
/// The body is streamed to `<dest>.part` and renamed on completion so an
/// interrupted download never leaves a truncated file at `dest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DataError> {
        if dest.exists() {
            debug!("{} already present, skipping download", dest.display());
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }

        info!("Downloading {} to {}", url, dest.display());
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DataError::fetch(url, format!("Failed to create HTTP client: {e}")))?;

        let mut response = client
            .get(url)
            .send()
            .map_err(|e| DataError::fetch(url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(DataError::fetch(
                url,
                format!("Download failed with status {}", response.status()),
            ));
        }

        let part = part_path(dest);
        let mut file = File::create(&part).map_err(|e| DataError::io(&part, e))?;
        let written = response
            .copy_to(&mut file)
            .map_err(|e| DataError::fetch(url, e.to_string()))?;
        drop(file);
        fs::rename(&part, dest).map_err(|e| DataError::io(dest, e))?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }
}
