//! Installer package download.
//!
//! Provides a trait-based abstraction for fetching the MacPorts `.pkg`
//! so the orchestrator can be exercised without network access.

use crate::http::{USER_AGENT, download_agent};
use camino::Utf8Path;
use log::info;

/// Trait for downloading the installer package.
#[cfg_attr(test, mockall::automock)]
pub trait PackageDownloader {
    /// Download `url` into the file `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the package does not exist,
    /// or the file cannot be written.
    fn download(&self, url: &str, dest: &Utf8Path) -> Result<(), DownloadError>;
}

/// Errors arising from package downloads.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested package was not found (HTTP 404).
    #[error("package not found: {url}; check that this MacPorts version supports the host macOS release")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP-based downloader using `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDownloader;

impl PackageDownloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Utf8Path) -> Result<(), DownloadError> {
        info!("Downloading {url}");
        let response = download_agent()
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial = dest.with_extension("partial");
        let mut file = std::fs::File::create(&partial)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file)
            .map_err(DownloadError::Io)?;
        file.sync_all()?;
        std::fs::rename(&partial, dest)?;
        Ok(())
    }
}

/// Map a ureq error to a [`DownloadError`].
pub(crate) fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
