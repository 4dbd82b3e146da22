//! Release listing from the GitHub API.

use crate::http::{USER_AGENT, api_agent};
use log::debug;
use setup_macports_common::release::Release;
use setup_macports_common::settings::GithubToken;

/// Release list endpoint for MacPorts base.
pub const RELEASES_URL: &str = "https://api.github.com/repos/macports/macports-base/releases";

/// Number of releases requested per lookup.
pub const RELEASES_PER_PAGE: u8 = 100;

/// Source of upstream release metadata.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseSource {
    /// Fetch up to `per_page` of the most recent releases.
    ///
    /// # Errors
    ///
    /// Returns a [`ReleaseFetchError`] when the request or decoding fails.
    fn fetch_releases(&self, per_page: u8) -> Result<Vec<Release>, ReleaseFetchError>;
}

/// Errors arising from a release lookup.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseFetchError {
    /// The request failed before a usable response arrived.
    #[error("release lookup failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The API answered with an error status.
    #[error("release lookup for {url} returned HTTP {status}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body was not a release list.
    #[error("could not decode release list from {url}: {reason}")]
    Decode {
        /// The URL that was requested.
        url: String,
        /// Decoder message.
        reason: String,
    },
}

/// Release source backed by the GitHub REST API.
#[derive(Debug, Clone, Default)]
pub struct GithubReleases {
    token: Option<GithubToken>,
}

impl GithubReleases {
    /// Create a source that authenticates with `token` when present.
    #[must_use]
    pub fn new(token: Option<GithubToken>) -> Self {
        Self { token }
    }
}

impl ReleaseSource for GithubReleases {
    fn fetch_releases(&self, per_page: u8) -> Result<Vec<Release>, ReleaseFetchError> {
        let url = format!("{RELEASES_URL}?per_page={per_page}");
        debug!("GET {url}");

        let mut request = api_agent()
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {}", token.expose()));
        }

        let response = request.call().map_err(|err| match err {
            ureq::Error::StatusCode(status) => ReleaseFetchError::Status {
                url: url.clone(),
                status,
            },
            other => ReleaseFetchError::Http {
                url: url.clone(),
                reason: other.to_string(),
            },
        })?;
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|err| ReleaseFetchError::Http {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        decode_releases(&url, &body)
    }
}

/// Decode a release list response body.
///
/// # Errors
///
/// Returns [`ReleaseFetchError::Decode`] when `body` is not a JSON array of
/// releases.
pub fn decode_releases(url: &str, body: &str) -> Result<Vec<Release>, ReleaseFetchError> {
    serde_json::from_str(body).map_err(|err| ReleaseFetchError::Decode {
        url: url.to_owned(),
        reason: err.to_string(),
    })
}
