//! Resolution of the `version` input.
//!
//! An explicit version is returned untouched without network access.
//! `latest` is resolved against the upstream release list, retried a fixed
//! number of times, and degrades to a hardcoded version rather than failing
//! the run.

use crate::releases::{RELEASES_PER_PAGE, ReleaseSource};
use log::{debug, info, warn};
use setup_macports_common::release::{
    FALLBACK_VERSION, Release, VersionResolution, is_latest_request, select_latest_stable,
};
use std::time::Duration;

/// Total release lookup attempts before falling back.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay unit between attempts; attempt `n` is followed by `n` units.
pub const DEFAULT_RETRY_UNIT: Duration = Duration::from_secs(1);

/// Resolves `latest` to a concrete MacPorts version.
pub struct VersionResolver<'a> {
    source: &'a dyn ReleaseSource,
    retry_unit: Duration,
}

impl<'a> VersionResolver<'a> {
    /// Create a resolver that queries `source`.
    #[must_use]
    pub fn new(source: &'a dyn ReleaseSource) -> Self {
        Self {
            source,
            retry_unit: DEFAULT_RETRY_UNIT,
        }
    }

    /// Override the delay unit between attempts.
    #[must_use]
    pub const fn with_retry_unit(mut self, retry_unit: Duration) -> Self {
        self.retry_unit = retry_unit;
        self
    }

    /// Resolve the `version` input.
    ///
    /// Never fails: lookup errors and release lists without a stable entry
    /// both yield [`FALLBACK_VERSION`].
    #[must_use]
    pub fn resolve(&self, input: &str) -> VersionResolution {
        if !is_latest_request(input) {
            debug!("using requested MacPorts version {input}");
            return VersionResolution::literal(input);
        }

        let Some(releases) = self.fetch_with_retries() else {
            warn!("could not list MacPorts releases; using fallback version {FALLBACK_VERSION}");
            return VersionResolution::fallback(input);
        };

        match select_latest_stable(&releases) {
            Some(version) => {
                info!("Resolved latest MacPorts version to {version}");
                VersionResolution::latest(input, &version)
            }
            None => {
                warn!(
                    "no stable MacPorts release among {} listed; using fallback version {FALLBACK_VERSION}",
                    releases.len()
                );
                VersionResolution::fallback(input)
            }
        }
    }

    fn fetch_with_retries(&self) -> Option<Vec<Release>> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.source.fetch_releases(RELEASES_PER_PAGE) {
                Ok(releases) => return Some(releases),
                Err(err) => {
                    warn!("release lookup attempt {attempt}/{MAX_ATTEMPTS} failed: {err}");
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(self.retry_unit * attempt);
                    }
                }
            }
        }
        None
    }
}
