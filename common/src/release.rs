//! Release selection for `version: latest`.
//!
//! Filtering and ordering of the upstream release list. The network half of
//! version resolution lives in the installer crate; this module only decides
//! which release, if any, counts as the latest stable one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// Sentinel input that requests the newest stable release.
pub const LATEST: &str = "latest";

/// Version used when the release list is unavailable or has no stable entry.
pub const FALLBACK_VERSION: &str = "2.11.5";

/// Tag fragments that mark a pre-release regardless of the release flag.
const PRERELEASE_MARKERS: &[&str] = &["-rc", "-beta", "-alpha"];

/// One entry of the upstream release list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Git tag, e.g. `v2.11.5`.
    pub tag_name: String,
    /// Whether the host flags this release as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Whether the release is an unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Publication timestamp (RFC 3339 or `YYYY-MM-DD`).
    #[serde(default)]
    pub published_at: Option<String>,
}

/// Outcome of resolving the `version` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionResolution {
    /// Concrete version string.
    pub version: String,
    /// Whether the input was `latest`.
    pub was_latest: bool,
    /// The input exactly as given.
    pub original_input: String,
}

impl VersionResolution {
    /// Resolution for an explicit version: returned as-is.
    #[must_use]
    pub fn literal(input: &str) -> Self {
        Self {
            version: input.to_owned(),
            was_latest: false,
            original_input: input.to_owned(),
        }
    }

    /// Resolution of `latest` to the hardcoded fallback.
    #[must_use]
    pub fn fallback(input: &str) -> Self {
        Self::latest(input, FALLBACK_VERSION)
    }

    /// Resolution of `latest` to `version`.
    #[must_use]
    pub fn latest(input: &str, version: &str) -> Self {
        Self {
            version: version.to_owned(),
            was_latest: true,
            original_input: input.to_owned(),
        }
    }
}

/// Return `true` when `input` asks for the latest release.
///
/// The comparison trims whitespace and ignores case.
///
/// # Examples
///
/// ```
/// use setup_macports_common::release::is_latest_request;
///
/// assert!(is_latest_request(" Latest "));
/// assert!(!is_latest_request("2.10.0"));
/// ```
#[must_use]
pub fn is_latest_request(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(LATEST)
}

/// Return `true` when a tag ends in a release candidate, beta, or alpha
/// marker.
///
/// The marker may be followed only by a number such as `rc1` or `beta.2`,
/// so a marker in the middle of a tag does not count.
///
/// ```
/// use setup_macports_common::release::is_prerelease_tag;
///
/// assert!(is_prerelease_tag("v2.12.0-RC1"));
/// assert!(!is_prerelease_tag("v2.11.5-alphabet-fix"));
/// ```
#[must_use]
pub fn is_prerelease_tag(tag: &str) -> bool {
    let lower = tag.trim().to_ascii_lowercase();
    PRERELEASE_MARKERS.iter().any(|marker| {
        lower.rmatch_indices(marker).any(|(at, _)| {
            lower
                .get(at + marker.len()..)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
        })
    })
}

/// Pick the most recently published stable release.
///
/// A release is stable when neither its flags (`prerelease`, `draft`) nor
/// its tag mark it otherwise. Candidates are ordered by publication time,
/// newest first; unparseable timestamps sort last. The leading `v` of the
/// winning tag is stripped.
///
/// Returns `None` when no stable candidate remains.
#[must_use]
pub fn select_latest_stable(releases: &[Release]) -> Option<String> {
    let mut candidates: Vec<(Option<DateTime<Utc>>, &Release)> = releases
        .iter()
        .filter(|release| !release.prerelease && !release.draft)
        .filter(|release| !is_prerelease_tag(&release.tag_name))
        .map(|release| (parse_published(release.published_at.as_deref()), release))
        .collect();

    candidates.sort_by(|(left, _), (right, _)| right.cmp(left));

    candidates.first().map(|(_, release)| {
        let tag = release.tag_name.trim();
        tag.strip_prefix('v').unwrap_or(tag).to_owned()
    })
}

fn parse_published(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
