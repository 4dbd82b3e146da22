//! Ports-tree source decisions that need no I/O.
//!
//! Repository strings are normalised to clone URLs, clone URLs are mapped to
//! a staging directory under the prefix, and custom source lists are checked
//! for a single default entry.

use crate::error::{ConfigError, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Host that `owner/repo` shorthands expand against.
pub const REPOSITORY_HOST: &str = "github.com";

/// Owner directory used when a URL does not point at [`REPOSITORY_HOST`].
pub const PLACEHOLDER_OWNER: &str = "custom";

/// Repository directory used when a URL does not point at [`REPOSITORY_HOST`].
pub const PLACEHOLDER_REPO: &str = "repository";

/// Marker flag that makes a `sources.conf` entry the default source.
pub const DEFAULT_FLAG: &str = "default";

/// Turn the `git-repository` input into a clone URL.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRepository`] for anything that is neither
/// a URL nor an `owner/repo` shorthand.
///
/// # Examples
///
/// ```
/// use setup_macports_common::sources::parse_repository;
///
/// assert_eq!(
///     parse_repository("macports/macports-ports")?,
///     "https://github.com/macports/macports-ports.git",
/// );
/// assert_eq!(parse_repository("git@example.org:me/ports.git")?, "git@example.org:me/ports.git");
/// assert!(parse_repository("ports").is_err());
/// # Ok::<(), setup_macports_common::error::ConfigError>(())
/// ```
pub fn parse_repository(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("git@") {
        return Ok(trimmed.to_owned());
    }
    if trimmed.contains("://") {
        return Err(invalid_repository(value));
    }
    let mut parts = trimmed.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if is_safe_segment(owner) && is_safe_segment(repo) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            Ok(format!("https://{REPOSITORY_HOST}/{owner}/{repo}.git"))
        }
        _ => Err(invalid_repository(value)),
    }
}

fn invalid_repository(value: &str) -> ConfigError {
    ConfigError::InvalidRepository {
        value: value.to_owned(),
    }
}

/// Owner and repository names taken from a clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPath {
    /// Owning user or organisation.
    pub owner: String,
    /// Repository name without `.git`.
    pub repo: String,
}

impl RepositoryPath {
    fn placeholder() -> Self {
        Self {
            owner: PLACEHOLDER_OWNER.to_owned(),
            repo: PLACEHOLDER_REPO.to_owned(),
        }
    }
}

/// Extract the owner and repository from a clone URL.
///
/// Only the URL's actual host is matched. A URL that merely mentions
/// `github.com` in its path, or whose segments could escape the staging
/// directory, maps to the placeholder names.
///
/// # Examples
///
/// ```
/// use setup_macports_common::sources::repository_path;
///
/// let path = repository_path("https://github.com/macports/macports-ports.git");
/// assert_eq!((path.owner.as_str(), path.repo.as_str()), ("macports", "macports-ports"));
///
/// let spoofed = repository_path("https://evil.example/github.com/macports/ports.git");
/// assert_eq!((spoofed.owner.as_str(), spoofed.repo.as_str()), ("custom", "repository"));
/// ```
#[must_use]
pub fn repository_path(url: &str) -> RepositoryPath {
    split_host_and_path(url.trim())
        .filter(|(host, _)| host.eq_ignore_ascii_case(REPOSITORY_HOST))
        .and_then(|(_, path)| owner_and_repo(path))
        .unwrap_or_else(RepositoryPath::placeholder)
}

fn split_host_and_path(url: &str) -> Option<(&str, &str)> {
    if let Some(rest) = url.strip_prefix("https://") {
        let (authority, path) = rest.split_once('/')?;
        let host = authority.rsplit('@').next()?;
        let host = host.split(':').next()?;
        return Some((host, path));
    }
    let rest = url.strip_prefix("git@")?;
    rest.split_once(':')
}

fn owner_and_repo(path: &str) -> Option<RepositoryPath> {
    let mut segments = path.trim_end_matches('/').split('/');
    let owner = segments.next()?;
    let repo = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    (is_safe_segment(owner) && is_safe_segment(repo)).then(|| RepositoryPath {
        owner: owner.to_owned(),
        repo: repo.to_owned(),
    })
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Directory the ports tree is cloned into for `url`.
///
/// Always `{prefix}/var/macports/sources/github.com/{owner}/{repo}`.
#[must_use]
pub fn git_source_dir(prefix: &Utf8Path, url: &str) -> Utf8PathBuf {
    let path = repository_path(url);
    prefix
        .join("var/macports/sources")
        .join(REPOSITORY_HOST)
        .join(path.owner)
        .join(path.repo)
}

/// Return `true` when a `sources.conf` line carries the default flag.
///
/// Flags are the comma-separated list inside a trailing `[...]`, so both
/// `url [default]` and `url [nosync,default]` count.
#[must_use]
pub fn is_default_source(line: &str) -> bool {
    let trimmed = line.trim_end();
    let Some(body) = trimmed.strip_suffix(']') else {
        return false;
    };
    body.rsplit_once('[').is_some_and(|(_, flags)| {
        flags
            .split(',')
            .any(|flag| flag.trim().eq_ignore_ascii_case(DEFAULT_FLAG))
    })
}

/// A custom source list ready for `sources.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSources {
    /// Entries in input order, exactly one marked default.
    pub entries: Vec<String>,
    /// Whether the default flag had to be added to the first entry.
    pub default_added: bool,
}

/// Check a custom source list and make sure exactly one entry is default.
///
/// # Errors
///
/// Returns [`ConfigError::EmptyCustomSources`] for an empty list and
/// [`ConfigError::ConflictingDefaultSources`] when several entries are
/// marked default.
pub fn validate_custom_sources(sources: &[String]) -> Result<CustomSources> {
    let Some((first, rest)) = sources.split_first() else {
        return Err(ConfigError::EmptyCustomSources);
    };
    match sources.iter().filter(|line| is_default_source(line)).count() {
        0 => {
            let mut entries = Vec::with_capacity(sources.len());
            entries.push(format!("{first} [{DEFAULT_FLAG}]"));
            entries.extend(rest.iter().cloned());
            Ok(CustomSources {
                entries,
                default_added: true,
            })
        }
        1 => Ok(CustomSources {
            entries: sources.to_vec(),
            default_added: false,
        }),
        count => Err(ConfigError::ConflictingDefaultSources { count }),
    }
}
