//! Ports tree acquisition.
//!
//! [`SourceProviderResolver`] turns the configured provider into a
//! [`SourceSelection`]: the entries that end up in `sources.conf` plus
//! whatever was fetched to back them. Only `auto` swallows git failures;
//! explicit `git` is fail-fast.

use crate::error::Result;
use crate::exec::{CommandExecutor, ExecOptions, Privileged, run_checked};
use camino::{Utf8Path, Utf8PathBuf};
use log::{Level, info, warn};
use setup_macports_common::settings::{Settings, SourcesProvider};
use setup_macports_common::sources::{
    DEFAULT_FLAG, git_source_dir, parse_repository, validate_custom_sources,
};

/// Scheme prefix of mirror URLs.
const RSYNC_SCHEME: &str = "rsync://";

/// Fetches a git checkout of the ports tree.
#[cfg_attr(test, mockall::automock)]
pub trait SourceFetcher {
    /// Make `dest` a checkout of `url` at `git_ref`.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository cannot be fetched or indexed.
    fn fetch(&self, url: &str, git_ref: &str, dest: &Utf8Path) -> Result<()>;
}

/// How the ports tree is provided for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    /// A local git checkout.
    Git {
        /// Clone URL.
        url: String,
        /// Checkout directory.
        path: Utf8PathBuf,
    },
    /// The rsync mirror.
    Rsync {
        /// Mirror URL.
        url: String,
        /// Why git was abandoned, when `auto` fell back.
        fallback_reason: Option<String>,
    },
    /// User-supplied `sources.conf` lines.
    Custom {
        /// Lines with exactly one `[default]` entry.
        entries: Vec<String>,
    },
}

impl SourceSelection {
    /// Lines to write to `sources.conf`.
    #[must_use]
    pub fn conf_entries(&self) -> Vec<String> {
        match self {
            Self::Git { path, .. } => vec![format!("file://{path} [{DEFAULT_FLAG}]")],
            Self::Rsync { url, .. } => vec![format!("{url} [{DEFAULT_FLAG}]")],
            Self::Custom { entries } => entries.clone(),
        }
    }

    /// Return `true` when `port sync` must be run to populate the tree.
    #[must_use]
    pub const fn needs_sync(&self) -> bool {
        matches!(self, Self::Rsync { .. } | Self::Custom { .. })
    }

    /// Describe the selection for action outputs.
    #[must_use]
    pub fn summary(&self) -> SourceSummary {
        let git_dir = match self {
            Self::Git { path, .. } => Some(path.as_path()),
            Self::Rsync { .. } | Self::Custom { .. } => None,
        };
        SourceSummary::from_entries(self.conf_entries(), git_dir)
    }
}

/// Facts about the configured sources, as reported to later steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    /// The `sources.conf` lines.
    pub entries: Vec<String>,
    /// Whether a git checkout backs the default source.
    pub uses_git: bool,
    /// The git checkout, when used.
    pub git_source_path: Option<Utf8PathBuf>,
    /// Every rsync URL among the entries.
    pub rsync_urls: Vec<String>,
}

impl SourceSummary {
    /// Summarise `sources.conf` lines.
    ///
    /// `git_dir` is the checkout a git-backed run would use; it counts as
    /// in use only when an entry points at it.
    #[must_use]
    pub fn from_entries(entries: Vec<String>, git_dir: Option<&Utf8Path>) -> Self {
        let git_source_path = git_dir
            .filter(|dir| {
                let url = format!("file://{dir}");
                entries.iter().any(|line| entry_url(line) == url)
            })
            .map(Utf8Path::to_path_buf);
        let rsync_urls = entries
            .iter()
            .map(|line| entry_url(line))
            .filter(|url| url.starts_with(RSYNC_SCHEME))
            .map(str::to_owned)
            .collect();
        Self {
            uses_git: git_source_path.is_some(),
            git_source_path,
            rsync_urls,
            entries,
        }
    }
}

fn entry_url(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or_default()
}

/// Chooses and prepares the ports tree source.
pub struct SourceProviderResolver<'a> {
    fetcher: &'a dyn SourceFetcher,
}

impl<'a> SourceProviderResolver<'a> {
    /// Create a resolver that fetches git sources through `fetcher`.
    #[must_use]
    pub fn new(fetcher: &'a dyn SourceFetcher) -> Self {
        Self { fetcher }
    }

    /// Resolve the configured provider.
    ///
    /// # Errors
    ///
    /// `git` propagates any fetch or repository error. `custom` fails on an
    /// empty list or on more than one `[default]` entry. `auto` and `rsync`
    /// never fail.
    pub fn resolve(&self, settings: &Settings) -> Result<SourceSelection> {
        match settings.sources_provider {
            SourcesProvider::Git => self.fetch_git(settings),
            SourcesProvider::Auto => Ok(self.fetch_git(settings).unwrap_or_else(|err| {
                warn!("git sources unavailable, falling back to rsync: {err}");
                rsync(settings, Some(err.to_string()))
            })),
            SourcesProvider::Rsync => Ok(rsync(settings, None)),
            SourcesProvider::Custom => {
                let custom = validate_custom_sources(&settings.sources)?;
                if custom.default_added {
                    warn!("no custom source is marked [{DEFAULT_FLAG}]; using the first entry as the default");
                }
                Ok(SourceSelection::Custom {
                    entries: custom.entries,
                })
            }
        }
    }

    fn fetch_git(&self, settings: &Settings) -> Result<SourceSelection> {
        let url = parse_repository(&settings.git_repository)?;
        let path = git_source_dir(settings.prefix(), &url);
        let git_ref = settings.git_ref_or_default();
        info!("Fetching ports tree from {url} at {git_ref}");
        self.fetcher.fetch(&url, git_ref, &path)?;
        Ok(SourceSelection::Git { url, path })
    }
}

fn rsync(settings: &Settings, fallback_reason: Option<String>) -> SourceSelection {
    SourceSelection::Rsync {
        url: settings.rsync_url.clone(),
        fallback_reason,
    }
}

/// Populate the ports tree with `port -N sync` when the selection needs it.
///
/// # Errors
///
/// Fails when `port sync` cannot be run or exits unsuccessfully.
pub fn sync_sources(
    executor: &dyn CommandExecutor,
    prefix: &Utf8Path,
    selection: &SourceSelection,
) -> Result<()> {
    if !selection.needs_sync() {
        return Ok(());
    }
    let port = prefix.join("bin/port");
    run_checked(
        &Privileged::new(executor),
        port.as_str(),
        &["-N", "sync"],
        &ExecOptions::default().stderr_at(Level::Info),
    )?;
    Ok(())
}
