//! The validated configuration for one action invocation.
//!
//! [`Settings`] is built once from raw inputs by
//! [`parse_settings`](crate::inputs::parse_settings) and treated as immutable
//! afterwards, with one exception: [`Settings::apply_resolution`] records the
//! concrete version when the caller asked for `latest`. Every consumer that
//! needs a version must go through [`Settings::effective_version`].

use crate::cache_key::CacheKeyScheme;
use crate::error::{ConfigError, Result};
use crate::release::VersionResolution;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Installation prefix used by the MacPorts binary packages.
pub const DEFAULT_PREFIX: &str = "/opt/local";

/// Default repository for git-based port sources.
pub const DEFAULT_GIT_REPOSITORY: &str = "macports/macports-ports";

/// Branch used when no git ref is configured.
pub const DEFAULT_GIT_REF: &str = "master";

/// Default rsync mirror for the ports tree.
pub const DEFAULT_RSYNC_URL: &str = "rsync://rsync.macports.org/macports/release/tarballs/ports.tar";

/// How the ports tree is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourcesProvider {
    /// Try git, fall back to rsync on any failure.
    #[default]
    Auto,
    /// Clone the configured git repository; failures are fatal.
    Git,
    /// Use the rsync mirror configured in `sources.conf`.
    Rsync,
    /// Use the user-supplied source list verbatim.
    Custom,
}

impl SourcesProvider {
    /// Return the input spelling of this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Git => "git",
            Self::Rsync => "rsync",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for SourcesProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "git" => Ok(Self::Git),
            "rsync" => Ok(Self::Rsync),
            "custom" => Ok(Self::Custom),
            _ => Err(ConfigError::InvalidProvider {
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for SourcesProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package signature policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureCheck {
    /// An unverifiable installer package aborts the run.
    #[default]
    Strict,
    /// Verification failures are reported as warnings, and ports listed in
    /// `signature-skip-packages` are installed with `-f`.
    Permissive,
    /// No verification is attempted.
    Disabled,
}

impl SignatureCheck {
    /// Return the input spelling of this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for SignatureCheck {
    type Err = ConfigError;

    /// Parse both the enum form and the legacy boolean form
    /// (`true` → strict, `false` → disabled).
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" | "true" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            "disabled" | "false" => Ok(Self::Disabled),
            _ => Err(ConfigError::InvalidSignatureCheck {
                value: value.to_owned(),
            }),
        }
    }
}

/// Globally selected and deselected variants.
///
/// Names are stored without their `+`/`-` sign, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSelection {
    /// Variants enabled with `+`.
    pub select: Vec<String>,
    /// Variants disabled with `-`.
    pub deselect: Vec<String>,
}

impl VariantSelection {
    /// Return `true` when no variant is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.select.is_empty() && self.deselect.is_empty()
    }

    /// Render the selection in `variants.conf` syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use setup_macports_common::settings::VariantSelection;
    ///
    /// let variants = VariantSelection {
    ///     select: vec!["aqua".to_owned()],
    ///     deselect: vec!["x11".to_owned()],
    /// };
    /// assert_eq!(variants.to_conf_line(), "+aqua -x11");
    /// ```
    #[must_use]
    pub fn to_conf_line(&self) -> String {
        self.select
            .iter()
            .map(|name| format!("+{name}"))
            .chain(self.deselect.iter().map(|name| format!("-{name}")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A port to install after setup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortSpec {
    /// Port name, e.g. `db48`.
    pub name: String,
    /// Variant flags passed verbatim after the port name, e.g. `+tcl -java`.
    #[serde(default)]
    pub variants: Option<String>,
}

impl PortSpec {
    /// Create a port without variant flags.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: None,
        }
    }

    /// Return the variant flags split into individual tokens.
    pub fn variant_tokens(&self) -> impl Iterator<Item = &str> {
        self.variants.as_deref().unwrap_or_default().split_whitespace()
    }
}

/// A GitHub API token.
///
/// The `Debug` representation never reveals the token.
#[derive(Clone, PartialEq, Eq)]
pub struct GithubToken(String);

impl GithubToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Return the raw token for use in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GithubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GithubToken(***)")
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Requested MacPorts version, possibly the literal `latest`.
    pub version: String,
    /// Concrete version, set only when `version` was `latest`.
    pub resolved_version: Option<String>,
    /// Installation prefix.
    pub prefix: Utf8PathBuf,
    /// Global variant selection written to `variants.conf`.
    pub variants: VariantSelection,
    /// Source locations for the `custom` provider, in input order.
    pub sources: Vec<String>,
    /// Ports to install after setup, in input order.
    pub ports: Vec<PortSpec>,
    /// Ports tree acquisition mode.
    pub sources_provider: SourcesProvider,
    /// `owner/repo` or clone URL of the ports repository.
    pub git_repository: String,
    /// Branch, tag, or commit to check out.
    pub git_ref: Option<String>,
    /// Rsync mirror URL for the ports tree.
    pub rsync_url: String,
    /// Add `{prefix}/bin` and `{prefix}/sbin` to `PATH`.
    pub prepend_path: bool,
    /// Pass `-v` to port installs and log at debug level.
    pub verbose: bool,
    /// Log at trace level.
    pub debug: bool,
    /// Restore and save installation caches.
    pub cache: bool,
    /// Format of the full-installation cache key.
    pub cache_key_scheme: CacheKeyScheme,
    /// Installer package signature policy.
    pub signature_check: SignatureCheck,
    /// Ports force-installed under [`SignatureCheck::Permissive`].
    pub signature_skip_packages: Vec<String>,
    /// Token for the GitHub releases API.
    pub github_token: Option<GithubToken>,
}

impl Default for Settings {
    /// Settings equivalent to running the action with no inputs.
    fn default() -> Self {
        Self {
            version: crate::release::LATEST.to_owned(),
            resolved_version: None,
            prefix: Utf8PathBuf::from(DEFAULT_PREFIX),
            variants: VariantSelection::default(),
            sources: Vec::new(),
            ports: Vec::new(),
            sources_provider: SourcesProvider::Auto,
            git_repository: DEFAULT_GIT_REPOSITORY.to_owned(),
            git_ref: None,
            rsync_url: DEFAULT_RSYNC_URL.to_owned(),
            prepend_path: true,
            verbose: false,
            debug: false,
            cache: true,
            cache_key_scheme: CacheKeyScheme::Fingerprint,
            signature_check: SignatureCheck::Strict,
            signature_skip_packages: Vec::new(),
            github_token: None,
        }
    }
}

impl Settings {
    /// Return the version every derivation should use.
    ///
    /// Prefers the resolved version over the raw input.
    #[must_use]
    pub fn effective_version(&self) -> &str {
        self.resolved_version.as_deref().unwrap_or(&self.version)
    }

    /// Return the configured git ref, or [`DEFAULT_GIT_REF`].
    #[must_use]
    pub fn git_ref_or_default(&self) -> &str {
        self.git_ref.as_deref().unwrap_or(DEFAULT_GIT_REF)
    }

    /// Return the installation prefix.
    #[must_use]
    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    /// Record the outcome of version resolution.
    ///
    /// Only a resolution of `latest` populates `resolved_version`.
    pub fn apply_resolution(&mut self, resolution: &VersionResolution) {
        if resolution.was_latest {
            self.resolved_version = Some(resolution.version.clone());
        }
    }

    /// Return `true` if `port` should be installed with `-f`.
    #[must_use]
    pub fn skips_signature_for(&self, port: &str) -> bool {
        self.signature_check == SignatureCheck::Permissive
            && self.signature_skip_packages.iter().any(|name| name == port)
    }

    /// Check the invariants every run relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyVersion`] or [`ConfigError::RelativePrefix`].
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion);
        }
        if !self.prefix.as_str().starts_with('/') {
            return Err(ConfigError::RelativePrefix {
                prefix: self.prefix.to_string(),
            });
        }
        Ok(())
    }
}
