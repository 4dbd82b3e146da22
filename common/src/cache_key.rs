//! Cache key derivation for the three cache partitions.
//!
//! All keys are pure functions of [`Settings`], [`PlatformInfo`], and (for
//! the full-installation key) a [`CacheContext`] describing the workflow run.
//! Digests are SHA-256 over a canonical JSON rendering in which every list is
//! sorted first, so input order never changes a key while any change of
//! membership does.
//!
//! Key formats:
//!
//! - full installation: `{ns}-{version}-{arch}-{major}-{config}-{context}`
//! - simple: `{ns}-{version}-{arch}-{major}`
//! - setup only: `{ns}-setup-{version}-{arch}-{major}`
//! - ports only: `{ns}-ports-{provider}-{ref}-{major}`
//! - legacy: `{ns}-{release}-{arch}-v2-{40 hex}`

use crate::error::{ConfigError, Result};
use crate::platform::PlatformInfo;
use crate::settings::{DEFAULT_GIT_REF, Settings, SourcesProvider};
use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Namespace prefixed to every cache key.
pub const CACHE_NAMESPACE: &str = "macports";

/// Hex characters kept from the configuration digest.
const CONFIG_HASH_LEN: usize = 16;

/// Hex characters kept from the run-context digest.
const CONTEXT_HASH_LEN: usize = 8;

/// Hex characters in the legacy key digest.
const LEGACY_DIGEST_LEN: usize = 40;

/// Which textual form the full-installation key takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheKeyScheme {
    /// Configuration and run-context fingerprint with restore keys.
    #[default]
    Fingerprint,
    /// Version, architecture, and platform only.
    Simple,
    /// The original hash-based form, kept for existing caches.
    Legacy,
}

impl FromStr for CacheKeyScheme {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fingerprint" => Ok(Self::Fingerprint),
            "simple" => Ok(Self::Simple),
            "legacy" => Ok(Self::Legacy),
            _ => Err(ConfigError::InvalidCacheKeyScheme {
                value: value.to_owned(),
            }),
        }
    }
}

/// Workflow-run facts folded into the full-installation key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheContext {
    /// Workflow identifier (`GITHUB_WORKFLOW`).
    pub workflow: String,
    /// Git ref that triggered the run (`GITHUB_REF`).
    pub git_ref: String,
    /// Pull request target branch (`GITHUB_BASE_REF`), if any.
    pub base_ref: Option<String>,
    /// Version of this tool.
    pub tool_version: String,
}

/// Primary key plus fallbacks for the full-installation partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyResult {
    /// The most specific key.
    pub cache_key: String,
    /// Progressively less specific prefixes, most specific first.
    pub restore_keys: Vec<String>,
}

/// Every key a run needs, derived together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    /// Full installation partition.
    pub installation: CacheKeyResult,
    /// Base installation only.
    pub setup: String,
    /// Ports tree only.
    pub ports: String,
}

impl CacheKeys {
    /// Derive all partition keys for a run.
    #[must_use]
    pub fn derive(settings: &Settings, platform: &PlatformInfo, context: &CacheContext) -> Self {
        Self {
            installation: installation_cache_key(settings, platform, context),
            setup: generate_setup_cache_key(settings, platform),
            ports: generate_ports_cache_key(settings, platform),
        }
    }
}

#[derive(Serialize)]
struct CanonicalVariants<'a> {
    select: Vec<&'a str>,
    deselect: Vec<&'a str>,
}

#[derive(Serialize)]
struct CanonicalConfig<'a> {
    prefix: &'a str,
    version: &'a str,
    variants: CanonicalVariants<'a>,
    sources: Vec<&'a str>,
}

#[derive(Serialize)]
struct CanonicalContext<'a> {
    workflow: &'a str,
    git_ref: &'a str,
    tool_version: &'a str,
}

/// Derive the full-installation key in the configured scheme.
#[must_use]
pub fn installation_cache_key(
    settings: &Settings,
    platform: &PlatformInfo,
    context: &CacheContext,
) -> CacheKeyResult {
    match settings.cache_key_scheme {
        CacheKeyScheme::Fingerprint => generate_cache_key(settings, platform, context),
        CacheKeyScheme::Simple => {
            let cache_key = generate_simple_cache_key(settings, platform);
            let restore_keys = vec![format!(
                "{CACHE_NAMESPACE}-{}-{}-",
                settings.effective_version(),
                platform.architecture
            )];
            CacheKeyResult {
                cache_key,
                restore_keys,
            }
        }
        CacheKeyScheme::Legacy => CacheKeyResult {
            cache_key: generate_legacy_cache_key(settings, platform),
            restore_keys: Vec::new(),
        },
    }
}

/// Derive the full-installation fingerprint key and its restore keys.
///
/// # Examples
///
/// ```
/// use setup_macports_common::cache_key::{CacheContext, generate_cache_key};
/// use setup_macports_common::platform::{Architecture, PlatformInfo};
/// use setup_macports_common::settings::Settings;
///
/// let settings = Settings { version: "2.11.5".to_owned(), ..Settings::default() };
/// let platform = PlatformInfo::from_version_number("15.2", Architecture::Arm64)?;
/// let keys = generate_cache_key(&settings, &platform, &CacheContext::default());
///
/// assert!(keys.cache_key.starts_with("macports-2.11.5-arm64-15-"));
/// assert_eq!(keys.restore_keys.last().map(String::as_str), Some("macports-2.11.5-arm64-"));
/// # Ok::<(), setup_macports_common::error::ConfigError>(())
/// ```
#[must_use]
pub fn generate_cache_key(
    settings: &Settings,
    platform: &PlatformInfo,
    context: &CacheContext,
) -> CacheKeyResult {
    let version = settings.effective_version();
    let arch = platform.architecture;
    let major = platform.platform_major();
    let config_hash = config_hash(settings);
    let context_hash = context_hash(context);

    let cache_key = format!("{CACHE_NAMESPACE}-{version}-{arch}-{major}-{config_hash}-{context_hash}");
    let restore_keys = vec![
        format!("{CACHE_NAMESPACE}-{version}-{arch}-{major}-{config_hash}-"),
        format!("{CACHE_NAMESPACE}-{version}-{arch}-{major}-"),
        format!("{CACHE_NAMESPACE}-{version}-{arch}-"),
    ];

    debug!("installation cache key: {cache_key}");
    CacheKeyResult {
        cache_key,
        restore_keys,
    }
}

/// Derive the `{ns}-{version}-{arch}-{major}` key.
#[must_use]
pub fn generate_simple_cache_key(settings: &Settings, platform: &PlatformInfo) -> String {
    format!(
        "{CACHE_NAMESPACE}-{}-{}-{}",
        settings.effective_version(),
        platform.architecture,
        platform.platform_major()
    )
}

/// Derive the base-installation key.
///
/// Only the version, architecture, and platform contribute: the installed
/// base is identical across variant, source, and prefix choices.
#[must_use]
pub fn generate_setup_cache_key(settings: &Settings, platform: &PlatformInfo) -> String {
    format!(
        "{CACHE_NAMESPACE}-setup-{}-{}-{}",
        settings.effective_version(),
        platform.architecture,
        platform.platform_major()
    )
}

/// Derive the ports-tree key.
///
/// Only what would be synchronised contributes. `auto` and `rsync` share the
/// `rsync` bucket; the git ref only counts in explicit `git` mode.
#[must_use]
pub fn generate_ports_cache_key(settings: &Settings, platform: &PlatformInfo) -> String {
    let is_git = settings.sources_provider == SourcesProvider::Git;
    let provider = if is_git { "git" } else { "rsync" };
    let git_ref = match (&settings.git_ref, is_git) {
        (Some(git_ref), true) => git_ref.as_str(),
        _ => DEFAULT_GIT_REF,
    };
    format!(
        "{CACHE_NAMESPACE}-ports-{provider}-{git_ref}-{}",
        platform.platform_major()
    )
}

/// Derive the legacy `{ns}-{release}-{arch}-v2-{digest}` key.
#[must_use]
pub fn generate_legacy_cache_key(settings: &Settings, platform: &PlatformInfo) -> String {
    let digest = truncated_digest(&canonical_config_json(settings), LEGACY_DIGEST_LEN);
    format!(
        "{CACHE_NAMESPACE}-{}-{}-v2-{digest}",
        platform.version, platform.architecture
    )
}

/// Digest of the prefix, effective version, sorted variants, and sorted
/// sources.
#[must_use]
pub fn config_hash(settings: &Settings) -> String {
    truncated_digest(&canonical_config_json(settings), CONFIG_HASH_LEN)
}

/// Digest of the workflow, normalised git ref, and tool version.
#[must_use]
pub fn context_hash(context: &CacheContext) -> String {
    let git_ref = normalize_git_ref(&context.git_ref, context.base_ref.as_deref());
    let canonical = CanonicalContext {
        workflow: &context.workflow,
        git_ref: &git_ref,
        tool_version: &context.tool_version,
    };
    truncated_digest(&to_canonical_json(&canonical), CONTEXT_HASH_LEN)
}

/// Normalise a git ref for cache keying.
///
/// Branch and tag refs lose their `refs/heads/` or `refs/tags/` prefix; a
/// pull-request merge ref becomes the target branch when one is known.
///
/// # Examples
///
/// ```
/// use setup_macports_common::cache_key::normalize_git_ref;
///
/// assert_eq!(normalize_git_ref("refs/heads/main", None), "main");
/// assert_eq!(normalize_git_ref("refs/pull/42/merge", Some("develop")), "develop");
/// assert_eq!(normalize_git_ref("abc123", None), "abc123");
/// ```
#[must_use]
pub fn normalize_git_ref(git_ref: &str, base_ref: Option<&str>) -> String {
    if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
        return branch.to_owned();
    }
    if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
        return tag.to_owned();
    }
    let is_merge_ref = git_ref.starts_with("refs/pull/") && git_ref.ends_with("/merge");
    match base_ref.filter(|base| !base.is_empty()) {
        Some(base) if is_merge_ref => base.to_owned(),
        _ => git_ref.to_owned(),
    }
}

fn canonical_config_json(settings: &Settings) -> String {
    let canonical = CanonicalConfig {
        prefix: settings.prefix.as_str(),
        version: settings.effective_version(),
        variants: CanonicalVariants {
            select: sorted(&settings.variants.select),
            deselect: sorted(&settings.variants.deselect),
        },
        sources: sorted(&settings.sources),
    };
    to_canonical_json(&canonical)
}

fn sorted(values: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted
}

fn to_canonical_json<T: Serialize>(value: &T) -> String {
    // Serialising these borrowed, string-only structs cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

fn truncated_digest(input: &str, len: usize) -> String {
    let mut hex = format!("{:x}", Sha256::digest(input.as_bytes()));
    hex.truncate(len);
    hex
}

#[cfg(test)]
#[path = "cache_key_tests.rs"]
mod tests;
