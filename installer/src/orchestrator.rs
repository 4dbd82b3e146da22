//! Main and post phases of the action.
//!
//! The main phase settles the version and platform, restores what it can
//! from the cache, installs MacPorts, prepares the ports tree, writes the
//! configuration, installs the requested ports, and publishes outputs. The
//! post phase saves the full installation when the main phase missed the
//! cache.
//!
//! Every collaborator that touches the host arrives through [`Services`],
//! so both phases run unchanged against stubs.

use crate::actions::logger::group;
use crate::actions::runtime::ActionsRuntime;
use crate::actions::state::{PhaseState, scratch_dir};
use crate::cache::{CacheStore, restore_best_effort, save_best_effort};
use crate::config_files::{ConfigPaths, ConfigWriter};
use crate::download::PackageDownloader;
use crate::error::Result;
use crate::exec::{CommandExecutor, ExecOptions, Privileged, run_checked};
use crate::pkg::PackageInstaller;
use crate::platform::PlatformDetector;
use crate::ports::install_ports;
use crate::releases::ReleaseSource;
use crate::sources::{
    SourceFetcher, SourceProviderResolver, SourceSelection, SourceSummary, sync_sources,
};
use crate::version::VersionResolver;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use setup_macports_common::cache_key::{CacheContext, CacheKeys};
use setup_macports_common::package_url::build_package_url;
use setup_macports_common::settings::{Settings, SourcesProvider};
use setup_macports_common::sources::{git_source_dir, parse_repository};
use std::time::Duration;

/// Ports tree beneath the prefix, cached as its own partition.
pub const PORTS_TREE_DIR: &str = "var/macports/sources";

/// Host-facing collaborators for one run.
pub struct Services<'a> {
    /// Runs external commands.
    pub executor: &'a dyn CommandExecutor,
    /// Describes the host.
    pub platform: &'a dyn PlatformDetector,
    /// Lists upstream releases for `latest`.
    pub releases: &'a dyn ReleaseSource,
    /// Downloads the installer package.
    pub downloader: &'a dyn PackageDownloader,
    /// Fetches git-backed ports trees.
    pub fetcher: &'a dyn SourceFetcher,
    /// Cache backend, when one is available.
    pub cache: Option<&'a dyn CacheStore>,
}

/// Facts about the surrounding workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnvironment {
    /// Workflow facts folded into the cache key.
    pub context: CacheContext,
    /// Where the installer package is downloaded.
    pub work_dir: Utf8PathBuf,
    /// Account that should own the prefix so it can be archived.
    pub user: Option<String>,
    /// Location of the persisted phase state.
    pub state_file: Utf8PathBuf,
    /// Base delay between release lookups.
    pub retry_unit: Duration,
}

impl RunEnvironment {
    /// Read the run facts from the runner environment.
    #[must_use]
    pub fn from_env(state_file: Utf8PathBuf) -> Self {
        Self {
            context: CacheContext {
                workflow: env_var("GITHUB_WORKFLOW").unwrap_or_default(),
                git_ref: env_var("GITHUB_REF").unwrap_or_default(),
                base_ref: env_var("GITHUB_BASE_REF"),
                tool_version: env!("CARGO_PKG_VERSION").to_owned(),
            },
            work_dir: scratch_dir(),
            user: env_var("USER"),
            state_file,
            retry_unit: Duration::from_secs(1),
        }
    }
}

/// Values published as step outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutputs {
    /// Installed MacPorts version.
    pub version: String,
    /// Installation prefix.
    pub prefix: Utf8PathBuf,
    /// Package download URL.
    pub package_url: String,
    /// Primary key of the full-installation partition.
    pub cache_key: String,
    /// Whether that key was restored exactly.
    pub cache_hit: bool,
    /// Configuration file locations.
    pub config_paths: ConfigPaths,
    /// The `variants.conf` line.
    pub variants_line: String,
    /// The configured sources.
    pub sources: SourceSummary,
}

impl ActionOutputs {
    /// Output names paired with their values, in publication order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("version", self.version.clone()),
            ("prefix", self.prefix.to_string()),
            ("package-url", self.package_url.clone()),
            ("cache-key", self.cache_key.clone()),
            ("cache-hit", self.cache_hit.to_string()),
            ("uses-git-sources", self.sources.uses_git.to_string()),
            ("variants-conf-path", self.config_paths.variants.to_string()),
            ("sources-conf-path", self.config_paths.sources.to_string()),
            ("ports-conf-path", self.config_paths.ports.to_string()),
            ("macports-conf-path", self.config_paths.macports.to_string()),
            ("configured-variants", self.variants_line.clone()),
            ("configured-sources", self.sources.entries.join("\n")),
            (
                "git-source-path",
                self.sources
                    .git_source_path
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ),
            ("rsync-source-urls", self.sources.rsync_urls.join("\n")),
        ]
    }

    /// Publish every output.
    ///
    /// # Errors
    ///
    /// Fails when an output cannot be written.
    pub fn publish(&self, runtime: &ActionsRuntime) -> Result<()> {
        for (name, value) in self.pairs() {
            runtime.set_output(name, &value)?;
        }
        Ok(())
    }
}

/// What the post phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The main phase left no state behind.
    NoState,
    /// Caching was not requested.
    CacheDisabled,
    /// The main phase restored the exact key; nothing new to save.
    AlreadyCached,
    /// No cache backend is configured on this runner.
    NoStore,
    /// A save was attempted under `key`.
    SaveAttempted {
        /// The key saved under.
        key: String,
    },
}

/// Run the main phase.
///
/// # Errors
///
/// Fails on invalid settings, unsupported hosts, installation or source
/// failures, port install failures, and output write failures. Cache
/// failures are logged and never fail the run.
pub fn run_main(
    mut settings: Settings,
    services: &Services<'_>,
    env: &RunEnvironment,
    runtime: &ActionsRuntime,
) -> Result<ActionOutputs> {
    settings.validate()?;
    let resolution = VersionResolver::new(services.releases)
        .with_retry_unit(env.retry_unit)
        .resolve(&settings.version);
    settings.apply_resolution(&resolution);
    info!("Using MacPorts {}", resolution.version);

    let platform = services.platform.detect()?;
    info!(
        "Detected macOS {} ({}) on {}",
        platform.version_number,
        platform.version,
        platform.architecture.as_str()
    );
    let keys = CacheKeys::derive(&settings, &platform, &env.context);
    let package_url = build_package_url(&settings, &platform)?;
    let store = services.cache.filter(|_| settings.cache);
    let prefix = settings.prefix().to_owned();

    let cache_hit = match store {
        Some(store) => restore_installation(services.executor, store, &settings, &keys, env)?,
        None => false,
    };
    let (variants_line, sources) = if cache_hit {
        info!("Restored the full installation; skipping install and sync");
        (settings.variants.to_conf_line(), restored_sources(&settings))
    } else {
        provision(&settings, services, store, &keys, env, &package_url)?
    };

    group("Installing ports", || install_ports(services.executor, &settings))?;
    if store.is_some() && !cache_hit {
        claim_prefix(services.executor, &prefix, env.user.as_deref())?;
    }

    let outputs = ActionOutputs {
        version: settings.effective_version().to_owned(),
        prefix: prefix.clone(),
        package_url,
        cache_key: keys.installation.cache_key.clone(),
        cache_hit,
        config_paths: ConfigPaths::for_prefix(&prefix),
        variants_line,
        sources,
    };
    outputs.publish(runtime)?;
    if settings.prepend_path {
        runtime.add_path(&prefix.join("sbin"))?;
        runtime.add_path(&prefix.join("bin"))?;
    }

    let state = PhaseState {
        is_post: true,
        prefix,
        cache_key: keys.installation.cache_key,
        resolved_version: Some(settings.effective_version().to_owned()),
        cache_hit,
        cache_enabled: settings.cache,
    };
    state.save(&env.state_file)?;
    state.mirror(runtime)?;
    Ok(outputs)
}

/// Run the post phase.
///
/// # Errors
///
/// Fails only when the state file exists but cannot be read.
pub fn run_post(state_file: &Utf8Path, cache: Option<&dyn CacheStore>) -> Result<PostOutcome> {
    let Some(state) = PhaseState::load(state_file)? else {
        info!("No state from the main phase at {state_file}; nothing to save");
        return Ok(PostOutcome::NoState);
    };
    if !state.cache_enabled {
        info!("Caching disabled; skipping cache save");
        return Ok(PostOutcome::CacheDisabled);
    }
    if state.cache_hit {
        info!("Cache hit on {}; not saving", state.cache_key);
        return Ok(PostOutcome::AlreadyCached);
    }
    let Some(store) = cache else {
        warn!("no cache directory is configured; skipping cache save");
        return Ok(PostOutcome::NoStore);
    };

    save_best_effort(store, &[state.prefix], &state.cache_key);
    Ok(PostOutcome::SaveAttempted {
        key: state.cache_key,
    })
}

fn restore_installation(
    executor: &dyn CommandExecutor,
    store: &dyn CacheStore,
    settings: &Settings,
    keys: &CacheKeys,
    env: &RunEnvironment,
) -> Result<bool> {
    let prefix = settings.prefix();
    prepare_prefix(executor, prefix, env.user.as_deref())?;
    let primary = &keys.installation.cache_key;
    let matched = restore_best_effort(
        store,
        &[prefix.to_owned()],
        primary,
        &keys.installation.restore_keys,
    );
    Ok(matched.as_deref() == Some(primary.as_str()))
}

fn provision(
    settings: &Settings,
    services: &Services<'_>,
    store: Option<&dyn CacheStore>,
    keys: &CacheKeys,
    env: &RunEnvironment,
    package_url: &str,
) -> Result<(String, SourceSummary)> {
    let prefix = settings.prefix();
    let prefix_paths = [prefix.to_owned()];
    let setup_hit = store
        .and_then(|store| restore_best_effort(store, &prefix_paths, &keys.setup, &[]))
        .is_some();

    if setup_hit {
        info!("Restored MacPorts base; skipping package install");
    } else {
        let installer = PackageInstaller::new(
            services.executor,
            services.downloader,
            env.work_dir.clone(),
        );
        group("Installing MacPorts", || {
            installer.install(package_url, settings.signature_check, prefix)
        })?;
        if let Some(store) = store {
            claim_prefix(services.executor, prefix, env.user.as_deref())?;
            save_best_effort(store, &prefix_paths, &keys.setup);
        }
    }

    let selection = acquire_sources(settings, services, store, keys, env)?;
    group("Syncing sources", || {
        sync_sources(services.executor, prefix, &selection)
    })?;
    let written = ConfigWriter::new(services.executor, prefix).write_all(
        &settings.variants,
        &selection.conf_entries(),
        &settings.ports,
    )?;
    Ok((written.variants_line, selection.summary()))
}

fn acquire_sources(
    settings: &Settings,
    services: &Services<'_>,
    store: Option<&dyn CacheStore>,
    keys: &CacheKeys,
    env: &RunEnvironment,
) -> Result<SourceSelection> {
    let tree = [settings.prefix().join(PORTS_TREE_DIR)];
    let wants_git = matches!(
        settings.sources_provider,
        SourcesProvider::Git | SourcesProvider::Auto
    );
    let tree_hit = wants_git
        && store
            .and_then(|store| restore_best_effort(store, &tree, &keys.ports, &[]))
            .is_some();

    let selection = group("Fetching sources", || {
        SourceProviderResolver::new(services.fetcher).resolve(settings)
    })?;

    if let (Some(store), SourceSelection::Git { .. }) = (store, &selection)
        && !tree_hit
    {
        claim_prefix(services.executor, settings.prefix(), env.user.as_deref())?;
        save_best_effort(store, &tree, &keys.ports);
    }
    Ok(selection)
}

/// Summarise the `sources.conf` a cache restore brought back.
fn restored_sources(settings: &Settings) -> SourceSummary {
    let path = ConfigPaths::for_prefix(settings.prefix()).sources;
    let body = match std::fs::read_to_string(&path) {
        Ok(body) => body,
        Err(err) => {
            warn!("could not read restored {path}: {err}");
            return SourceSummary::default();
        }
    };
    let entries = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect();
    let git_dir = parse_repository(&settings.git_repository)
        .ok()
        .map(|url| git_source_dir(settings.prefix(), &url));
    SourceSummary::from_entries(entries, git_dir.as_deref())
}

/// Create the prefix and hand it to `user` so a restore can write into it.
fn prepare_prefix(
    executor: &dyn CommandExecutor,
    prefix: &Utf8Path,
    user: Option<&str>,
) -> Result<()> {
    run_checked(
        &Privileged::new(executor),
        "mkdir",
        &["-p", prefix.as_str()],
        &ExecOptions::quiet(),
    )?;
    if let Some(user) = user {
        run_checked(
            &Privileged::new(executor),
            "chown",
            &[user, prefix.as_str()],
            &ExecOptions::quiet(),
        )?;
    }
    Ok(())
}

/// Give `user` the whole prefix so it can be archived without root.
fn claim_prefix(
    executor: &dyn CommandExecutor,
    prefix: &Utf8Path,
    user: Option<&str>,
) -> Result<()> {
    let Some(user) = user else {
        return Ok(());
    };
    run_checked(
        &Privileged::new(executor),
        "chown",
        &["-R", user, prefix.as_str()],
        &ExecOptions::quiet(),
    )?;
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
