//! MacPorts configuration files under `{prefix}/etc/macports`.
//!
//! Rendering is pure. Installation stages each file in a private temporary
//! directory and moves it into place with `sudo -n install`, because the
//! prefix belongs to root after the package install.

use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, ExecOptions, Privileged, run_checked};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use setup_macports_common::ports::ports_conf_lines;
use setup_macports_common::settings::{PortSpec, VariantSelection};

/// Directory holding the configuration files, relative to the prefix.
pub const CONF_DIR: &str = "etc/macports";

/// Mode given to every installed configuration file.
const CONF_MODE: &str = "0644";

const VARIANTS_HEADER: &str = "# Global variants written by setup-macports.\n# Each line selects (+name) or deselects (-name) variants for every port.\n";
const SOURCES_HEADER: &str = "# Port sources written by setup-macports.\n# Exactly one source carries the [default] flag.\n";
const PORTS_HEADER: &str = "# Ports requested through setup-macports.\n";

/// Locations of the configuration files for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// `variants.conf`.
    pub variants: Utf8PathBuf,
    /// `sources.conf`.
    pub sources: Utf8PathBuf,
    /// `ports.conf`.
    pub ports: Utf8PathBuf,
    /// `macports.conf`.
    pub macports: Utf8PathBuf,
}

impl ConfigPaths {
    /// Derive the file locations for `prefix`.
    #[must_use]
    pub fn for_prefix(prefix: &Utf8Path) -> Self {
        let dir = prefix.join(CONF_DIR);
        Self {
            variants: dir.join("variants.conf"),
            sources: dir.join("sources.conf"),
            ports: dir.join("ports.conf"),
            macports: dir.join("macports.conf"),
        }
    }
}

/// Render `variants.conf`.
#[must_use]
pub fn render_variants_conf(variants: &VariantSelection) -> String {
    format!("{VARIANTS_HEADER}{}\n", variants.to_conf_line())
}

/// Render `sources.conf` from already validated entries.
#[must_use]
pub fn render_sources_conf(entries: &[String]) -> String {
    render_lines(SOURCES_HEADER, entries)
}

/// Render `ports.conf`.
#[must_use]
pub fn render_ports_conf(ports: &[PortSpec]) -> String {
    render_lines(PORTS_HEADER, &ports_conf_lines(ports))
}

fn render_lines(header: &str, lines: &[String]) -> String {
    let mut out = header.to_owned();
    for line in lines {
        push_line(&mut out, line);
    }
    out
}

/// Set `key value` pairs in a `macports.conf` body.
///
/// An uncommented line whose first word is the key is replaced in place;
/// keys that do not appear are appended. Every other line, comments
/// included, is kept as is.
///
/// # Examples
///
/// ```
/// use setup_macports::config_files::upsert_conf_keys;
///
/// let body = "# comment\nprefix /opt/local\nsources_conf /old/sources.conf\n";
/// let updated = upsert_conf_keys(body, &[("sources_conf", "/opt/local/etc/macports/sources.conf")]);
/// assert_eq!(
///     updated,
///     "# comment\nprefix /opt/local\nsources_conf /opt/local/etc/macports/sources.conf\n",
/// );
/// ```
#[must_use]
pub fn upsert_conf_keys(existing: &str, entries: &[(&str, &str)]) -> String {
    let mut seen = vec![false; entries.len()];
    let mut out = String::with_capacity(existing.len());

    for line in existing.lines() {
        let key = conf_key(line);
        let replacement = entries
            .iter()
            .zip(seen.iter_mut())
            .find(|((name, _), _)| Some(*name) == key);
        match replacement {
            Some(((name, value), done)) => {
                *done = true;
                push_line(&mut out, &format!("{name} {value}"));
            }
            None => push_line(&mut out, line),
        }
    }

    for ((name, value), done) in entries.iter().zip(&seen) {
        if !done {
            push_line(&mut out, &format!("{name} {value}"));
        }
    }
    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn conf_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    trimmed.split_whitespace().next()
}

/// What was written during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenConfig {
    /// Where the files live.
    pub paths: ConfigPaths,
    /// The variants line, empty when no variants were configured.
    pub variants_line: String,
    /// Entries written to `sources.conf`.
    pub sources: Vec<String>,
}

/// Installs configuration files as root.
pub struct ConfigWriter<'a> {
    executor: &'a dyn CommandExecutor,
    paths: ConfigPaths,
}

impl<'a> ConfigWriter<'a> {
    /// Create a writer for the files of `prefix`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, prefix: &Utf8Path) -> Self {
        Self {
            executor,
            paths: ConfigPaths::for_prefix(prefix),
        }
    }

    /// File locations this writer targets.
    #[must_use]
    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Write every configuration file for the run.
    ///
    /// `variants.conf` is only written when variants are configured and
    /// `ports.conf` only when ports are requested.
    ///
    /// # Errors
    ///
    /// Fails when staging or installing any file fails.
    pub fn write_all(
        &self,
        variants: &VariantSelection,
        sources: &[String],
        ports: &[PortSpec],
    ) -> Result<WrittenConfig> {
        let staging = tempfile::tempdir()?;
        let staging_dir = Utf8Path::from_path(staging.path()).ok_or_else(|| SetupError::Output {
            name: "staging directory".to_owned(),
            reason: format!("{} is not valid UTF-8", staging.path().display()),
        })?;

        if !variants.is_empty() {
            self.install(staging_dir, &self.paths.variants, &render_variants_conf(variants))?;
        }
        self.install(staging_dir, &self.paths.sources, &render_sources_conf(sources))?;
        if !ports.is_empty() {
            self.install(staging_dir, &self.paths.ports, &render_ports_conf(ports))?;
        }

        let existing = read_or_empty(&self.paths.macports)?;
        let macports_conf = upsert_conf_keys(
            &existing,
            &[
                ("variants_conf", self.paths.variants.as_str()),
                ("sources_conf", self.paths.sources.as_str()),
            ],
        );
        self.install(staging_dir, &self.paths.macports, &macports_conf)?;

        info!("Updated {}", self.paths.macports);
        Ok(WrittenConfig {
            paths: self.paths.clone(),
            variants_line: variants.to_conf_line(),
            sources: sources.to_vec(),
        })
    }

    fn install(&self, staging_dir: &Utf8Path, target: &Utf8Path, contents: &str) -> Result<()> {
        let staged = staging_dir.join(target.file_name().unwrap_or("macports.conf"));
        std::fs::write(&staged, contents)?;
        debug!("staged {target} at {staged}");
        run_checked(
            &Privileged::new(self.executor),
            "install",
            &["-m", CONF_MODE, staged.as_str(), target.as_str()],
            &ExecOptions::quiet(),
        )?;
        Ok(())
    }
}

fn read_or_empty(path: &Utf8Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(body) => Ok(body),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}
