//! Cache store backed by a local directory.
//!
//! Self-hosted and persistent runners keep `RUNNER_TOOL_CACHE` between
//! jobs, which makes it a usable store without a cache service. Each key
//! maps to one `{key}.tar.zst` archive. Saves are serialised per key with
//! an advisory lock on `{key}.lock`.

use super::archive::{create_archive, extract_archive};
use super::{CacheStore, SaveOutcome};
use crate::error::{Result, SetupError};
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, info};
use std::fs::OpenOptions;
use std::time::SystemTime;

/// Environment variable naming the cache directory explicitly.
pub const CACHE_DIR_ENV: &str = "SETUP_MACPORTS_CACHE_DIR";

/// Runner tool cache, used when [`CACHE_DIR_ENV`] is unset.
pub const TOOL_CACHE_ENV: &str = "RUNNER_TOOL_CACHE";

/// Subdirectory of the tool cache holding the archives.
const TOOL_CACHE_SUBDIR: &str = "setup-macports";

const ARCHIVE_SUFFIX: &str = ".tar.zst";

/// Directory of `.tar.zst` archives keyed by cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryCacheStore {
    root: Utf8PathBuf,
    extract_root: Utf8PathBuf,
}

impl DirectoryCacheStore {
    /// Create a store in `root` whose archives unpack beneath
    /// `extract_root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, extract_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            extract_root: extract_root.into(),
        }
    }

    /// Locate the store from the environment.
    ///
    /// Returns `None` when neither [`CACHE_DIR_ENV`] nor
    /// [`TOOL_CACHE_ENV`] is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let root = env_path(CACHE_DIR_ENV)
            .or_else(|| env_path(TOOL_CACHE_ENV).map(|dir| dir.join(TOOL_CACHE_SUBDIR)))?;
        Some(Self::new(root, "/"))
    }

    /// Directory holding the archives.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn archive_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(format!("{}{ARCHIVE_SUFFIX}", sanitize_key(key)))
    }

    fn find(
        &self,
        primary_key: &str,
        restore_keys: &[String],
    ) -> std::io::Result<Option<(String, Utf8PathBuf)>> {
        let exact = self.archive_path(primary_key);
        if exact.is_file() {
            return Ok(Some((primary_key.to_owned(), exact)));
        }
        if !self.root.is_dir() {
            return Ok(None);
        }
        for prefix in restore_keys {
            if let Some(found) = self.newest_with_prefix(&sanitize_key(prefix))? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn newest_with_prefix(
        &self,
        prefix: &str,
    ) -> std::io::Result<Option<(String, Utf8PathBuf)>> {
        let mut newest: Option<(SystemTime, String, Utf8PathBuf)> = None;
        for entry in self.root.read_dir_utf8()? {
            let entry = entry?;
            let Some(key) = entry.file_name().strip_suffix(ARCHIVE_SUFFIX) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().is_none_or(|(best, _, _)| modified > *best) {
                newest = Some((modified, key.to_owned(), entry.path().to_owned()));
            }
        }
        Ok(newest.map(|(_, key, path)| (key, path)))
    }
}

impl CacheStore for DirectoryCacheStore {
    fn restore(
        &self,
        paths: &[Utf8PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>> {
        let found = self
            .find(primary_key, restore_keys)
            .map_err(|err| cache_error("restore", primary_key, &err))?;
        let Some((key, archive)) = found else {
            return Ok(None);
        };

        debug!("extracting {archive}");
        let entries = extract_archive(&archive, &self.extract_root, paths)
            .map_err(|err| cache_error("restore", &key, &err))?;
        debug!("restored {entries} entries from {archive}");
        Ok(Some(key))
    }

    fn save(&self, paths: &[Utf8PathBuf], key: &str) -> Result<SaveOutcome> {
        std::fs::create_dir_all(&self.root)?;
        let archive = self.archive_path(key);
        let lock_path = self.root.join(format!("{}.lock", sanitize_key(key)));

        // The lock file is never unlinked; removing a held lock file would
        // let a second writer lock a fresh inode at the same path.
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        if FileExt::try_lock_exclusive(&lock).is_err() {
            debug!("{lock_path} is held by another writer");
            return Ok(SaveOutcome::Reserved);
        }
        if archive.exists() {
            info!("Cache entry {key} already exists");
            return Ok(SaveOutcome::Reserved);
        }

        let partial = Utf8PathBuf::from(format!("{archive}.partial"));
        if let Err(err) = create_archive(&partial, &self.extract_root, paths) {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                debug!("could not remove {partial}: {cleanup}");
            }
            return Err(cache_error("save", key, &err));
        }
        std::fs::rename(&partial, &archive)?;
        Ok(SaveOutcome::Saved)
    }
}

/// Map a key onto a file-name-safe stem.
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn env_path(name: &str) -> Option<Utf8PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
}

fn cache_error(operation: &'static str, key: &str, err: &dyn std::fmt::Display) -> SetupError {
    SetupError::Cache {
        operation,
        key: key.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        store: DirectoryCacheStore,
        prefix: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let cache = tempfile::tempdir().expect("cache dir");
        let runner = tempfile::tempdir().expect("runner dir");
        let cache_root = Utf8PathBuf::from_path_buf(cache.path().to_path_buf()).expect("utf8");
        let extract_root = Utf8PathBuf::from_path_buf(runner.path().to_path_buf()).expect("utf8");
        let prefix = extract_root.join("opt/local");
        std::fs::create_dir_all(prefix.join("bin")).expect("mkdir prefix");
        Fixture {
            store: DirectoryCacheStore::new(cache_root, extract_root),
            prefix,
            _dirs: (cache, runner),
        }
    }

    fn write_port(prefix: &Utf8Path, body: &str) {
        std::fs::write(prefix.join("bin/port"), body).expect("write port");
    }

    #[test]
    fn saves_then_restores_the_exact_key() {
        let fx = fixture();
        let paths = vec![fx.prefix.clone()];
        write_port(&fx.prefix, "v1");

        assert_eq!(fx.store.save(&paths, "macports-a-1").expect("save"), SaveOutcome::Saved);
        std::fs::remove_dir_all(&fx.prefix).expect("wipe");

        let matched = fx.store.restore(&paths, "macports-a-1", &[]).expect("restore");
        assert_eq!(matched.as_deref(), Some("macports-a-1"));
        assert_eq!(
            std::fs::read_to_string(fx.prefix.join("bin/port")).expect("read"),
            "v1"
        );
    }

    #[test]
    fn misses_return_none() {
        let fx = fixture();
        let matched = fx
            .store
            .restore(&[fx.prefix.clone()], "macports-none", &["macports-".to_owned()])
            .expect("restore");
        assert_eq!(matched, None);
    }

    #[test]
    fn restore_keys_pick_the_newest_prefix_match() {
        let fx = fixture();
        let paths = vec![fx.prefix.clone()];
        write_port(&fx.prefix, "old");
        fx.store.save(&paths, "macports-2.11.5-arm64-15-aaa").expect("save old");
        write_port(&fx.prefix, "new");
        fx.store.save(&paths, "macports-2.11.5-arm64-15-bbb").expect("save new");

        let old = fx.store.archive_path("macports-2.11.5-arm64-15-aaa");
        let stale = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .expect("open old")
            .set_modified(stale)
            .expect("age old archive");

        let matched = fx
            .store
            .restore(
                &paths,
                "macports-2.11.5-arm64-15-ccc",
                &["macports-2.11.5-arm64-15-".to_owned(), "macports-".to_owned()],
            )
            .expect("restore");
        assert_eq!(matched.as_deref(), Some("macports-2.11.5-arm64-15-bbb"));
        assert_eq!(
            std::fs::read_to_string(fx.prefix.join("bin/port")).expect("read"),
            "new"
        );
    }

    #[test]
    fn existing_archives_are_reserved() {
        let fx = fixture();
        let paths = vec![fx.prefix.clone()];
        write_port(&fx.prefix, "v1");
        fx.store.save(&paths, "k").expect("first save");
        assert_eq!(fx.store.save(&paths, "k").expect("second save"), SaveOutcome::Reserved);
    }

    #[test]
    fn held_locks_are_reserved() {
        let fx = fixture();
        std::fs::create_dir_all(fx.store.root()).expect("mkdir cache");
        let lock = std::fs::File::create(fx.store.root().join("k.lock")).expect("lock file");
        FileExt::lock_exclusive(&lock).expect("hold lock");

        let outcome = fx.store.save(&[fx.prefix.clone()], "k").expect("save");
        assert_eq!(outcome, SaveOutcome::Reserved);
        assert!(!fx.store.archive_path("k").exists());
    }

    #[test]
    fn saving_nothing_fails_without_leaving_partials() {
        let fx = fixture();
        let missing = fx.prefix.join("absent");
        let err = fx.store.save(&[missing], "k").expect_err("nothing to save");
        assert!(matches!(err, SetupError::Cache { operation: "save", .. }));
        assert!(!Utf8PathBuf::from(format!("{}.partial", fx.store.archive_path("k"))).exists());
    }

    #[test]
    fn keys_are_sanitised_for_file_names() {
        assert_eq!(sanitize_key("macports-2.11.5-arm64"), "macports-2.11.5-arm64");
        assert_eq!(sanitize_key("a/b c"), "a_b_c");
    }

    #[test]
    fn from_env_prefers_the_explicit_directory() {
        temp_env::with_vars(
            [
                (CACHE_DIR_ENV, Some("/cache/explicit")),
                (TOOL_CACHE_ENV, Some("/hostedtoolcache")),
            ],
            || {
                let store = DirectoryCacheStore::from_env().expect("store");
                assert_eq!(store.root().as_str(), "/cache/explicit");
            },
        );
        temp_env::with_vars(
            [(CACHE_DIR_ENV, None::<&str>), (TOOL_CACHE_ENV, Some("/hostedtoolcache"))],
            || {
                let store = DirectoryCacheStore::from_env().expect("store");
                assert_eq!(store.root().as_str(), "/hostedtoolcache/setup-macports");
            },
        );
        temp_env::with_vars(
            [(CACHE_DIR_ENV, None::<&str>), (TOOL_CACHE_ENV, None)],
            || assert!(DirectoryCacheStore::from_env().is_none()),
        );
    }
}
