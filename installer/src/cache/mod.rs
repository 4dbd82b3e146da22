//! Key-value cache of installed trees.
//!
//! The orchestrator only sees [`CacheStore`]. Restores and saves are
//! best-effort from its point of view: a failure is logged and the run
//! carries on with a fresh install, and a reservation held by another
//! run counts as success.

pub mod archive;
pub mod directory;

pub use directory::DirectoryCacheStore;

use crate::error::Result;
use camino::Utf8PathBuf;
use log::{info, warn};

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The archive was written.
    Saved,
    /// Another run holds or already wrote this key.
    Reserved,
}

/// Storage for cached directory trees.
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore {
    /// Restore `paths` from the best matching entry.
    ///
    /// `primary_key` is tried first, then each restore key as a prefix in
    /// order. Returns the key that matched, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when a matching archive exists but cannot be read.
    fn restore(
        &self,
        paths: &[Utf8PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>>;

    /// Save `paths` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive cannot be written.
    fn save(&self, paths: &[Utf8PathBuf], key: &str) -> Result<SaveOutcome>;
}

/// Restore, logging instead of failing.
pub fn restore_best_effort(
    store: &dyn CacheStore,
    paths: &[Utf8PathBuf],
    primary_key: &str,
    restore_keys: &[String],
) -> Option<String> {
    match store.restore(paths, primary_key, restore_keys) {
        Ok(Some(matched)) => {
            info!("Cache restored from key: {matched}");
            Some(matched)
        }
        Ok(None) => {
            info!("Cache not found for key: {primary_key}");
            None
        }
        Err(err) => {
            warn!("cache restore failed; continuing without cache: {err}");
            None
        }
    }
}

/// Save, logging instead of failing.
pub fn save_best_effort(store: &dyn CacheStore, paths: &[Utf8PathBuf], key: &str) {
    match store.save(paths, key) {
        Ok(SaveOutcome::Saved) => info!("Cache saved with key: {key}"),
        Ok(SaveOutcome::Reserved) => {
            info!("Cache entry {key} is already being written by another job; skipping save");
        }
        Err(err) => warn!("cache save failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetupError;

    fn paths() -> Vec<Utf8PathBuf> {
        vec![Utf8PathBuf::from("/opt/local")]
    }

    #[test]
    fn restore_errors_become_misses() {
        let mut store = MockCacheStore::new();
        store.expect_restore().times(1).returning(|_, key, _| {
            Err(SetupError::Cache {
                operation: "restore",
                key: key.to_owned(),
                reason: "truncated archive".to_owned(),
            })
        });
        assert_eq!(restore_best_effort(&store, &paths(), "k", &[]), None);
    }

    #[test]
    fn restore_reports_the_matched_key() {
        let mut store = MockCacheStore::new();
        store
            .expect_restore()
            .withf(|_, primary, restore_keys| primary == "k-1" && restore_keys == ["k-"])
            .returning(|_, _, _| Ok(Some("k-0".to_owned())));
        assert_eq!(
            restore_best_effort(&store, &paths(), "k-1", &["k-".to_owned()]).as_deref(),
            Some("k-0")
        );
    }

    #[test]
    fn save_failures_are_swallowed() {
        let mut store = MockCacheStore::new();
        store.expect_save().times(1).returning(|_, key| {
            Err(SetupError::Cache {
                operation: "save",
                key: key.to_owned(),
                reason: "disk full".to_owned(),
            })
        });
        save_best_effort(&store, &paths(), "k");
    }
}
