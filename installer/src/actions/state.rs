//! State handed from the main phase to the post phase.
//!
//! The main phase writes a JSON file under `RUNNER_TEMP` and mirrors the
//! same keys to `GITHUB_STATE`. The post phase only needs the JSON file.

use super::runtime::ActionsRuntime;
use crate::error::{Result, SetupError};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::{Deserialize, Serialize};

/// Variable naming the runner's scratch directory.
pub const RUNNER_TEMP_ENV: &str = "RUNNER_TEMP";

const STATE_DIR: &str = "setup-macports";
const STATE_FILE: &str = "state.json";

/// Values recorded by the main phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Set once the main phase has run; the next invocation is the post
    /// phase.
    pub is_post: bool,
    /// Installation prefix.
    pub prefix: Utf8PathBuf,
    /// Primary key of the full-installation partition.
    pub cache_key: String,
    /// MacPorts version that was installed.
    pub resolved_version: Option<String>,
    /// Whether the full-installation partition was restored exactly.
    pub cache_hit: bool,
    /// Whether caching was requested.
    pub cache_enabled: bool,
}

impl PhaseState {
    /// Marker written before the main phase does anything that can fail.
    ///
    /// A post step that follows a failed main phase then sees `is_post`
    /// with caching off, and exits without installing or saving.
    #[must_use]
    pub fn started() -> Self {
        Self {
            is_post: true,
            ..Self::default()
        }
    }

    /// Read the state file, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::State`] when the file cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(state_error(path, &err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| state_error(path, &err))
    }

    /// Write the state file, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::State`] when the file cannot be written.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| state_error(path, &err))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| state_error(path, &err))?;
        std::fs::write(path, json).map_err(|err| state_error(path, &err))?;
        debug!("wrote phase state to {path}");
        Ok(())
    }

    /// Copy every field into the runner's saved state.
    ///
    /// # Errors
    ///
    /// Fails when the state file named by `GITHUB_STATE` cannot be written.
    pub fn mirror(&self, runtime: &ActionsRuntime) -> Result<()> {
        runtime.save_state("isPost", bool_text(self.is_post))?;
        runtime.save_state("prefix", self.prefix.as_str())?;
        runtime.save_state("cacheKey", &self.cache_key)?;
        runtime.save_state(
            "resolvedVersion",
            self.resolved_version.as_deref().unwrap_or_default(),
        )?;
        runtime.save_state("cacheHit", bool_text(self.cache_hit))?;
        runtime.save_state("cacheEnabled", bool_text(self.cache_enabled))
    }
}

/// Return `{RUNNER_TEMP}/setup-macports/state.json`, falling back to the
/// system temporary directory off a runner.
#[must_use]
pub fn default_path() -> Utf8PathBuf {
    scratch_dir().join(STATE_DIR).join(STATE_FILE)
}

/// Directory for downloads and staging: `RUNNER_TEMP` when set.
#[must_use]
pub fn scratch_dir() -> Utf8PathBuf {
    std::env::var(RUNNER_TEMP_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
        .or_else(|| Utf8PathBuf::from_path_buf(std::env::temp_dir()).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp"))
}

const fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn state_error(path: &Utf8Path, err: &dyn std::fmt::Display) -> SetupError {
    SetupError::State {
        path: path.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::with_action_env;

    fn sample() -> PhaseState {
        PhaseState {
            is_post: true,
            prefix: Utf8PathBuf::from("/opt/local"),
            cache_key: "macports-2.11.5-arm64-15-abc".to_owned(),
            resolved_version: Some("2.11.5".to_owned()),
            cache_hit: false,
            cache_enabled: true,
        }
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        (dir, path)
    }

    #[test]
    fn saved_state_loads_back() {
        let (_guard, dir) = scratch();
        let path = dir.join("nested/state.json");
        sample().save(&path).expect("save");
        assert_eq!(PhaseState::load(&path).expect("load"), Some(sample()));
    }

    #[test]
    fn started_marker_leads_to_a_post_phase_without_caching() {
        let (_guard, dir) = scratch();
        let path = dir.join("state.json");
        PhaseState::started().save(&path).expect("save");

        let loaded = PhaseState::load(&path).expect("load").expect("present");
        assert!(loaded.is_post);
        assert!(!loaded.cache_enabled);
        assert!(loaded.resolved_version.is_none());
    }

    #[test]
    fn absent_state_is_none() {
        let (_guard, dir) = scratch();
        assert_eq!(PhaseState::load(&dir.join("state.json")).expect("load"), None);
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let (_guard, dir) = scratch();
        let path = dir.join("state.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = PhaseState::load(&path).expect_err("corrupt");
        assert!(matches!(err, SetupError::State { .. }));
    }

    #[test]
    fn default_path_lives_under_runner_temp() {
        temp_env::with_var(RUNNER_TEMP_ENV, Some("/runner/_temp"), || {
            assert_eq!(default_path().as_str(), "/runner/_temp/setup-macports/state.json");
        });
    }

    #[test]
    fn mirrored_keys_reach_the_state_file() {
        let (_guard, dir) = scratch();
        with_action_env(&dir, || {
            sample().mirror(&ActionsRuntime::from_env()).expect("mirror");
        });
        let written = std::fs::read_to_string(dir.join("github_state")).expect("read");
        for key in ["isPost<<", "prefix<<", "cacheKey<<", "cacheHit<<", "cacheEnabled<<"] {
            assert!(written.contains(key), "missing {key}");
        }
        assert!(written.contains("\nmacports-2.11.5-arm64-15-abc\n"));
    }
}
