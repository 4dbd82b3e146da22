//! Git checkout of the ports tree.
//!
//! Branches and tags are shallow-cloned. A full commit id cannot be passed
//! to `clone --branch`, so it is fetched into an empty repository instead.
//! An existing checkout, for example one restored from the cache, is moved
//! to the requested ref with a shallow fetch. A checkout that fails part way
//! is removed so the next run starts clean.
//! Every git call has a timeout to prevent hangs on network issues.

use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, ExecOptions, Privileged, failure_text, run_checked};
use crate::sources::SourceFetcher;
use camino::{Utf8Path, Utf8PathBuf};
use log::{Level, info, warn};
use std::time::Duration;

/// Default timeout for each git operation (15 minutes).
const GIT_TIMEOUT: Duration = Duration::from_secs(900);

/// Length of a full SHA-1 commit id.
const COMMIT_ID_LEN: usize = 40;

/// Fetches the ports tree with git and indexes it with `portindex`.
pub struct GitFetcher<'a> {
    executor: &'a dyn CommandExecutor,
    prefix: Utf8PathBuf,
}

impl<'a> GitFetcher<'a> {
    /// Create a fetcher for the MacPorts installation at `prefix`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, prefix: impl Into<Utf8PathBuf>) -> Self {
        Self {
            executor,
            prefix: prefix.into(),
        }
    }

    fn git(&self, operation: &'static str, args: &[&str]) -> Result<()> {
        let options = ExecOptions::default()
            .stderr_at(Level::Debug)
            .with_timeout(GIT_TIMEOUT);
        let output = Privileged::new(self.executor)
            .run("git", args, &options)
            .map_err(|err| SetupError::Git {
                operation,
                message: err.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SetupError::Git {
                operation,
                message: failure_text(&output),
            })
        }
    }

    fn clone_branch(&self, url: &str, git_ref: &str, dest: &Utf8Path) -> Result<()> {
        self.git(
            "clone",
            &["clone", "--depth", "1", "--branch", git_ref, url, dest.as_str()],
        )
    }

    fn fetch_commit(&self, url: &str, commit: &str, dest: &Utf8Path) -> Result<()> {
        let dir = dest.as_str();
        self.git("init", &["init", dir])?;
        self.git("remote", &["-C", dir, "remote", "add", "origin", url])?;
        self.git("fetch", &["-C", dir, "fetch", "--depth", "1", "origin", commit])?;
        self.git("checkout", &["-C", dir, "checkout", "FETCH_HEAD"])
    }

    /// Move an existing checkout to `git_ref`, whatever it was made from.
    fn update(&self, url: &str, git_ref: &str, dest: &Utf8Path) -> Result<()> {
        let dir = dest.as_str();
        self.git("fetch", &["-C", dir, "fetch", "--depth", "1", url, git_ref])?;
        self.git("checkout", &["-C", dir, "checkout", "FETCH_HEAD"])
    }

    fn checkout_fresh(&self, url: &str, git_ref: &str, dest: &Utf8Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            run_checked(
                &Privileged::new(self.executor),
                "mkdir",
                &["-p", parent.as_str()],
                &ExecOptions::quiet(),
            )?;
        }
        if is_commit_id(git_ref) {
            self.fetch_commit(url, git_ref, dest)
        } else {
            self.clone_branch(url, git_ref, dest)
        }
    }

    fn remove(&self, dest: &Utf8Path) -> Result<()> {
        run_checked(
            &Privileged::new(self.executor),
            "rm",
            &["-rf", dest.as_str()],
            &ExecOptions::quiet(),
        )?;
        Ok(())
    }

    fn index(&self, dest: &Utf8Path) -> Result<()> {
        let portindex = self.prefix.join("bin/portindex");
        run_checked(
            &Privileged::new(self.executor),
            portindex.as_str(),
            &[],
            &ExecOptions::default().in_dir(dest).stderr_at(Level::Debug),
        )?;
        Ok(())
    }
}

impl SourceFetcher for GitFetcher<'_> {
    fn fetch(&self, url: &str, git_ref: &str, dest: &Utf8Path) -> Result<()> {
        if dest.join(".git").is_dir() {
            info!("Updating existing ports checkout at {dest} to {git_ref}");
            match self.update(url, git_ref, dest) {
                Ok(()) => return self.index(dest),
                Err(err) => {
                    warn!("could not update {dest}, checking out afresh: {err}");
                    self.remove(dest)?;
                }
            }
        }
        if let Err(err) = self.checkout_fresh(url, git_ref, dest) {
            if let Err(cleanup) = self.remove(dest) {
                warn!("could not remove partial checkout {dest}: {cleanup}");
            }
            return Err(err);
        }
        self.index(dest)
    }
}

/// Return `true` when `git_ref` is a full hexadecimal commit id.
fn is_commit_id(git_ref: &str) -> bool {
    git_ref.len() == COMMIT_ID_LEN && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output};
    use rstest::rstest;

    const URL: &str = "https://github.com/macports/macports-ports.git";
    const DEST: &str = "/nonexistent/var/macports/sources/github.com/macports/macports-ports";
    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn mkdir() -> ExpectedCall {
        ExpectedCall::ok(
            "sudo",
            &["-n", "mkdir", "-p", "/nonexistent/var/macports/sources/github.com/macports"],
        )
    }

    fn remove_dest(dest: &str) -> ExpectedCall {
        ExpectedCall::ok("sudo", &["-n", "rm", "-rf", dest])
    }

    fn portindex() -> ExpectedCall {
        ExpectedCall::ok("sudo", &["-n", "/nonexistent/bin/portindex"])
    }

    #[rstest]
    #[case(SHA, true)]
    #[case("master", false)]
    #[case("0123456789abcdef", false)]
    #[case("release-2.11", false)]
    fn detects_commit_ids(#[case] git_ref: &str, #[case] expected: bool) {
        assert_eq!(is_commit_id(git_ref), expected);
    }

    #[test]
    fn branches_are_shallow_cloned_then_indexed() {
        let stub = StubExecutor::new(vec![
            mkdir(),
            ExpectedCall::ok(
                "sudo",
                &["-n", "git", "clone", "--depth", "1", "--branch", "master", URL, DEST],
            ),
            portindex(),
        ]);

        GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, "master", Utf8Path::new(DEST))
            .expect("clone");
        stub.assert_finished();

        let options = stub.recorded_options();
        assert_eq!(options[1].timeout, Some(GIT_TIMEOUT));
        assert_eq!(options[2].working_dir.as_deref(), Some(Utf8Path::new(DEST)));
    }

    #[test]
    fn commits_are_fetched_into_a_fresh_repository() {
        let stub = StubExecutor::new(vec![
            mkdir(),
            ExpectedCall::ok("sudo", &["-n", "git", "init", DEST]),
            ExpectedCall::ok("sudo", &["-n", "git", "-C", DEST, "remote", "add", "origin", URL]),
            ExpectedCall::ok(
                "sudo",
                &["-n", "git", "-C", DEST, "fetch", "--depth", "1", "origin", SHA],
            ),
            ExpectedCall::ok("sudo", &["-n", "git", "-C", DEST, "checkout", "FETCH_HEAD"]),
            portindex(),
        ]);

        GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, SHA, Utf8Path::new(DEST))
            .expect("fetch commit");
        stub.assert_finished();
    }

    #[test]
    fn clone_failure_names_the_operation() {
        let stub = StubExecutor::new(vec![
            mkdir(),
            ExpectedCall::new(
                "sudo",
                &["-n", "git", "clone", "--depth", "1", "--branch", "nope", URL, DEST],
                Ok(failure_output("fatal: Remote branch nope not found")),
            ),
            remove_dest(DEST),
        ]);

        let err = GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, "nope", Utf8Path::new(DEST))
            .expect_err("missing branch");
        assert!(matches!(
            err,
            SetupError::Git { operation: "clone", ref message } if message.contains("nope")
        ));
        stub.assert_finished();
    }

    #[test]
    fn failed_commit_fetch_leaves_no_repository_behind() {
        let stub = StubExecutor::new(vec![
            mkdir(),
            ExpectedCall::ok("sudo", &["-n", "git", "init", DEST]),
            ExpectedCall::ok("sudo", &["-n", "git", "-C", DEST, "remote", "add", "origin", URL]),
            ExpectedCall::new(
                "sudo",
                &["-n", "git", "-C", DEST, "fetch", "--depth", "1", "origin", SHA],
                Ok(failure_output("fatal: remote error: upload-pack: not our ref")),
            ),
            remove_dest(DEST),
        ]);

        let err = GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, SHA, Utf8Path::new(DEST))
            .expect_err("unknown commit");
        assert!(matches!(err, SetupError::Git { operation: "fetch", .. }));
        stub.assert_finished();
    }

    fn existing_checkout() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = Utf8PathBuf::from_path_buf(dir.path().join("macports-ports")).expect("utf8");
        std::fs::create_dir_all(dest.join(".git")).expect("create .git");
        (dir, dest)
    }

    #[test]
    fn existing_checkouts_move_to_the_requested_ref() {
        let (_guard, dest) = existing_checkout();
        let dir = dest.as_str();
        let stub = StubExecutor::new(vec![
            ExpectedCall::ok(
                "sudo",
                &["-n", "git", "-C", dir, "fetch", "--depth", "1", URL, "release-2.10"],
            ),
            ExpectedCall::ok("sudo", &["-n", "git", "-C", dir, "checkout", "FETCH_HEAD"]),
            portindex(),
        ]);

        GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, "release-2.10", &dest)
            .expect("update");
        stub.assert_finished();
    }

    #[test]
    fn unusable_checkouts_are_replaced() {
        let (_guard, dest) = existing_checkout();
        let dir = dest.as_str();
        let parent = dest.parent().expect("parent").as_str().to_owned();
        let stub = StubExecutor::new(vec![
            ExpectedCall::new(
                "sudo",
                &["-n", "git", "-C", dir, "fetch", "--depth", "1", URL, "master"],
                Ok(failure_output("fatal: not a git repository")),
            ),
            remove_dest(dir),
            ExpectedCall::ok("sudo", &["-n", "mkdir", "-p", &parent]),
            ExpectedCall::ok(
                "sudo",
                &["-n", "git", "clone", "--depth", "1", "--branch", "master", URL, dir],
            ),
            portindex(),
        ]);

        GitFetcher::new(&stub, "/nonexistent")
            .fetch(URL, "master", &dest)
            .expect("replace");
        stub.assert_finished();
    }
}
