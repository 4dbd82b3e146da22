//! Shared test utilities for the setup crate.

use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, ExecOptions, command_line};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Argument placeholder that matches any single argument.
pub const ANY_ARG: &str = "*";

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "sudo").
    pub cmd: String,
    /// The expected arguments; [`ANY_ARG`] matches any single argument.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd args` and answer with `result`.
    #[must_use]
    pub fn new(cmd: &str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
        }
    }

    /// Expect `cmd args` and answer with a successful empty output.
    #[must_use]
    pub fn ok(cmd: &str, args: &[&str]) -> Self {
        Self::new(cmd, args, Ok(success_output()))
    }

    fn matches(&self, cmd: &str, args: &[&str]) -> bool {
        self.cmd == cmd
            && self.args.len() == args.len()
            && self
                .args
                .iter()
                .zip(args)
                .all(|(expected, actual)| expected == ANY_ARG || expected == actual)
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    options: RefCell<Vec<ExecOptions>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            options: RefCell::new(Vec::new()),
        }
    }

    /// Returns the options passed to each matched invocation, in order.
    #[must_use]
    pub fn recorded_options(&self) -> Vec<ExecOptions> {
        self.options.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remaining; next: {:?}",
            remaining.len(),
            remaining.front().map(|call| (&call.cmd, &call.args))
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str], options: &ExecOptions) -> Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(SetupError::StubMismatch {
                message: format!("unexpected command `{}`", command_line(cmd, args)),
            });
        };

        if !call.matches(cmd, args) {
            return Err(SetupError::StubMismatch {
                message: format!(
                    "expected `{} {}`, got `{}`",
                    call.cmd,
                    call.args.join(" "),
                    command_line(cmd, args)
                ),
            });
        }

        self.options.borrow_mut().push(options.clone());
        call.result
    }
}

/// Run `f` with the GitHub Actions runtime files pointed into `dir`.
///
/// Sets `GITHUB_OUTPUT`, `GITHUB_PATH`, `GITHUB_STATE` and `RUNNER_TEMP`,
/// creating the three command files empty.
///
/// # Panics
///
/// Panics if the command files cannot be created.
#[cfg(any(test, feature = "test-support"))]
pub fn with_action_env<R>(dir: &camino::Utf8Path, f: impl FnOnce() -> R) -> R {
    let output = dir.join("github_output");
    let path = dir.join("github_path");
    let state = dir.join("github_state");
    for file in [&output, &path, &state] {
        std::fs::write(file, "").unwrap_or_else(|err| panic!("create {file}: {err}"));
    }
    temp_env::with_vars(
        [
            ("GITHUB_OUTPUT", Some(output.as_str())),
            ("GITHUB_PATH", Some(path.as_str())),
            ("GITHUB_STATE", Some(state.as_str())),
            ("RUNNER_TEMP", Some(dir.as_str())),
        ],
        f,
    )
}
