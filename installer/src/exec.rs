//! External command execution.
//!
//! Every host interaction that shells out goes through [`CommandExecutor`],
//! so tests can replace the real process spawner. [`Privileged`] wraps any
//! executor and prefixes `sudo -n`, which fails instead of prompting when
//! passwordless elevation is unavailable.

use crate::error::{Result, SetupError};
use camino::Utf8PathBuf;
use log::{Level, debug, info, log};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Options controlling how a command is run and reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Log the command line at debug rather than info level.
    pub silent: bool,
    /// Working directory for the child process.
    pub working_dir: Option<Utf8PathBuf>,
    /// Level at which captured stderr lines are logged, if at all.
    pub stderr_level: Option<Level>,
    /// Kill the child and fail if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options for probing commands whose output is only parsed.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Run the command inside `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Log captured stderr at `level`.
    #[must_use]
    pub const fn stderr_at(mut self, level: Level) -> Self {
        self.stderr_level = Some(level);
        self
    }

    /// Fail if the command runs longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// A non-zero exit is reported through the returned [`Output`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning the command, or
    /// [`SetupError::CommandTimedOut`] when the timeout elapses.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use setup_macports::exec::{CommandExecutor, ExecOptions, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("sw_vers", &["-productVersion"], &ExecOptions::quiet())?;
    /// assert!(output.status.success());
    /// # Ok::<(), setup_macports::error::SetupError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str], options: &ExecOptions) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str], options: &ExecOptions) -> Result<Output> {
        announce(cmd, args, options);

        let mut command = Command::new(cmd);
        command.args(args);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir.as_std_path());
        }

        let output = match options.timeout {
            Some(timeout) => run_with_timeout(&mut command, timeout, cmd, args)?,
            None => command.output()?,
        };

        if let Some(level) = options.stderr_level {
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                log!(level, "{line}");
            }
        }
        Ok(output)
    }
}

fn announce(cmd: &str, args: &[&str], options: &ExecOptions) {
    let line = command_line(cmd, args);
    if options.silent {
        debug!("[command]{line}");
    } else {
        info!("[command]{line}");
    }
}

/// Runs a command with a timeout.
///
/// Returns the command output if it completes within the timeout, or an error
/// if the command times out or fails to start.
fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
    cmd: &str,
    args: &[&str],
) -> Result<Output> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn()?;

    match child.wait_timeout(timeout)? {
        Some(status) => {
            let stdout = child
                .stdout
                .take()
                .map(std::io::read_to_string)
                .transpose()?
                .unwrap_or_default();
            let stderr = child
                .stderr
                .take()
                .map(std::io::read_to_string)
                .transpose()?
                .unwrap_or_default();

            Ok(Output {
                status,
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
            })
        }
        None => {
            if let Err(err) = child.kill() {
                debug!("failed to kill timed-out child: {err}");
            }
            if let Err(err) = child.wait() {
                debug!("failed to reap timed-out child: {err}");
            }
            Err(SetupError::CommandTimedOut {
                command: command_line(cmd, args),
                seconds: timeout.as_secs(),
            })
        }
    }
}

/// Runs commands through `sudo -n` on top of another executor.
pub struct Privileged<'a> {
    inner: &'a dyn CommandExecutor,
}

impl<'a> Privileged<'a> {
    /// Wrap `inner` so every command runs elevated.
    #[must_use]
    pub fn new(inner: &'a dyn CommandExecutor) -> Self {
        Self { inner }
    }
}

impl CommandExecutor for Privileged<'_> {
    fn run(&self, cmd: &str, args: &[&str], options: &ExecOptions) -> Result<Output> {
        let mut elevated = Vec::with_capacity(args.len() + 2);
        elevated.push("-n");
        elevated.push(cmd);
        elevated.extend_from_slice(args);
        self.inner.run("sudo", &elevated, options)
    }
}

/// Run a command and fail unless it exits successfully.
///
/// # Errors
///
/// Propagates spawn errors and returns [`SetupError::CommandFailed`] for a
/// non-zero exit.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    cmd: &str,
    args: &[&str],
    options: &ExecOptions,
) -> Result<Output> {
    let output = executor.run(cmd, args, options)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(command_failed(cmd, args, &output))
    }
}

/// Run a command quietly and return its trimmed standard output.
///
/// # Errors
///
/// As [`run_checked`].
pub fn capture_stdout(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> Result<String> {
    let output = run_checked(executor, cmd, args, &ExecOptions::quiet())?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Build a [`SetupError::CommandFailed`] from a finished command.
#[must_use]
pub fn command_failed(cmd: &str, args: &[&str], output: &Output) -> SetupError {
    SetupError::CommandFailed {
        command: command_line(cmd, args),
        status: output.status.to_string(),
        stderr: failure_text(output),
    }
}

/// Return stderr, or stdout when stderr is empty, trimmed.
#[must_use]
pub fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_owned()
}

/// Render a command and its arguments as one line.
#[must_use]
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
