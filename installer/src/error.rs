//! Error types for the MacPorts setup action.
//!
//! Validation problems arrive as [`ConfigError`] and are wrapped unchanged.
//! The remaining variants describe host-side failures: external commands,
//! downloads, the cache store, and persisted phase state.

use crate::download::DownloadError;
use camino::Utf8PathBuf;
use setup_macports_common::error::ConfigError;
use thiserror::Error;

/// Errors that can occur while setting up MacPorts.
#[derive(Debug, Error)]
pub enum SetupError {
    /// An input failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command exited unsuccessfully.
    #[error("`{command}` failed with {status}: {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// An external command did not finish in time and was killed.
    #[error("`{command}` timed out after {seconds} seconds")]
    CommandTimedOut {
        /// The command line that was run.
        command: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// A git operation on the ports repository failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git operation that failed (clone, fetch, etc.).
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Downloading the installer package failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A cache archive could not be read or written.
    #[error("cache {operation} failed for {key}: {reason}")]
    Cache {
        /// `restore` or `save`.
        operation: &'static str,
        /// The cache key involved.
        key: String,
        /// Description of the failure.
        reason: String,
    },

    /// Persisted phase state could not be read or written.
    #[error("phase state at {path}: {reason}")]
    State {
        /// The state file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The installer package signature could not be verified.
    #[error("signature verification failed for {path}: {reason}")]
    SignatureRejected {
        /// The package that was checked.
        path: Utf8PathBuf,
        /// Output of the verification tool.
        reason: String,
    },

    /// The action was run on something other than macOS.
    #[error("unsupported host operating system {os:?}; MacPorts setup requires macOS")]
    UnsupportedHost {
        /// The operating system reported by the host.
        os: String,
    },

    /// A requested port failed to install.
    #[error("failed to install port {port}: {reason}")]
    PortInstall {
        /// Name of the port.
        port: String,
        /// Description of the failure.
        reason: String,
    },

    /// An action output value could not be written safely.
    #[error("cannot write output {name}: {reason}")]
    Output {
        /// Name of the output, state entry, or path.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Result type alias using [`SetupError`].
pub type Result<T> = std::result::Result<T, SetupError>;
