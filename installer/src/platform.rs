//! Host platform detection.

use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, capture_stdout};
use log::info;
use setup_macports_common::platform::{Architecture, PlatformInfo};

/// Kernel name reported by macOS.
const DARWIN: &str = "Darwin";

/// Produces the [`PlatformInfo`] for the current host.
pub trait PlatformDetector {
    /// Describe the host.
    ///
    /// # Errors
    ///
    /// Fails on non-macOS hosts, unsupported releases or architectures, and
    /// when the probing commands cannot be run.
    fn detect(&self) -> Result<PlatformInfo>;
}

/// Detects the platform by running `uname` and `sw_vers`.
pub struct HostPlatform<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> HostPlatform<'a> {
    /// Create a detector that probes through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }
}

impl PlatformDetector for HostPlatform<'_> {
    fn detect(&self) -> Result<PlatformInfo> {
        let os = capture_stdout(self.executor, "uname", &["-s"])?;
        if os != DARWIN {
            return Err(SetupError::UnsupportedHost { os });
        }

        let version_number = capture_stdout(self.executor, "sw_vers", &["-productVersion"])?;
        let architecture: Architecture = capture_stdout(self.executor, "uname", &["-m"])?.parse()?;
        let platform = PlatformInfo::from_version_number(&version_number, architecture)?;

        info!(
            "Detected macOS {} ({}) on {}",
            platform.version, platform.version_number, platform.architecture
        );
        Ok(platform)
    }
}
