//! Host platform description and the macOS release table.
//!
//! Only macOS releases that MacPorts publishes binary packages for are
//! listed. Any other major version is rejected rather than mapped to a
//! best-guess name.

use crate::error::{ConfigError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Known macOS major versions and their release names.
pub const OS_RELEASES: &[(u32, &str)] = &[
    (11, "BigSur"),
    (12, "Monterey"),
    (13, "Ventura"),
    (14, "Sonoma"),
    (15, "Sequoia"),
    (26, "Tahoe"),
];

/// Platform major reported when the version number cannot be parsed.
pub const DEFAULT_PLATFORM_MAJOR: &str = "15";

/// CPU architectures MacPorts supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Architecture {
    /// Apple silicon.
    #[serde(rename = "arm64")]
    Arm64,
    /// Intel.
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Architecture {
    /// Return the `uname -m` spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            other => Err(ConfigError::UnsupportedArchitecture {
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the host, captured once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    /// Release name, e.g. `Sequoia`.
    pub version: String,
    /// Dotted version number, e.g. `15.3.1`.
    pub version_number: String,
    /// CPU architecture.
    pub architecture: Architecture,
}

impl PlatformInfo {
    /// Describe a host from its version number and architecture.
    ///
    /// # Errors
    ///
    /// Fails if the version number has no leading digits or names an
    /// unsupported major release.
    ///
    /// # Examples
    ///
    /// ```
    /// use setup_macports_common::platform::{Architecture, PlatformInfo};
    ///
    /// let platform = PlatformInfo::from_version_number("14.6.1", Architecture::Arm64)?;
    /// assert_eq!(platform.version, "Sonoma");
    /// # Ok::<(), setup_macports_common::error::ConfigError>(())
    /// ```
    pub fn from_version_number(version_number: &str, architecture: Architecture) -> Result<Self> {
        let major = parse_major_version(version_number)?;
        let name = release_name_for(major)?;
        Ok(Self {
            version: name.to_owned(),
            version_number: version_number.trim().to_owned(),
            architecture,
        })
    }

    /// Return the coarse compatibility bucket used in cache keys.
    ///
    /// This is the text before the first `.` when it is an integer, and
    /// [`DEFAULT_PLATFORM_MAJOR`] otherwise.
    #[must_use]
    pub fn platform_major(&self) -> String {
        platform_major(&self.version_number)
    }
}

/// Return the cache-key platform bucket for a version number.
#[must_use]
pub fn platform_major(version_number: &str) -> String {
    version_number
        .split('.')
        .next()
        .and_then(|head| head.trim().parse::<u32>().ok())
        .map_or_else(|| DEFAULT_PLATFORM_MAJOR.to_owned(), |major| major.to_string())
}

/// Parse the leading integer of a version number.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPlatformVersion`] when the value does not
/// start with a digit.
pub fn parse_major_version(version_number: &str) -> Result<u32> {
    let trimmed = version_number.trim();
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidPlatformVersion {
            value: trimmed.to_owned(),
        })
}

/// Look up the release name for a macOS major version.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedPlatform`] naming `major` and the
/// supported set when the version is not in [`OS_RELEASES`].
pub fn release_name_for(major: u32) -> Result<&'static str> {
    OS_RELEASES
        .iter()
        .find(|(known, _)| *known == major)
        .map(|(_, name)| *name)
        .ok_or_else(|| ConfigError::UnsupportedPlatform {
            version: major.to_string(),
            supported: supported_majors(),
        })
}

fn supported_majors() -> String {
    OS_RELEASES
        .iter()
        .map(|(major, _)| major.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
