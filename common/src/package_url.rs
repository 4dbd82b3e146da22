//! Download URL for the MacPorts installer package.

use crate::error::Result;
use crate::platform::{PlatformInfo, parse_major_version, release_name_for};
use crate::settings::Settings;

const RELEASE_HOST: &str = "github.com";
const RELEASE_ORG: &str = "macports";
const RELEASE_PROJECT: &str = "macports-base";
const PACKAGE_STEM: &str = "MacPorts";

/// Build the installer package URL for the effective version and host.
///
/// The release name comes from the macOS release table, not from
/// `platform.version`, so a descriptor built by hand cannot smuggle in an
/// unsupported name.
///
/// # Errors
///
/// Fails when the platform version number does not start with digits or
/// names an unsupported macOS release; the message contains the version.
///
/// # Examples
///
/// ```
/// use setup_macports_common::package_url::build_package_url;
/// use setup_macports_common::platform::{Architecture, PlatformInfo};
/// use setup_macports_common::settings::Settings;
///
/// let settings = Settings { version: "2.11.5".to_owned(), ..Settings::default() };
/// let platform = PlatformInfo::from_version_number("15.2", Architecture::Arm64)?;
/// assert_eq!(
///     build_package_url(&settings, &platform)?,
///     "https://github.com/macports/macports-base/releases/download/v2.11.5/MacPorts-2.11.5-15-Sequoia.pkg",
/// );
/// # Ok::<(), setup_macports_common::error::ConfigError>(())
/// ```
pub fn build_package_url(settings: &Settings, platform: &PlatformInfo) -> Result<String> {
    let major = parse_major_version(&platform.version_number)?;
    let release_name = release_name_for(major)?;
    let version = settings.effective_version();
    Ok(format!(
        "https://{RELEASE_HOST}/{RELEASE_ORG}/{RELEASE_PROJECT}/releases/download/v{version}/{PACKAGE_STEM}-{version}-{major}-{release_name}.pkg"
    ))
}

/// Return the file name component of a package URL.
#[must_use]
pub fn package_file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
