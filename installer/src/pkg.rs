//! Download, verification, and installation of the MacPorts package.

use crate::download::PackageDownloader;
use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, ExecOptions, Privileged, failure_text, run_checked};
use camino::{Utf8Path, Utf8PathBuf};
use log::{Level, info, warn};
use setup_macports_common::package_url::package_file_name;
use setup_macports_common::settings::{DEFAULT_PREFIX, SignatureCheck};

/// Result of checking the package signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// `pkgutil` accepted the signature.
    Verified,
    /// Verification is disabled.
    Skipped,
    /// Verification failed but the policy allowed the install to continue.
    Unverified {
        /// Output of the verification tool.
        reason: String,
    },
}

/// Check the signature of `pkg` according to `policy`.
///
/// # Errors
///
/// Returns [`SetupError::SignatureRejected`] when the policy is strict and
/// the signature cannot be verified.
pub fn verify_signature(
    executor: &dyn CommandExecutor,
    pkg: &Utf8Path,
    policy: SignatureCheck,
) -> Result<SignatureOutcome> {
    if policy == SignatureCheck::Disabled {
        info!("Package signature verification disabled");
        return Ok(SignatureOutcome::Skipped);
    }

    let args = ["--check-signature", pkg.as_str()];
    let reason = match executor.run("pkgutil", &args, &ExecOptions::quiet()) {
        Ok(output) if output.status.success() => {
            info!("Verified package signature for {pkg}");
            return Ok(SignatureOutcome::Verified);
        }
        Ok(output) => failure_text(&output),
        Err(err) => err.to_string(),
    };

    match policy {
        SignatureCheck::Strict => Err(SetupError::SignatureRejected {
            path: pkg.to_owned(),
            reason,
        }),
        SignatureCheck::Permissive | SignatureCheck::Disabled => {
            warn!("could not verify the signature of {pkg}; continuing: {reason}");
            Ok(SignatureOutcome::Unverified { reason })
        }
    }
}

/// Install `pkg` onto the root volume.
///
/// # Errors
///
/// Fails when `sudo -n installer` cannot be run or exits unsuccessfully.
pub fn install_package(executor: &dyn CommandExecutor, pkg: &Utf8Path) -> Result<()> {
    run_checked(
        &Privileged::new(executor),
        "installer",
        &["-pkg", pkg.as_str(), "-target", "/"],
        &ExecOptions::default().stderr_at(Level::Info),
    )?;
    Ok(())
}

/// Summary of a completed package installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Where the package was downloaded to.
    pub package_path: Utf8PathBuf,
    /// Signature check result.
    pub signature: SignatureOutcome,
}

/// Downloads and installs the MacPorts base package.
pub struct PackageInstaller<'a> {
    executor: &'a dyn CommandExecutor,
    downloader: &'a dyn PackageDownloader,
    work_dir: Utf8PathBuf,
}

impl<'a> PackageInstaller<'a> {
    /// Create an installer that downloads into `work_dir`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        downloader: &'a dyn PackageDownloader,
        work_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            executor,
            downloader,
            work_dir: work_dir.into(),
        }
    }

    /// Fetch the package at `url`, check it under `policy`, and install it.
    ///
    /// # Errors
    ///
    /// Propagates download failures, strict signature rejections, and
    /// installer failures.
    pub fn install(
        &self,
        url: &str,
        policy: SignatureCheck,
        prefix: &Utf8Path,
    ) -> Result<InstallReport> {
        if is_relocated(prefix) {
            warn!(
                "prefix {prefix} differs from {DEFAULT_PREFIX}; the binary package always installs into {DEFAULT_PREFIX}"
            );
        }

        let package_path = self.work_dir.join(package_file_name(url));
        self.downloader.download(url, &package_path)?;
        let signature = verify_signature(self.executor, &package_path, policy)?;
        install_package(self.executor, &package_path)?;
        info!("Installed MacPorts from {package_path}");

        Ok(InstallReport {
            package_path,
            signature,
        })
    }
}

/// Return `true` when `prefix` differs from the package's built-in
/// location.
#[must_use]
pub fn is_relocated(prefix: &Utf8Path) -> bool {
    prefix != Utf8Path::new(DEFAULT_PREFIX)
}
