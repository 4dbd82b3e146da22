//! Installation of the requested ports.

use crate::error::{Result, SetupError};
use crate::exec::{CommandExecutor, ExecOptions, Privileged, failure_text};
use log::{Level, info};
use setup_macports_common::ports::port_install_args;
use setup_macports_common::settings::Settings;

/// Install every port in `settings.ports`, in order.
///
/// Stops at the first failure.
///
/// # Errors
///
/// Returns [`SetupError::PortInstall`] naming the port that failed.
pub fn install_ports(executor: &dyn CommandExecutor, settings: &Settings) -> Result<()> {
    let port_bin = settings.prefix().join("bin/port");
    let privileged = Privileged::new(executor);

    for port in &settings.ports {
        let args = port_install_args(port, settings);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("Installing port {}", port.name);

        let output = privileged
            .run(
                port_bin.as_str(),
                &args,
                &ExecOptions::default().stderr_at(Level::Info),
            )
            .map_err(|err| SetupError::PortInstall {
                port: port.name.clone(),
                reason: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(SetupError::PortInstall {
                port: port.name.clone(),
                reason: failure_text(&output),
            });
        }
    }
    Ok(())
}
