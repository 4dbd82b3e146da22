//! Argument construction for `port install`.

use crate::settings::{PortSpec, Settings};

/// Build the `port` arguments that install `port`.
///
/// The order is fixed: `-f` (permissive signature mode with the port in the
/// skip list), `-v` (verbose), `install`, the port name, then each variant
/// token.
///
/// # Examples
///
/// ```
/// use setup_macports_common::ports::port_install_args;
/// use setup_macports_common::settings::{PortSpec, Settings, SignatureCheck};
///
/// let settings = Settings {
///     verbose: true,
///     signature_check: SignatureCheck::Permissive,
///     signature_skip_packages: vec!["db48".to_owned()],
///     ..Settings::default()
/// };
/// let port = PortSpec { name: "db48".to_owned(), variants: Some("+tcl -java".to_owned()) };
/// assert_eq!(
///     port_install_args(&port, &settings),
///     ["-f", "-v", "install", "db48", "+tcl", "-java"],
/// );
/// ```
#[must_use]
pub fn port_install_args(port: &PortSpec, settings: &Settings) -> Vec<String> {
    let mut args = Vec::new();
    if settings.skips_signature_for(&port.name) {
        args.push("-f".to_owned());
    }
    if settings.verbose {
        args.push("-v".to_owned());
    }
    args.push("install".to_owned());
    args.push(port.name.clone());
    args.extend(port.variant_tokens().map(str::to_owned));
    args
}

/// Render the ports list as `ports.conf` lines: `name [variants]`.
#[must_use]
pub fn ports_conf_lines(ports: &[PortSpec]) -> Vec<String> {
    ports
        .iter()
        .map(|port| match port.variants.as_deref() {
            Some(variants) => format!("{} {variants}", port.name),
            None => port.name.clone(),
        })
        .collect()
}
