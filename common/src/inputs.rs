//! Conversion of raw action inputs into [`Settings`].
//!
//! Inputs arrive as a flat string map. Empty values count as unset, so a
//! workflow that passes `with: { prefix: '' }` gets the default prefix.
//! Legacy input shapes (`use-git-sources`, boolean `signature-check`) are
//! normalised here and never leave this module.

use crate::cache_key::CacheKeyScheme;
use crate::error::{ConfigError, Result};
use crate::settings::{
    GithubToken, PortSpec, Settings, SignatureCheck, SourcesProvider, VariantSelection,
};
use camino::Utf8PathBuf;
use std::collections::BTreeMap;

/// Read access to raw action inputs.
pub trait InputLookup {
    /// Return the raw value of `name`, if provided.
    fn input(&self, name: &str) -> Option<String>;
}

impl InputLookup for BTreeMap<String, String> {
    fn input(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Return the trimmed value of `name`, treating blank values as unset.
fn non_empty(inputs: &dyn InputLookup, name: &str) -> Option<String> {
    inputs
        .input(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parse a boolean-like input value.
///
/// Accepts `true`/`false`, `yes`/`no`, `on`/`off` and `1`/`0` in any case.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBoolean`] naming `input` for anything else.
pub fn parse_bool_input(input: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            input: input.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// Parse a whitespace-separated list of `+name`/`-name` tokens.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidVariant`] for a token without a sign or
/// with an empty or malformed name.
///
/// # Examples
///
/// ```
/// use setup_macports_common::inputs::parse_variants_input;
///
/// let variants = parse_variants_input("+aqua +metal -x11")?;
/// assert_eq!(variants.select, ["aqua", "metal"]);
/// assert_eq!(variants.deselect, ["x11"]);
/// assert!(parse_variants_input("aqua").is_err());
/// # Ok::<(), setup_macports_common::error::ConfigError>(())
/// ```
pub fn parse_variants_input(raw: &str) -> Result<VariantSelection> {
    let mut variants = VariantSelection::default();
    for token in raw.split_whitespace() {
        let (list, name) = if let Some(name) = token.strip_prefix('+') {
            (&mut variants.select, name)
        } else if let Some(name) = token.strip_prefix('-') {
            (&mut variants.deselect, name)
        } else {
            return Err(invalid_variant(token));
        };
        if !is_variant_name(name) {
            return Err(invalid_variant(token));
        }
        list.push(name.to_owned());
    }
    Ok(variants)
}

fn invalid_variant(token: &str) -> ConfigError {
    ConfigError::InvalidVariant {
        token: token.to_owned(),
    }
}

fn is_variant_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Parse a newline-delimited source list.
///
/// Lines are trimmed; blank lines and `#` comments are dropped.
#[must_use]
pub fn parse_sources_input(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Parse the ports input in either of its two formats.
///
/// A value starting with `[` is decoded as a JSON array of
/// `{"name": ..., "variants": ...}` objects; the variants string is kept
/// verbatim. Otherwise the value is split on whitespace and every `+`/`-`
/// token attaches to the port before it, so `db48 +tcl -java python312`
/// yields two ports.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPortsJson`] when the JSON form does not
/// decode, and [`ConfigError::InvalidPort`] for an empty name or a variant
/// token that precedes every port name.
///
/// # Examples
///
/// ```
/// use setup_macports_common::inputs::parse_install_ports_input;
///
/// let ports = parse_install_ports_input(r#"[{"name":"db48","variants":"+tcl +universal -java"}]"#)?;
/// assert_eq!(ports.len(), 1);
/// assert_eq!(ports[0].variants.as_deref(), Some("+tcl +universal -java"));
/// # Ok::<(), setup_macports_common::error::ConfigError>(())
/// ```
pub fn parse_install_ports_input(raw: &str) -> Result<Vec<PortSpec>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return parse_ports_json(trimmed);
    }

    let mut ports: Vec<PortSpec> = Vec::new();
    for token in trimmed.split_whitespace() {
        if token.starts_with('+') || token.starts_with('-') {
            let Some(port) = ports.last_mut() else {
                return Err(ConfigError::InvalidPort {
                    entry: token.to_owned(),
                    reason: "variant flags must follow a port name",
                });
            };
            let variants = port.variants.get_or_insert_with(String::new);
            if !variants.is_empty() {
                variants.push(' ');
            }
            variants.push_str(token);
        } else {
            ports.push(PortSpec::named(token));
        }
    }
    Ok(ports)
}

fn parse_ports_json(raw: &str) -> Result<Vec<PortSpec>> {
    let ports: Vec<PortSpec> =
        serde_json::from_str(raw).map_err(|err| ConfigError::InvalidPortsJson {
            reason: err.to_string(),
        })?;
    ports
        .into_iter()
        .map(|port| {
            let name = port.name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidPort {
                    entry: raw.to_owned(),
                    reason: "port name must not be empty",
                });
            }
            let variants = port
                .variants
                .map(|flags| flags.trim().to_owned())
                .filter(|flags| !flags.is_empty());
            Ok(PortSpec {
                name: name.to_owned(),
                variants,
            })
        })
        .collect()
}

/// Split a package list on whitespace and commas.
#[must_use]
pub fn parse_package_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Build validated [`Settings`] from raw inputs.
///
/// `sources-provider` wins over the legacy `use-git-sources` flag; when only
/// the flag is given, `true` selects `git` and `false` selects `rsync`.
/// `ports` takes precedence over its alias `install-ports`.
///
/// # Errors
///
/// Returns the first [`ConfigError`] raised by any individual input, or by
/// [`Settings::validate`].
pub fn parse_settings(inputs: &dyn InputLookup) -> Result<Settings> {
    let defaults = Settings::default();
    let bool_or = |name: &str, default: bool| -> Result<bool> {
        Ok(non_empty(inputs, name)
            .map(|value| parse_bool_input(name, &value))
            .transpose()?
            .unwrap_or(default))
    };

    let sources_provider = match non_empty(inputs, "sources-provider") {
        Some(value) => value.parse::<SourcesProvider>()?,
        None => match non_empty(inputs, "use-git-sources") {
            Some(value) if parse_bool_input("use-git-sources", &value)? => SourcesProvider::Git,
            Some(_) => SourcesProvider::Rsync,
            None => defaults.sources_provider,
        },
    };

    let ports = non_empty(inputs, "ports")
        .or_else(|| non_empty(inputs, "install-ports"))
        .map(|raw| parse_install_ports_input(&raw))
        .transpose()?
        .unwrap_or_default();

    let settings = Settings {
        version: non_empty(inputs, "version").unwrap_or(defaults.version),
        resolved_version: None,
        prefix: non_empty(inputs, "prefix").map_or(defaults.prefix, Utf8PathBuf::from),
        variants: non_empty(inputs, "variants")
            .map(|raw| parse_variants_input(&raw))
            .transpose()?
            .unwrap_or_default(),
        sources: non_empty(inputs, "sources")
            .map(|raw| parse_sources_input(&raw))
            .unwrap_or_default(),
        ports,
        sources_provider,
        git_repository: non_empty(inputs, "git-repository").unwrap_or(defaults.git_repository),
        git_ref: non_empty(inputs, "git-ref"),
        rsync_url: non_empty(inputs, "rsync-url").unwrap_or(defaults.rsync_url),
        prepend_path: bool_or("prepend-path", defaults.prepend_path)?,
        verbose: bool_or("verbose", defaults.verbose)?,
        debug: bool_or("debug", defaults.debug)?,
        cache: bool_or("cache", defaults.cache)?,
        cache_key_scheme: non_empty(inputs, "cache-key-scheme")
            .map(|raw| raw.parse::<CacheKeyScheme>())
            .transpose()?
            .unwrap_or_default(),
        signature_check: non_empty(inputs, "signature-check")
            .map(|raw| raw.parse::<SignatureCheck>())
            .transpose()?
            .unwrap_or_default(),
        signature_skip_packages: non_empty(inputs, "signature-skip-packages")
            .map(|raw| parse_package_list(&raw))
            .unwrap_or_default(),
        github_token: non_empty(inputs, "github-token").map(GithubToken::new),
    };
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn inputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    #[case("true", true)]
    #[case("YES", true)]
    #[case(" on ", true)]
    #[case("1", true)]
    #[case("False", false)]
    #[case("no", false)]
    #[case("off", false)]
    #[case("0", false)]
    fn parses_boolean_spellings(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(parse_bool_input("cache", raw), Ok(expected));
    }

    #[test]
    fn invalid_boolean_names_the_input() {
        let err = parse_bool_input("verbose", "maybe").expect_err("not a boolean");
        assert!(err.to_string().contains("verbose"));
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn variants_keep_input_order() {
        let variants = parse_variants_input("+metal -x11 +aqua -quartz").expect("variants");
        assert_eq!(variants.select, ["metal", "aqua"]);
        assert_eq!(variants.deselect, ["x11", "quartz"]);
    }

    #[rstest]
    #[case("aqua")]
    #[case("+")]
    #[case("+aqua -")]
    #[case("+bad/name")]
    fn rejects_malformed_variants(#[case] raw: &str) {
        assert!(matches!(
            parse_variants_input(raw),
            Err(ConfigError::InvalidVariant { .. })
        ));
    }

    #[test]
    fn sources_skip_blanks_and_comments() {
        let raw = "\n  file:///opt/ports [default]\n# mirror\n\nrsync://example.org/ports.tar  \n";
        assert_eq!(
            parse_sources_input(raw),
            ["file:///opt/ports [default]", "rsync://example.org/ports.tar"]
        );
    }

    #[test]
    fn ports_json_preserves_variant_string() {
        let ports =
            parse_install_ports_input(r#"[{"name":"db48","variants":"+tcl +universal -java"}]"#)
                .expect("ports");
        assert_eq!(
            ports,
            [PortSpec {
                name: "db48".to_owned(),
                variants: Some("+tcl +universal -java".to_owned()),
            }]
        );
    }

    #[test]
    fn ports_json_variants_are_optional() {
        let ports = parse_install_ports_input(r#"[{"name":"git"},{"name":"cmake","variants":""}]"#)
            .expect("ports");
        assert_eq!(ports, [PortSpec::named("git"), PortSpec::named("cmake")]);
    }

    #[rstest]
    #[case(r#"[{"variants":"+tcl"}]"#)]
    #[case("[not json")]
    fn rejects_bad_ports_json(#[case] raw: &str) {
        assert!(matches!(
            parse_install_ports_input(raw),
            Err(ConfigError::InvalidPortsJson { .. })
        ));
    }

    #[test]
    fn rejects_blank_json_port_name() {
        assert!(matches!(
            parse_install_ports_input(r#"[{"name":"  "}]"#),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn space_separated_ports_collect_trailing_variants() {
        let ports = parse_install_ports_input("db48 +tcl -java  python312\ncmake").expect("ports");
        assert_eq!(
            ports,
            [
                PortSpec {
                    name: "db48".to_owned(),
                    variants: Some("+tcl -java".to_owned()),
                },
                PortSpec::named("python312"),
                PortSpec::named("cmake"),
            ]
        );
    }

    #[test]
    fn leading_variant_without_port_is_rejected() {
        assert!(matches!(
            parse_install_ports_input("+universal db48"),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn package_list_accepts_commas_and_whitespace() {
        assert_eq!(
            parse_package_list("db48, python312\ncmake"),
            ["db48", "python312", "cmake"]
        );
    }

    #[test]
    fn no_inputs_gives_defaults() {
        let settings = parse_settings(&inputs(&[])).expect("defaults");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn blank_inputs_count_as_unset() {
        let settings =
            parse_settings(&inputs(&[("prefix", "  "), ("cache", "")])).expect("defaults");
        assert_eq!(settings.prefix, "/opt/local");
        assert!(settings.cache);
    }

    #[test]
    fn parses_a_full_input_set() {
        let settings = parse_settings(&inputs(&[
            ("version", "2.10.0"),
            ("prefix", "/opt/mports"),
            ("variants", "+aqua -x11"),
            ("sources", "file:///srv/ports [default]"),
            ("ports", "db48 +tcl"),
            ("sources-provider", "custom"),
            ("git-ref", "release-2.10"),
            ("verbose", "true"),
            ("cache", "false"),
            ("cache-key-scheme", "simple"),
            ("signature-check", "permissive"),
            ("signature-skip-packages", "db48"),
            ("github-token", "ghp_x"),
        ]))
        .expect("settings");

        assert_eq!(settings.version, "2.10.0");
        assert_eq!(settings.prefix, "/opt/mports");
        assert_eq!(settings.variants.select, ["aqua"]);
        assert_eq!(settings.sources, ["file:///srv/ports [default]"]);
        assert_eq!(settings.ports.len(), 1);
        assert_eq!(settings.sources_provider, SourcesProvider::Custom);
        assert_eq!(settings.git_ref.as_deref(), Some("release-2.10"));
        assert!(settings.verbose);
        assert!(!settings.cache);
        assert_eq!(settings.cache_key_scheme, CacheKeyScheme::Simple);
        assert!(settings.skips_signature_for("db48"));
        assert_eq!(
            settings.github_token.as_ref().map(GithubToken::expose),
            Some("ghp_x")
        );
    }

    #[rstest]
    #[case(&[("use-git-sources", "true")], SourcesProvider::Git)]
    #[case(&[("use-git-sources", "false")], SourcesProvider::Rsync)]
    #[case(&[("use-git-sources", "true"), ("sources-provider", "rsync")], SourcesProvider::Rsync)]
    #[case(&[], SourcesProvider::Auto)]
    fn normalises_legacy_git_flag(
        #[case] pairs: &[(&str, &str)],
        #[case] expected: SourcesProvider,
    ) {
        let settings = parse_settings(&inputs(pairs)).expect("settings");
        assert_eq!(settings.sources_provider, expected);
    }

    #[test]
    fn legacy_signature_boolean_maps_to_enum() {
        let settings = parse_settings(&inputs(&[("signature-check", "false")])).expect("settings");
        assert_eq!(settings.signature_check, SignatureCheck::Disabled);
    }

    #[test]
    fn install_ports_alias_is_honoured() {
        let settings = parse_settings(&inputs(&[("install-ports", "git")])).expect("settings");
        assert_eq!(settings.ports, [PortSpec::named("git")]);
    }

    #[rstest]
    #[case("prefix", "opt/local")]
    #[case("sources-provider", "svn")]
    #[case("variants", "aqua")]
    #[case("debug", "sometimes")]
    fn invalid_inputs_are_fatal(#[case] name: &str, #[case] value: &str) {
        assert!(parse_settings(&inputs(&[(name, value)])).is_err());
    }
}
