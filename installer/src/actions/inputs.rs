//! Action inputs read from the environment.

use setup_macports_common::inputs::InputLookup;
use std::collections::BTreeMap;

/// Prefix GitHub Actions puts in front of every input variable.
const INPUT_PREFIX: &str = "INPUT_";

/// Inputs from `INPUT_*` variables, with explicit overrides taking
/// precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvInputs {
    overrides: BTreeMap<String, String>,
}

impl EnvInputs {
    /// Read inputs from the environment only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read inputs from the environment, preferring `overrides`.
    #[must_use]
    pub fn with_overrides(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }
}

impl InputLookup for EnvInputs {
    fn input(&self, name: &str) -> Option<String> {
        self.overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(input_variable(name)).ok())
    }
}

/// Return the environment variable carrying input `name`.
///
/// The name is upper-cased and spaces become underscores; hyphens are kept.
///
/// # Examples
///
/// ```
/// use setup_macports::actions::inputs::input_variable;
///
/// assert_eq!(input_variable("sources-provider"), "INPUT_SOURCES-PROVIDER");
/// ```
#[must_use]
pub fn input_variable(name: &str) -> String {
    format!("{INPUT_PREFIX}{}", name.replace(' ', "_").to_uppercase())
}
