//! Outputs, PATH additions, and saved state.
//!
//! Each channel is a file named by an environment variable. Values are
//! written in the multi-line `name<<DELIMITER` form so newlines survive.
//! Outside a runner the variables are unset: outputs are printed to stdout
//! and PATH additions are only logged.

use crate::error::{Result, SetupError};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;

/// Variable naming the step output file.
pub const OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Variable naming the PATH additions file.
pub const PATH_ENV: &str = "GITHUB_PATH";

/// Variable naming the saved state file.
pub const STATE_ENV: &str = "GITHUB_STATE";

const DELIMITER_PREFIX: &str = "ghadelimiter_";

/// Hex digits of the value digest used in delimiters.
const DELIMITER_DIGEST_LEN: usize = 32;

/// Writers for the runner's command files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionsRuntime {
    output_file: Option<Utf8PathBuf>,
    path_file: Option<Utf8PathBuf>,
    state_file: Option<Utf8PathBuf>,
}

impl ActionsRuntime {
    /// Create a runtime writing to the given files.
    #[must_use]
    pub const fn new(
        output_file: Option<Utf8PathBuf>,
        path_file: Option<Utf8PathBuf>,
        state_file: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            output_file,
            path_file,
            state_file,
        }
    }

    /// Locate the command files from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(env_file(OUTPUT_ENV), env_file(PATH_ENV), env_file(STATE_ENV))
    }

    /// Publish a step output.
    ///
    /// # Errors
    ///
    /// Fails when the value cannot be framed safely or the output file
    /// cannot be appended to.
    pub fn set_output(&self, name: &str, value: &str) -> Result<()> {
        debug!("output {name}={value}");
        match &self.output_file {
            Some(file) => append(file, &format_key_value(name, value)?),
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{name}={value}")?;
                Ok(())
            }
        }
    }

    /// Prepend `dir` to `PATH` for later steps.
    ///
    /// # Errors
    ///
    /// Fails when the PATH file cannot be appended to.
    pub fn add_path(&self, dir: &Utf8Path) -> Result<()> {
        info!("Adding {dir} to PATH");
        match &self.path_file {
            Some(file) => append(file, &format!("{dir}\n")),
            None => Ok(()),
        }
    }

    /// Save a value for the post phase.
    ///
    /// # Errors
    ///
    /// Fails when the value cannot be framed safely or the state file
    /// cannot be appended to.
    pub fn save_state(&self, name: &str, value: &str) -> Result<()> {
        match &self.state_file {
            Some(file) => append(file, &format_key_value(name, value)?),
            None => Ok(()),
        }
    }
}

/// Frame `name` and `value` for a runner command file.
///
/// # Errors
///
/// Returns [`SetupError::Output`] when either part contains the delimiter.
///
/// # Examples
///
/// ```
/// use setup_macports::actions::runtime::format_key_value;
///
/// let framed = format_key_value("prefix", "/opt/local")?;
/// assert!(framed.starts_with("prefix<<ghadelimiter_"));
/// assert!(framed.contains("\n/opt/local\n"));
/// # Ok::<(), setup_macports::error::SetupError>(())
/// ```
pub fn format_key_value(name: &str, value: &str) -> Result<String> {
    let delimiter = delimiter_for(name, value);
    if name.contains(&delimiter) || value.contains(&delimiter) {
        return Err(SetupError::Output {
            name: name.to_owned(),
            reason: "value contains the command file delimiter".to_owned(),
        });
    }
    Ok(format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
}

fn delimiter_for(name: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0]);
    hasher.update(value.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let short: String = digest.chars().take(DELIMITER_DIGEST_LEN).collect();
    format!("{DELIMITER_PREFIX}{short}")
}

fn append(file: &Utf8Path, contents: &str) -> Result<()> {
    let mut handle = OpenOptions::new().create(true).append(true).open(file)?;
    handle.write_all(contents.as_bytes())?;
    Ok(())
}

fn env_file(name: &str) -> Option<Utf8PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
}
