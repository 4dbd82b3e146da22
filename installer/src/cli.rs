//! CLI argument definitions for the setup-macports binary.
//!
//! On a runner the action invokes the binary twice with no arguments: once
//! for the main step and once for the post step. The phase is told apart by
//! the state the main step leaves behind. Subcommands and `--input` exist
//! for local runs.

use crate::actions::state::PhaseState;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;

/// Install and configure MacPorts on a macOS runner.
#[derive(Parser, Debug, Default)]
#[command(name = "setup-macports")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install and configure MacPorts on a macOS runner.\n\n",
    "Inputs are read from INPUT_* environment variables, as GitHub Actions ",
    "provides them. Outputs are appended to GITHUB_OUTPUT and PATH additions ",
    "to GITHUB_PATH.\n\n",
    "With no subcommand the phase is detected: if the main phase has already ",
    "recorded its state, the post phase runs.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the latest release with git sources:\n",
    "    $ setup-macports main --input sources-provider=git\n\n",
    "  Save the cache after a run:\n",
    "    $ setup-macports post\n",
))]
pub struct Cli {
    /// Phase to run [default: detected from saved state].
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Override an action input, as NAME=VALUE (repeatable).
    #[arg(
        long = "input",
        value_name = "NAME=VALUE",
        value_parser = parse_input_override,
        global = true
    )]
    pub inputs: Vec<(String, String)>,

    /// Location of the state passed from main to post.
    #[arg(long, value_name = "FILE", global = true)]
    pub state_file: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Install MacPorts, sync sources, and install ports.
    Main,
    /// Save the installation to the cache.
    Post,
}

impl Cli {
    /// Collect `--input` overrides; later values win.
    #[must_use]
    pub fn input_overrides(&self) -> BTreeMap<String, String> {
        self.inputs.iter().cloned().collect()
    }

    /// Return the phase to run.
    ///
    /// An explicit subcommand wins. Otherwise the post phase runs when the
    /// state file records a completed main phase.
    #[must_use]
    pub fn phase(&self, state_file: &Utf8Path) -> Command {
        if let Some(command) = self.command {
            return command;
        }
        match PhaseState::load(state_file) {
            Ok(Some(state)) if state.is_post => Command::Post,
            _ => Command::Main,
        }
    }
}

/// Parse a `NAME=VALUE` input override.
///
/// # Errors
///
/// Fails when there is no `=` or the name is empty.
pub fn parse_input_override(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got `{raw}`"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("input name is empty in `{raw}`"));
    }
    Ok((name.to_owned(), value.to_owned()))
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
