//! `log` backend that speaks GitHub Actions workflow commands.
//!
//! Errors and warnings become `::error::` and `::warning::` annotations,
//! info records are plain lines, and debug or trace records use `::debug::`
//! so the runner hides them unless step debugging is on.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use setup_macports_common::settings::Settings;
use std::io::Write;

/// Only records from this crate and its common crate are shown.
const TARGET_PREFIX: &str = "setup_macports";

/// Logger writing workflow commands to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowLogger {
    level: LevelFilter,
}

impl WorkflowLogger {
    /// Create a logger passing records up to `level`.
    #[must_use]
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Install the logger as the global `log` backend.
    ///
    /// # Errors
    ///
    /// Fails when a logger is already installed.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for WorkflowLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with(TARGET_PREFIX)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record.level(), &record.args().to_string());
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{line}").is_err() {
            // Nowhere left to report a broken stdout.
        }
    }

    fn flush(&self) {
        if std::io::stdout().flush().is_err() {
            // As above.
        }
    }
}

/// Render one record as a workflow command line.
///
/// # Examples
///
/// ```
/// use log::Level;
/// use setup_macports::actions::logger::format_record;
///
/// assert_eq!(format_record(Level::Warn, "no tags"), "::warning::no tags");
/// assert_eq!(format_record(Level::Info, "Installing"), "Installing");
/// ```
#[must_use]
pub fn format_record(level: Level, message: &str) -> String {
    match level {
        Level::Error => format!("::error::{}", escape_data(message)),
        Level::Warn => format!("::warning::{}", escape_data(message)),
        Level::Info => message.to_owned(),
        Level::Debug | Level::Trace => format!("::debug::{}", escape_data(message)),
    }
}

/// Escape a workflow command payload.
#[must_use]
pub fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Pick the level implied by the `debug` and `verbose` inputs.
#[must_use]
pub const fn level_for(settings: &Settings) -> LevelFilter {
    if settings.debug {
        LevelFilter::Trace
    } else if settings.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Run `f` inside a collapsible log group.
pub fn group<T>(name: &str, f: impl FnOnce() -> T) -> T {
    write_command(&format!("::group::{}", escape_data(name)));
    let result = f();
    write_command("::endgroup::");
    result
}

fn write_command(line: &str) {
    let mut stdout = std::io::stdout().lock();
    if writeln!(stdout, "{line}").is_err() {
        // Grouping is cosmetic.
    }
}
