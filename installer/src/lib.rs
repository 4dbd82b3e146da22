//! setup-macports installer library.
//!
//! This crate installs and configures MacPorts on macOS CI runners. It is
//! used by the `setup-macports` binary and can be driven programmatically
//! with stubbed collaborators for testing.
//!
//! # Modules
//!
//! - [`actions`] - GitHub Actions inputs, outputs, state, and logging
//! - [`cache`] - Cache store trait and the directory-backed store
//! - [`cli`] - Command-line argument definitions
//! - [`config_files`] - MacPorts configuration file rendering and writing
//! - [`download`] - Installer package download
//! - [`error`] - Error types for the run
//! - [`exec`] - External command execution, plain and privileged
//! - [`git`] - Git checkout of the ports tree
//! - [`http`] - Shared HTTP agents
//! - [`orchestrator`] - Main and post phase sequencing
//! - [`pkg`] - Signature verification and package installation
//! - [`platform`] - Host platform detection
//! - [`ports`] - Port installation
//! - [`releases`] - Upstream release listing
//! - [`sources`] - Source provider resolution and sync
//! - [`version`] - Retrying `latest` version resolution

pub mod actions;
pub mod cache;
pub mod cli;
pub mod config_files;
pub mod download;
pub mod error;
pub mod exec;
pub mod git;
pub mod http;
pub mod orchestrator;
pub mod pkg;
pub mod platform;
pub mod ports;
pub mod releases;
pub mod sources;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
