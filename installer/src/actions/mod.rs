//! GitHub Actions runtime surface.
//!
//! Inputs come from `INPUT_*` variables, outputs and PATH additions are
//! appended to the files named by `GITHUB_OUTPUT` and `GITHUB_PATH`, and
//! log records are rendered as workflow commands on stdout.

pub mod inputs;
pub mod logger;
pub mod runtime;
pub mod state;

pub use inputs::EnvInputs;
pub use logger::WorkflowLogger;
pub use runtime::ActionsRuntime;
pub use state::PhaseState;
