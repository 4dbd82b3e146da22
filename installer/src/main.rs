//! setup-macports entrypoint.
//!
//! Runs the main phase (install and configure MacPorts) or the post phase
//! (save the cache) of the action.

use clap::Parser;
use log::LevelFilter;
use setup_macports::actions::logger::{WorkflowLogger, escape_data, level_for};
use setup_macports::actions::state::{PhaseState, default_path};
use setup_macports::actions::{ActionsRuntime, EnvInputs};
use setup_macports::cache::{CacheStore, DirectoryCacheStore};
use setup_macports::cli::{Cli, Command};
use setup_macports::download::HttpDownloader;
use setup_macports::error::Result;
use setup_macports::exec::SystemCommandExecutor;
use setup_macports::git::GitFetcher;
use setup_macports::orchestrator::{RunEnvironment, Services, run_main, run_post};
use setup_macports::platform::HostPlatform;
use setup_macports::releases::GithubReleases;
use setup_macports_common::inputs::parse_settings;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let state_file = cli.state_file.clone().unwrap_or_else(default_path);
    let store = DirectoryCacheStore::from_env();
    let cache = store.as_ref().map(|store| store as &dyn CacheStore);

    match cli.phase(&state_file) {
        Command::Main => {
            PhaseState::started().save(&state_file)?;
            let settings = parse_settings(&EnvInputs::with_overrides(cli.input_overrides()))?;
            init_logging(level_for(&settings));

            let executor = SystemCommandExecutor;
            let platform = HostPlatform::new(&executor);
            let releases = GithubReleases::new(settings.github_token.clone());
            let fetcher = GitFetcher::new(&executor, settings.prefix().to_owned());
            let services = Services {
                executor: &executor,
                platform: &platform,
                releases: &releases,
                downloader: &HttpDownloader,
                fetcher: &fetcher,
                cache,
            };
            let env = RunEnvironment::from_env(state_file);
            run_main(settings, &services, &env, &ActionsRuntime::from_env())?;
        }
        Command::Post => {
            init_logging(LevelFilter::Info);
            run_post(&state_file, cache)?;
        }
    }
    Ok(())
}

fn init_logging(level: LevelFilter) {
    if let Err(err) = WorkflowLogger::init(level) {
        write_stderr_line(&mut std::io::stderr(), format!("logging unavailable: {err}"));
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("::error::{}", escape_data(&err.to_string())));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use setup_macports::error::SetupError;
    use setup_macports::orchestrator::PostOutcome;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_an_annotation_and_returns_one() {
        let err = SetupError::UnsupportedHost {
            os: "Linux".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("::error::"));
        assert!(stderr_text.contains("Linux"));
    }

    #[test]
    fn failed_main_phase_is_followed_by_a_post_phase_that_only_exits() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        let state_file = dir.join("state.json");
        let main = Cli {
            command: Some(Command::Main),
            inputs: vec![("cache".to_owned(), "maybe".to_owned())],
            state_file: Some(state_file.clone()),
        };

        let err = run(&main).expect_err("invalid input");
        assert!(err.to_string().contains("cache"));

        assert_eq!(Cli::default().phase(&state_file), Command::Post);
        let outcome = run_post(&state_file, None).expect("post");
        assert_eq!(outcome, PostOutcome::CacheDisabled);
    }
}
