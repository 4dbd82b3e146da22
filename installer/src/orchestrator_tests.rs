//! Unit tests for the main and post phases.

use super::*;
use crate::cache::{MockCacheStore, SaveOutcome};
use crate::download::MockPackageDownloader;
use crate::error::SetupError;
use crate::releases::MockReleaseSource;
use crate::sources::MockSourceFetcher;
use crate::test_utils::{ANY_ARG, ExpectedCall, StubExecutor, with_action_env};
use setup_macports_common::platform::{Architecture, PlatformInfo};
use std::collections::BTreeMap;

const PACKAGE_URL: &str = "https://github.com/macports/macports-base/releases/download/v2.11.5/MacPorts-2.11.5-15-Sequoia.pkg";
const RSYNC: &str = "rsync://rsync.macports.org/macports/release/tarballs/ports.tar";

struct FixedPlatform;

impl PlatformDetector for FixedPlatform {
    fn detect(&self) -> Result<PlatformInfo> {
        Ok(PlatformInfo::from_version_number("15.3.1", Architecture::Arm64)?)
    }
}

struct Unsupported;

impl PlatformDetector for Unsupported {
    fn detect(&self) -> Result<PlatformInfo> {
        Err(SetupError::UnsupportedHost {
            os: "Linux".to_owned(),
        })
    }
}

/// Scratch directories standing in for the prefix and the runner.
struct Harness {
    _dir: tempfile::TempDir,
    runner: Utf8PathBuf,
    prefix: Utf8PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        let runner = root.join("runner");
        let prefix = root.join("opt/local");
        std::fs::create_dir_all(&runner).expect("runner dir");
        Self {
            _dir: dir,
            runner,
            prefix,
        }
    }

    fn settings(&self, provider: SourcesProvider, cache: bool) -> Settings {
        Settings {
            version: "2.11.5".to_owned(),
            prefix: self.prefix.clone(),
            sources_provider: provider,
            cache,
            ..Settings::default()
        }
    }

    fn env(&self) -> RunEnvironment {
        RunEnvironment {
            context: CacheContext {
                workflow: "ci".to_owned(),
                git_ref: "refs/heads/main".to_owned(),
                base_ref: None,
                tool_version: "0.3.0".to_owned(),
            },
            work_dir: self.runner.clone(),
            user: Some("runner".to_owned()),
            state_file: self.runner.join("setup-macports/state.json"),
            retry_unit: Duration::ZERO,
        }
    }

    fn keys(&self, settings: &Settings) -> CacheKeys {
        let platform = FixedPlatform.detect().expect("platform");
        CacheKeys::derive(settings, &platform, &self.env().context)
    }

    fn sudo(&self, cmd: &str, args: &[&str]) -> ExpectedCall {
        let mut elevated = vec!["-n", cmd];
        elevated.extend_from_slice(args);
        ExpectedCall::ok("sudo", &elevated)
    }

    fn install_conf(&self, file: &str) -> ExpectedCall {
        let target = self.prefix.join("etc/macports").join(file);
        self.sudo("install", &["-m", "0644", ANY_ARG, target.as_str()])
    }

    fn port(&self) -> String {
        self.prefix.join("bin/port").to_string()
    }

    fn package_calls(&self) -> Vec<ExpectedCall> {
        vec![
            ExpectedCall::ok("pkgutil", &["--check-signature", ANY_ARG]),
            self.sudo("installer", &["-pkg", ANY_ARG, "-target", "/"]),
        ]
    }

    fn outputs(&self) -> BTreeMap<String, String> {
        let written =
            std::fs::read_to_string(self.runner.join("github_output")).expect("outputs");
        parse_command_file(&written)
    }
}

fn parse_command_file(body: &str) -> BTreeMap<String, String> {
    let mut parsed = BTreeMap::new();
    let mut lines = body.lines();
    while let Some(header) = lines.next() {
        let (name, delimiter) = header.split_once("<<").expect("heredoc header");
        let value: Vec<&str> = lines.by_ref().take_while(|line| *line != delimiter).collect();
        parsed.insert(name.to_owned(), value.join("\n"));
    }
    parsed
}

fn downloader_once() -> MockPackageDownloader {
    let mut downloader = MockPackageDownloader::new();
    downloader
        .expect_download()
        .withf(|url, _| url == PACKAGE_URL)
        .times(1)
        .returning(|_, _| Ok(()));
    downloader
}

#[test]
fn fresh_install_without_cache_publishes_every_output() {
    let harness = Harness::new();
    let settings = harness.settings(SourcesProvider::Rsync, false);
    let port = harness.port();
    let mut calls = harness.package_calls();
    calls.push(harness.sudo(&port, &["-N", "sync"]));
    calls.push(harness.install_conf("sources.conf"));
    calls.push(harness.install_conf("macports.conf"));
    let executor = StubExecutor::new(calls);
    let downloader = downloader_once();
    let releases = MockReleaseSource::new();
    let fetcher = MockSourceFetcher::new();
    let services = Services {
        executor: &executor,
        platform: &FixedPlatform,
        releases: &releases,
        downloader: &downloader,
        fetcher: &fetcher,
        cache: None,
    };

    let env = harness.env();
    let outputs = with_action_env(&harness.runner, || {
        run_main(settings, &services, &env, &ActionsRuntime::from_env())
    })
    .expect("main phase");
    executor.assert_finished();

    assert!(!outputs.cache_hit);
    let published = harness.outputs();
    assert_eq!(published.len(), 14);
    assert_eq!(published["version"], "2.11.5");
    assert_eq!(published["package-url"], PACKAGE_URL);
    assert_eq!(published["cache-hit"], "false");
    assert_eq!(published["uses-git-sources"], "false");
    assert_eq!(published["configured-sources"], format!("{RSYNC} [default]"));
    assert_eq!(published["rsync-source-urls"], RSYNC);
    assert_eq!(published["git-source-path"], "");
    assert_eq!(
        published["macports-conf-path"],
        harness.prefix.join("etc/macports/macports.conf").as_str()
    );

    let path = std::fs::read_to_string(harness.runner.join("github_path")).expect("path file");
    assert_eq!(
        path,
        format!("{}\n{}\n", harness.prefix.join("sbin"), harness.prefix.join("bin"))
    );

    let state = PhaseState::load(&env.state_file)
        .expect("load state")
        .expect("state written");
    assert!(state.is_post);
    assert!(!state.cache_enabled);
    assert_eq!(state.cache_key, outputs.cache_key);
}

#[test]
fn exact_cache_hit_skips_install_and_sync() {
    let harness = Harness::new();
    let mut settings = harness.settings(SourcesProvider::Rsync, true);
    settings.ports = vec![setup_macports_common::settings::PortSpec::named("git")];
    settings.prepend_path = false;
    let primary = harness.keys(&settings).installation.cache_key;

    let conf_dir = harness.prefix.join("etc/macports");
    std::fs::create_dir_all(&conf_dir).expect("conf dir");
    std::fs::write(conf_dir.join("sources.conf"), format!("# restored\n{RSYNC} [default]\n"))
        .expect("sources.conf");

    let port = harness.port();
    let executor = StubExecutor::new(vec![
        harness.sudo("mkdir", &["-p", harness.prefix.as_str()]),
        harness.sudo("chown", &["runner", harness.prefix.as_str()]),
        harness.sudo(&port, &["install", "git"]),
    ]);
    let mut cache = MockCacheStore::new();
    let expected_key = primary.clone();
    cache
        .expect_restore()
        .withf(move |_, key, _| key == expected_key)
        .times(1)
        .returning(|_, key, _| Ok(Some(key.to_owned())));
    let downloader = MockPackageDownloader::new();
    let releases = MockReleaseSource::new();
    let fetcher = MockSourceFetcher::new();
    let services = Services {
        executor: &executor,
        platform: &FixedPlatform,
        releases: &releases,
        downloader: &downloader,
        fetcher: &fetcher,
        cache: Some(&cache),
    };

    let env = harness.env();
    let outputs = with_action_env(&harness.runner, || {
        run_main(settings, &services, &env, &ActionsRuntime::from_env())
    })
    .expect("main phase");
    executor.assert_finished();

    assert!(outputs.cache_hit);
    assert_eq!(outputs.cache_key, primary);
    assert_eq!(outputs.sources.rsync_urls, vec![RSYNC.to_owned()]);
    assert_eq!(harness.outputs()["cache-hit"], "true");
    let path = std::fs::read_to_string(harness.runner.join("github_path")).expect("path file");
    assert!(path.is_empty());
}

#[test]
fn setup_partition_hit_skips_the_package_download() {
    let harness = Harness::new();
    let settings = harness.settings(SourcesProvider::Rsync, true);
    let setup_key = harness.keys(&settings).setup;

    let port = harness.port();
    let prefix = harness.prefix.as_str();
    let executor = StubExecutor::new(vec![
        harness.sudo("mkdir", &["-p", prefix]),
        harness.sudo("chown", &["runner", prefix]),
        harness.sudo(&port, &["-N", "sync"]),
        harness.install_conf("sources.conf"),
        harness.install_conf("macports.conf"),
        harness.sudo("chown", &["-R", "runner", prefix]),
    ]);
    let mut cache = MockCacheStore::new();
    cache
        .expect_restore()
        .times(2)
        .returning(move |_, key, _| Ok((key == setup_key).then(|| key.to_owned())));
    let downloader = MockPackageDownloader::new();
    let releases = MockReleaseSource::new();
    let fetcher = MockSourceFetcher::new();
    let services = Services {
        executor: &executor,
        platform: &FixedPlatform,
        releases: &releases,
        downloader: &downloader,
        fetcher: &fetcher,
        cache: Some(&cache),
    };

    let env = harness.env();
    let outputs = with_action_env(&harness.runner, || {
        run_main(settings, &services, &env, &ActionsRuntime::from_env())
    })
    .expect("main phase");
    executor.assert_finished();
    assert!(!outputs.cache_hit);
}

#[test]
fn git_sources_save_the_setup_and_ports_partitions() {
    let harness = Harness::new();
    let settings = harness.settings(SourcesProvider::Git, true);
    let keys = harness.keys(&settings);
    let checkout = harness
        .prefix
        .join("var/macports/sources/github.com/macports/macports-ports");

    let prefix = harness.prefix.as_str();
    let mut calls = vec![
        harness.sudo("mkdir", &["-p", prefix]),
        harness.sudo("chown", &["runner", prefix]),
    ];
    calls.extend(harness.package_calls());
    calls.push(harness.sudo("chown", &["-R", "runner", prefix]));
    calls.push(harness.sudo("chown", &["-R", "runner", prefix]));
    calls.push(harness.install_conf("sources.conf"));
    calls.push(harness.install_conf("macports.conf"));
    calls.push(harness.sudo("chown", &["-R", "runner", prefix]));
    let executor = StubExecutor::new(calls);

    let mut cache = MockCacheStore::new();
    cache.expect_restore().times(3).returning(|_, _, _| Ok(None));
    let mut seq = mockall::Sequence::new();
    let setup_key = keys.setup.clone();
    cache
        .expect_save()
        .withf(move |_, key| key == setup_key)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(SaveOutcome::Saved));
    let ports_key = keys.ports.clone();
    let tree = harness.prefix.join(PORTS_TREE_DIR);
    cache
        .expect_save()
        .withf(move |paths, key| key == ports_key && paths.to_vec() == vec![tree.clone()])
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(SaveOutcome::Reserved));

    let mut fetcher = MockSourceFetcher::new();
    let expected_checkout = checkout.clone();
    fetcher
        .expect_fetch()
        .withf(move |_, git_ref, dest| {
            git_ref == "master" && dest.as_str() == expected_checkout.as_str()
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    let downloader = downloader_once();
    let releases = MockReleaseSource::new();
    let services = Services {
        executor: &executor,
        platform: &FixedPlatform,
        releases: &releases,
        downloader: &downloader,
        fetcher: &fetcher,
        cache: Some(&cache),
    };

    let env = harness.env();
    let outputs = with_action_env(&harness.runner, || {
        run_main(settings, &services, &env, &ActionsRuntime::from_env())
    })
    .expect("main phase");
    executor.assert_finished();

    assert!(outputs.sources.uses_git);
    assert_eq!(outputs.sources.git_source_path, Some(checkout.clone()));
    assert_eq!(harness.outputs()["git-source-path"], checkout.as_str());
}

#[test]
fn unsupported_hosts_fail_before_running_anything() {
    let harness = Harness::new();
    let executor = StubExecutor::new(vec![]);
    let downloader = MockPackageDownloader::new();
    let releases = MockReleaseSource::new();
    let fetcher = MockSourceFetcher::new();
    let services = Services {
        executor: &executor,
        platform: &Unsupported,
        releases: &releases,
        downloader: &downloader,
        fetcher: &fetcher,
        cache: None,
    };

    let err = run_main(
        harness.settings(SourcesProvider::Rsync, false),
        &services,
        &harness.env(),
        &ActionsRuntime::default(),
    )
    .expect_err("linux is unsupported");
    assert!(matches!(err, SetupError::UnsupportedHost { .. }));
    assert!(!harness.env().state_file.exists());
}

fn post_state(harness: &Harness, cache_hit: bool, cache_enabled: bool) -> Utf8PathBuf {
    let path = harness.runner.join("state.json");
    PhaseState {
        is_post: true,
        prefix: harness.prefix.clone(),
        cache_key: "macports-2.11.5-arm64-15-abc-def".to_owned(),
        resolved_version: Some("2.11.5".to_owned()),
        cache_hit,
        cache_enabled,
    }
    .save(&path)
    .expect("save state");
    path
}

#[test]
fn post_without_state_does_nothing() {
    let harness = Harness::new();
    let cache = MockCacheStore::new();
    let outcome = run_post(&harness.runner.join("state.json"), Some(&cache)).expect("post");
    assert_eq!(outcome, PostOutcome::NoState);
}

#[test]
fn post_skips_disabled_caches_and_exact_hits() {
    let harness = Harness::new();
    let cache = MockCacheStore::new();

    let disabled = post_state(&harness, false, false);
    assert_eq!(
        run_post(&disabled, Some(&cache)).expect("post"),
        PostOutcome::CacheDisabled
    );

    let hit = post_state(&harness, true, true);
    assert_eq!(run_post(&hit, Some(&cache)).expect("post"), PostOutcome::AlreadyCached);

    let missing_store = post_state(&harness, false, true);
    assert_eq!(run_post(&missing_store, None).expect("post"), PostOutcome::NoStore);
}

#[test]
fn post_saves_the_prefix_under_the_recorded_key() {
    let harness = Harness::new();
    let state_file = post_state(&harness, false, true);
    let prefix = harness.prefix.clone();
    let mut cache = MockCacheStore::new();
    cache
        .expect_save()
        .withf(move |paths, key| {
            paths.to_vec() == vec![prefix.clone()] && key == "macports-2.11.5-arm64-15-abc-def"
        })
        .times(1)
        .returning(|_, key| {
            Err(SetupError::Cache {
                operation: "save",
                key: key.to_owned(),
                reason: "disk full".to_owned(),
            })
        });

    let outcome = run_post(&state_file, Some(&cache)).expect("save failures are not fatal");
    assert_eq!(
        outcome,
        PostOutcome::SaveAttempted {
            key: "macports-2.11.5-arm64-15-abc-def".to_owned()
        }
    );
}
