//! End-to-end CLI tests for the bundle-downloader binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Command isolated from any user config file.
fn bundle_downloader(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bundle-downloader").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_without_locations_returns_zero() {
    let config_home = TempDir::new().unwrap();
    bundle_downloader(&config_home).assert().success();
}

#[test]
fn test_binary_help_displays_usage() {
    let config_home = TempDir::new().unwrap();
    bundle_downloader(&config_home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download asset bundles"));
}

#[test]
fn test_binary_version_displays_version() {
    let config_home = TempDir::new().unwrap();
    bundle_downloader(&config_home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle-downloader"));
}

#[test]
fn test_binary_rejects_zero_concurrency() {
    let config_home = TempDir::new().unwrap();
    bundle_downloader(&config_home)
        .args(["-c", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_copies_local_bundle_to_output_dir() {
    let config_home = TempDir::new().unwrap();
    let source_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let bundle = source_dir.path().join("ui.bundle");
    std::fs::write(&bundle, b"local bundle").unwrap();

    bundle_downloader(&config_home)
        .arg(bundle.to_str().unwrap())
        .arg("-o")
        .arg(output_dir.path())
        .assert()
        .success();

    let written = std::fs::read(output_dir.path().join("ui.bundle")).unwrap();
    assert_eq!(written, b"local bundle");
}

#[test]
fn test_binary_invalid_path_exits_with_failure() {
    let config_home = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    bundle_downloader(&config_home)
        .arg("definitely/not/a/bundle")
        .arg("-o")
        .arg(output_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid path in bundle provider"));
}

#[test]
fn test_binary_reports_invalid_config_file() {
    let config_home = TempDir::new().unwrap();
    let config_dir = config_home.path().join("bundle-downloader");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "concurrency = 0\n").unwrap();

    bundle_downloader(&config_home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config.toml"));
}

#[test]
fn test_binary_gives_each_duplicate_location_its_own_manual_retry() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let Some(server) = runtime.block_on(start_mock_server_or_skip()) else {
        return;
    };
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/ui.bundle"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server),
    );

    let config_home = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let url = format!("{}/ui.bundle", server.uri());
    bundle_downloader(&config_home)
        .args(["-r", "0", "--retry-on-failure", "-o"])
        .arg(output_dir.path())
        .args([&url, &url])
        .assert()
        .failure();

    // One automatic attempt plus one manual retry for each session.
    runtime.block_on(server.verify());
}
