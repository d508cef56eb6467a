//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

mod common;
mod control_channel;

use std::process::{Command, Stdio};

use common::{get_agent_bin, stub_config, write_config};

#[test]
fn missing_config_is_a_startup_error() {
    let output = Command::new(get_agent_bin())
        .args(["service", "--config", "/nonexistent/linkshift_agent.toml"])
        .env("LINKSHIFT_INTEGRATION_TEST", "1")
        .stdout(Stdio::null())
        .output()
        .expect("failed to run agent");
    assert!(!output.status.success(), "agent must refuse to start");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"), "stderr: {stderr}");
}

#[test]
fn invalid_config_is_a_startup_error() {
    let path = write_config(
        "unknown_destination",
        r#"
        [node]
        id = 3
        destination = 9

        [server]
        url = "ws://127.0.0.1:1/ws"
        "#,
    );
    let output = Command::new(get_agent_bin())
        .args(["service", "--config", path.to_str().unwrap()])
        .env("LINKSHIFT_INTEGRATION_TEST", "1")
        .output()
        .expect("failed to run agent");
    assert!(!output.status.success(), "agent must refuse to start");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("destination 9"), "stderr: {stderr}");
}

#[test]
fn probe_reports_interfaces_and_radio() {
    let config = format!("{}\n[scan]\nsettle_ms = 10\n", stub_config(1, "true"));
    let path = write_config("probe", &config);
    let output = Command::new(get_agent_bin())
        .args(["probe", "--config", path.to_str().unwrap()])
        .env("LINKSHIFT_INTEGRATION_TEST", "1")
        .output()
        .expect("failed to run agent");
    assert!(output.status.success(), "probe failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("node        3"), "stdout: {stdout}");
    assert!(stdout.contains("lo          127.0.0.1"), "stdout: {stdout}");
    assert!(stdout.contains("linkshift-none0 -"), "stdout: {stdout}");
    assert!(stdout.contains("radio       unassociated"), "stdout: {stdout}");
    assert!(stdout.contains("scan        0 entries"), "stdout: {stdout}");
}

#[test]
fn version_flag_reports_package_version() {
    let output = Command::new(get_agent_bin())
        .arg("--version")
        .output()
        .expect("failed to run agent");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "stdout: {stdout}");
}
