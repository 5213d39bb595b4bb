//! Exit status of the command line tools when they fail before reaching the bus
use std::process::{Command, Output};

use assertables::assert_contains;

/// An interface name which does not exist on any test machine
const MISSING_INTERFACE: &str = "sdoex-none0";

fn run(binary: &str, args: &[&str]) -> Output {
    Command::new(binary)
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_counter_missing_interface() {
    let output = run(
        env!("CARGO_BIN_EXE_sdo-counter"),
        &["-i", MISSING_INTERFACE, "-n", "5", "-e", "missing.eds"],
    );

    assert_eq!(Some(1), output.status.code());
    assert_contains!(stderr(&output), "Failed to connect to interface sdoex-none0");
}

#[test]
fn test_counter_invalid_config() {
    let output = run(
        env!("CARGO_BIN_EXE_sdo-counter"),
        &["-i", MISSING_INTERFACE, "-c", "/nonexistent/sdo-counter.toml"],
    );

    assert_eq!(Some(1), output.status.code());
    assert_contains!(stderr(&output), "Failed to read config file");
}

#[test]
fn test_counter_usage_error() {
    let output = run(env!("CARGO_BIN_EXE_sdo-counter"), &["-n", "0", "-e", "node.eds"]);

    assert_eq!(Some(2), output.status.code());
    assert_contains!(stderr(&output), "Invalid node ID 0");
}

#[test]
fn test_sim_missing_model() {
    let output = run(
        env!("CARGO_BIN_EXE_sdo-sim"),
        &["-i", MISSING_INTERFACE, "-n", "5", "-m", "/nonexistent/node.eds"],
    );

    assert_eq!(Some(1), output.status.code());
    assert_contains!(stderr(&output), "/nonexistent/node.eds");
}

#[test]
fn test_sim_missing_interface() {
    let model = concat!(env!("CARGO_MANIFEST_DIR"), "/../integration_tests/testdata/counter_node.eds");
    let output = run(
        env!("CARGO_BIN_EXE_sdo-sim"),
        &["-i", MISSING_INTERFACE, "-n", "5", "-m", model],
    );

    assert_eq!(Some(1), output.status.code());
    assert_contains!(stderr(&output), "sdoex-none0");
}
