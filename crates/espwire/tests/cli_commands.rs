#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

fn espwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_espwire"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("espwire should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn demo_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/drive.txt")
}

#[test]
fn version_prints_package_version() {
    let output = espwire(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("espwire {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn decode_message_delivery_as_json() {
    let output = espwire(&[
        "--format",
        "json",
        "decode",
        "AA D6 EA 02 08 56 34 2E 31 30 33 35 F5 AB",
        "--link",
        "message",
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("\"event\":\"packet\""));
    assert!(out.contains("\"kind_name\":\"RESPVERSION\""));
    assert!(out.contains("V4.1035"));
}

#[test]
fn decode_stream_bytes_split_across_arguments() {
    let output = espwire(&[
        "--format",
        "json",
        "decode",
        "7F 0E AA D6 EA 02 08 56",
        "34 2E 31 30 33 35 F5 AB A3 7F",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).lines().count(), 1);
}

#[test]
fn decode_bad_checksum_returns_60() {
    let output = espwire(&[
        "decode",
        "AA D6 EA 02 08 56 34 2E 31 30 33 35 00 AB",
        "--link",
        "message",
    ]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn decode_invalid_hex_returns_60() {
    let output = espwire(&["decode", "not hex"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn encode_version_request_for_stream_link() {
    let output = espwire(&["--format", "pretty", "encode", "REQVERSION"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "7F 07 AA DA E6 01 01 6C AB 8A 7F");
}

#[test]
fn encode_for_legacy_addresses_general_broadcast() {
    let output = espwire(&[
        "--format",
        "pretty",
        "encode",
        "0x01",
        "--link",
        "message",
        "--personality",
        "legacy",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "AA D8 E6 01 00 AB");
}

#[test]
fn encode_unknown_kind_returns_64() {
    let output = espwire(&["encode", "REQTELEPORT"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn replay_prints_notifications_and_display_data() {
    let demo = demo_file();
    let output = espwire(&[
        "--format",
        "json",
        "replay",
        demo.to_str().expect("utf-8 path"),
        "--no-repeat",
        "--interval",
        "1",
        "--count",
        "3",
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        r#"{"event":"notification","data":"Detector powered on"}"#
    );
    assert!(lines[1].starts_with(r#"{"event":"display""#));
}

#[test]
fn replay_reports_the_alert_table() {
    let demo = demo_file();
    let output = espwire(&[
        "--format",
        "json",
        "replay",
        demo.to_str().expect("utf-8 path"),
        "--no-repeat",
        "--interval",
        "1",
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains(r#""event":"alerts""#));
    assert!(out.contains(r#""frequency":34700"#));
    assert!(out.contains(r#"{"event":"alerts","data":[]}"#));
}

#[test]
fn replay_missing_file_returns_1() {
    let output = espwire(&["replay", "/nonexistent/espwire-demo.txt", "--no-repeat"]);
    assert_eq!(output.status.code(), Some(1));
}
