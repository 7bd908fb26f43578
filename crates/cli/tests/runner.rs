// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn repo_file(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(rel)
}

fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("periphsim-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.join(format!("{}-{}.{}", prefix, nonce, ext))
}

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let path = temp_path(prefix, "yaml");
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn periphsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_periphsim"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn run_script(script: &PathBuf, extra: &[&str]) -> Output {
    let soc = repo_file("configs/soc/rv32-soc.yaml");
    let mut args = vec![
        "run",
        "--soc",
        soc.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    periphsim(&args)
}

#[test]
fn test_cli_help() {
    let output = periphsim(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PeriphSim"));
}

#[test]
fn test_bundled_scripts_pass() {
    for name in [
        "gpio_interrupt",
        "spi_transfer",
        "spi_gated_transfer",
        "flash_read",
    ] {
        let script = repo_file(&format!("configs/scripts/{}.yaml", name));
        let output = run_script(&script, &[]);
        assert_eq!(
            output.status.code(),
            Some(0),
            "{} failed:\n{}",
            name,
            String::from_utf8_lossy(&output.stdout)
        );
    }
}

#[test]
fn test_failed_expectation_exit_1_and_result_json() {
    let script = write_temp_file(
        "spi-wrong",
        r#"
schema_version: "1.0"
peripheral: spi0
limits:
  max_ticks: 4
steps:
  - at: 0
    write: { offset: 0x10, value: 0x05 }
  - at: 1
    read: { offset: 0x10, expect: 0x06 }
"#,
    );
    let out_dir = temp_path("spi-wrong-out", "d");
    let output = run_script(&script, &["--output-dir", out_dir.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));

    let text = std::fs::read_to_string(out_dir.join("result.json")).unwrap();
    let result: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(result["status"], "fail");
    assert_eq!(result["peripheral"], "spi0");
    assert_eq!(result["checks"][0]["actual"], 5);
    assert_eq!(result["checks"][0]["passed"], false);
}

#[test]
fn test_unknown_pin_is_config_error() {
    let script = write_temp_file(
        "gpio-bad-pin",
        r#"
schema_version: "1.0"
peripheral: gpio0
limits:
  max_ticks: 2
steps:
  - at: 0
    drive: { pin: miso, value: 1 }
"#,
    );
    let output = run_script(&script, &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unsorted_script_is_config_error() {
    let script = write_temp_file(
        "unsorted",
        r#"
schema_version: "1.0"
peripheral: uart0
limits:
  max_ticks: 10
steps:
  - at: 5
    reset: null
  - at: 2
    reset: null
"#,
    );
    let output = run_script(&script, &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_soc_is_config_error() {
    let script = repo_file("configs/scripts/spi_transfer.yaml");
    let output = periphsim(&[
        "run",
        "--soc",
        "does-not-exist.yaml",
        "--script",
        script.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_uart_script_with_vcd() {
    let script = write_temp_file(
        "uart-tx",
        r#"
schema_version: "1.0"
peripheral: uart0
limits:
  max_ticks: 40
steps:
  - at: 0
    write: { offset: 0x00, value: 0x55 }
  - at: 1
    write: { offset: 0x04, value: 0x02 }
  - at: 1
    expect_pin: { pin: tx, value: 1 }
  - at: 3
    expect_pin: { pin: tx, value: 0 }
  - at: 3
    expect_pin: { pin: tx_busy, value: 1 }
  - at: 4
    read: { offset: 0x04, expect: 0x01 }
"#,
    );
    let vcd = temp_path("uart-tx", "vcd");
    let output = run_script(&script, &["--vcd", vcd.to_str().unwrap()]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "{}",
        String::from_utf8_lossy(&output.stdout)
    );

    let dump = std::fs::read_to_string(&vcd).unwrap();
    assert!(dump.contains("$enddefinitions"));
    assert!(dump.contains("uart0"));
    assert!(dump.contains("tx"));
}

#[test]
fn test_check_lists_windows() {
    let soc = repo_file("configs/soc/rv32-soc.yaml");
    let output = periphsim(&["check", "--soc", soc.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0x40002000"));
    assert!(stdout.contains("RX_DATA"));
    assert!(stdout.contains("pin-level only"));
}

#[test]
fn test_check_rejects_overlap() {
    let soc = write_temp_file(
        "overlap",
        r#"
schema_version: "1.0"
name: "bad"
peripherals:
  - id: a
    base_address: 0x40000000
    kind: { type: spi }
  - id: b
    base_address: 0x40000800
    kind: { type: spi }
"#,
    );
    let output = periphsim(&["check", "--soc", soc.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}
