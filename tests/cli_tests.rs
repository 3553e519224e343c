// Integration tests for the blockprof binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn blockprof() -> Command {
    let mut cmd = Command::cargo_bin("blockprof").unwrap();
    cmd.env_remove("BLOCKPROF_CONFIG")
        .env_remove("BLOCKPROF_OUTPUT_DIR")
        .env_remove("BLOCKPROF_CORRECTION_MODE");
    cmd
}

#[test]
fn test_calibrate_text_output() {
    blockprof()
        .args(["calibrate", "--samples", "10000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Calibration samples:      10000"))
        .stdout(
            predicate::str::is_match(r"Mean clock read cost: +\d+ ticks \(\d+\.\d{10} secs\)")
                .unwrap(),
        )
        .stdout(predicate::str::contains("Loop iteration cost").not());
}

#[test]
fn test_calibrate_suspect_mode_reports_loop_cost() {
    blockprof()
        .args(["calibrate", "-n", "10000", "--mode", "suspect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loop iteration cost:"))
        .stdout(predicate::str::contains("Clock read cost:"));
}

#[test]
fn test_calibrate_json_output() {
    let output = blockprof()
        .args(["calibrate", "--samples", "10000", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["samples"], 10000);
    assert_eq!(json["mode"], "per-sample");
    assert!(json["counter_mean"].as_i64().unwrap() >= 0);
    assert!(json["ncounter_largest"].as_u64().unwrap() <= 10000);
}

#[test]
fn test_calibrate_rejects_zero_samples() {
    blockprof()
        .args(["calibrate", "--samples", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("calibration_samples"));
}

#[test]
fn test_unknown_mode_rejected() {
    blockprof()
        .args(["calibrate", "--mode", "bogus"])
        .assert()
        .failure();
}

#[test]
fn test_validate_writes_report() {
    let dir = TempDir::new().unwrap();
    let expected = dir.path().join("profile.txt");

    blockprof()
        .args(["validate", "-i", "200", "-n", "10000", "-o"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));

    let text = std::fs::read_to_string(&expected).unwrap();
    assert!(text.contains("# The total number of blocks is 12."));
    assert!(text.contains("profile-3-3-1-3-3-0"));
    assert!(text.contains("# End of profile."));
    assert!(!text.contains("# Summary for block"));
}

#[test]
fn test_validate_verbose_includes_summaries() {
    let dir = TempDir::new().unwrap();

    blockprof()
        .args(["validate", "-i", "10", "-n", "10000", "--verbose", "-o"])
        .arg(dir.path())
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("profile.txt")).unwrap();
    assert!(text.contains("# Summary for block main, invocation 1."));
    assert!(text.contains("Is called 10 time(s) from main, invocation 1."));
    assert!(text.contains("No children were found."));
}

#[test]
fn test_validate_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("reports");
    std::fs::create_dir(&out).unwrap();
    let config = dir.path().join("blockprof.toml");
    std::fs::write(
        &config,
        format!(
            "output_dir = {:?}\ncalibration_samples = 5000\ncorrection_mode = \"suspect\"\n",
            out.display().to_string()
        ),
    )
    .unwrap();

    blockprof()
        .arg("--config")
        .arg(&config)
        .args(["validate", "-i", "5"])
        .assert()
        .success();

    let text = std::fs::read_to_string(out.join("profile.txt")).unwrap();
    assert!(text.contains("5000 samples of the intrinsic profile overhead"));
    assert!(text.contains("# Blocks whose self time is within the estimated profile error."));
}

#[test]
fn test_missing_config_file_fails() {
    blockprof()
        .args(["--config", "/nonexistent/blockprof.toml", "calibrate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_output_dir_from_environment() {
    let dir = TempDir::new().unwrap();

    blockprof()
        .env("BLOCKPROF_OUTPUT_DIR", dir.path())
        .args(["validate", "-i", "1", "-n", "1000"])
        .assert()
        .success();

    assert!(dir.path().join("profile.txt").exists());
}

#[test]
fn test_debug_flag_emits_tracing() {
    let dir = TempDir::new().unwrap();

    blockprof()
        .args(["--debug", "validate", "-i", "1", "-n", "1000", "-o"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("profiling session started"));
}
