use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use assert_cmd::Command;
use tempfile::tempdir;

// Config with profiles and logs kept inside the temp dir
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[robot]
model = "so-100"
serial_id = "cli-test"

[control]
step_size = 5.0
debounce_ms = 30

[calibration]
dir = "{}"
{extra}
"#,
        dir.join("calibration").display().to_string().replace('\\', "/")
    );
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn soarm(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("soarm").unwrap();
    cmd.arg("--config").arg(cfg).env_remove("RUST_LOG");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["ports", "--help"], 0, "--all", "stdout")]
#[case(&["state", "--port", "sim"], 0, "shoulder_pan", "stdout")]
#[case(&["move", "--port", "sim", "--joint", "1", "--degrees", "-30"], 0, "shoulder_lift", "stdout")]
#[case(&["move", "--port", "sim", "--joint", "0", "--degrees", "400"], 7, "outside the calibrated range", "stderr")]
#[case(&["voltage", "--port", "sim"], 0, "Supply 6.0 V", "stdout")]
#[case(&["check-motor", "--port", "sim"], 0, "Several motors", "stdout")]
#[case(&["--sim", "single", "check-motor", "--port", "sim"], 0, "Motor id 1", "stdout")]
#[case(&["--sim", "empty", "check-motor", "--port", "sim"], 5, "No servo answered", "stderr")]
#[case(&["--sim", "single", "setup-motor", "--port", "sim", "--id", "4"], 0, "Motor 1 -> 4", "stdout")]
#[case(&["setup-motor", "--port", "sim", "--id", "4", "--baudrate", "9600"], 5, "not supported", "stderr")]
#[case(&["--sim", "single", "reset-motor", "--port", "sim", "--current", "1", "--new", "3"], 0, "now id 3", "stdout")]
#[case(&["move", "--port", "sim", "--joint", "1"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    let mut cmd = soarm(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn demo_calibration_persists_ranges_for_next_run() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    soarm(&cfg)
        .args(["calibrate", "--port", "sim", "--demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Step 1/3"))
        .stdout(predicate::str::contains("Calibration completed"));

    let saved: Vec<_> = fs::read_dir(dir.path().join("calibration"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(saved.len(), 1);

    // the sweep covered +-45 degrees on every joint
    soarm(&cfg)
        .args(["state", "--port", "sim"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[-45.0, 45.0]"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    let out = soarm(&cfg)
        .args(["--json", "--sim", "empty", "check-motor", "--port", "sim"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("\"reason\""))
        .expect("error line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "NoMotor");
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}

#[test]
fn json_state_is_one_object_per_line() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    let out = soarm(&cfg)
        .args(["--json", "state", "--port", "sim"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(v["event"], "state");
    assert_eq!(v["connected"], true);
    assert_eq!(v["joints"].as_array().unwrap().len(), 6);
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "[polling]\nstate_hz = 0\n");

    soarm(&cfg)
        .args(["state", "--port", "sim"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("polling.state_hz"));
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("soarm").unwrap();
    cmd.current_dir(dir.path())
        .args(["--config", "nope.toml", "voltage", "--port", "sim"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Supply"));
}

#[test]
fn teleop_reads_keys_from_stdin() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");

    soarm(&cfg)
        .args(["teleop", "--port", "sim"])
        .write_stdin("i\nspace\nk\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("shoulder_pan +5.0"))
        .stdout(predicate::str::contains("emergency stop ON"))
        .stdout(predicate::str::contains("ignored: emergency stop active"));
}

#[test]
fn two_pose_without_motion_is_refused() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = dir.path().join("ticks.json");

    soarm(&cfg)
        .args(["two-pose", "--port", "sim", "--out"])
        .arg(&out)
        .write_stdin("\n\n")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("same position in both poses"));
    assert!(!out.exists());
}

#[test]
fn legacy_profile_import_is_stored() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let legacy = dir.path().join("legacy.json");
    fs::write(
        &legacy,
        r#"{
            "servos_offsets": [2048, 2048, 2048, 2048, 2048, 2048],
            "servos_calibration_position": [3072, 1024, 1024, 3072, 3072, 3072],
            "servos_offsets_signs": [1, -1, 1, -1, 1, 1],
            "servos_voltage": 12.0
        }"#,
    )
    .unwrap();

    soarm(&cfg)
        .arg("import-legacy")
        .arg(&legacy)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported profile saved"));
    assert!(dir.path().join("calibration").read_dir().unwrap().next().is_some());
}

#[test]
fn log_file_receives_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("soarm.log");
    let extra = format!(
        "[logging]\nfile = \"{}\"\nrotation = \"never\"\n",
        log.display().to_string().replace('\\', "/")
    );
    let cfg = write_config(dir.path(), &extra);

    soarm(&cfg).args(["state", "--port", "sim"]).assert().success();

    let text = fs::read_to_string(&log).unwrap();
    let first = text.lines().next().expect("log line");
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("level").is_some());
}
