//! CLI tests for ssm-core.
//!
//! These tests drive the binary end to end: help output, the
//! `sample | fit` round trip, and exit codes for bad input.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Get a Command for the ssm-core binary with a clean config environment.
fn ssm_core(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ssm-core").expect("ssm-core binary should exist");
    cmd.env_remove("SSM_CONFIG")
        .env("SSM_CONFIG_DIR", config_dir)
        .env("XDG_CONFIG_HOME", config_dir)
        .env("SSM_LOG", "off");
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

const POISSON_MODEL: &str = r#"{
    "initial_probs": [0.5, 0.5],
    "transition_matrix": [[0.95, 0.05], [0.05, 0.95]],
    "emission": {"family": "poisson", "rates": [[1.0], [9.0]]}
}"#;

const POISSON_START: &str = r#"{
    "initial_probs": [0.5, 0.5],
    "transition_matrix": [[0.8, 0.2], [0.2, 0.8]],
    "emission": {"family": "poisson", "rates": [[2.0], [4.0]]}
}"#;

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ============================================================================
// Help and version
// ============================================================================

mod help {
    use super::*;

    #[test]
    fn help_lists_commands() {
        let dir = TempDir::new().unwrap();
        ssm_core(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fit"))
            .stdout(predicate::str::contains("smooth"))
            .stdout(predicate::str::contains("sample"))
            .stdout(predicate::str::contains("filter"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn version_flag_works() {
        let dir = TempDir::new().unwrap();
        ssm_core(dir.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ssm-core"));
    }

    #[test]
    fn version_command_is_json() {
        let dir = TempDir::new().unwrap();
        let output = ssm_core(dir.path()).arg("version").output().unwrap();
        assert!(output.status.success());
        let json = stdout_json(&output);
        assert_eq!(json["ssm_core_version"], env!("CARGO_PKG_VERSION"));
    }
}

// ============================================================================
// Round trips
// ============================================================================

mod round_trip {
    use super::*;

    #[test]
    fn sample_then_fit_recovers_rates() {
        let dir = TempDir::new().unwrap();
        let truth = write(&dir, "truth.json", POISSON_MODEL);
        let start = write(&dir, "start.json", POISSON_START);

        let sampled = ssm_core(dir.path())
            .args(["sample", "--num-timesteps", "500", "--num-sequences", "4"])
            .args(["--seed", "7", "--model"])
            .arg(&truth)
            .output()
            .unwrap();
        assert!(sampled.status.success());
        let sample_json = stdout_json(&sampled);
        assert_eq!(sample_json["seed"], 7);
        assert_eq!(sample_json["sequences"].as_array().unwrap().len(), 4);
        let data = dir.path().join("data.json");
        std::fs::write(&data, &sampled.stdout).unwrap();

        let fitted = ssm_core(dir.path())
            .args(["fit", "--max-iters", "200", "--model"])
            .arg(&start)
            .arg("--data")
            .arg(&data)
            .output()
            .unwrap();
        assert!(fitted.status.success());
        let report = stdout_json(&fitted);
        assert_eq!(report["family"], "poisson");
        assert_eq!(report["config"]["config_source"], "builtin default");
        assert!(report["run_id"].as_str().unwrap().starts_with("run-"));

        let mut rates: Vec<f64> = report["model"]["emission"]["rates"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row[0].as_f64().unwrap())
            .collect();
        rates.sort_by(f64::total_cmp);
        assert!((rates[0] - 1.0).abs() < 0.1, "rates {:?}", rates);
        assert!((rates[1] - 9.0).abs() < 0.45, "rates {:?}", rates);
    }

    #[test]
    fn same_seed_same_sample() {
        let dir = TempDir::new().unwrap();
        let truth = write(&dir, "truth.json", POISSON_MODEL);
        let run = || {
            ssm_core(dir.path())
                .args(["sample", "--num-timesteps", "20", "--seed", "42", "--model"])
                .arg(&truth)
                .output()
                .unwrap()
                .stdout
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn smooth_reports_posteriors() {
        let dir = TempDir::new().unwrap();
        let model = write(&dir, "model.json", POISSON_MODEL);
        let data = write(&dir, "data.json", r#"{"sequences": [[[0], [1], [10], [8], [9]]]}"#);

        let output = ssm_core(dir.path())
            .args(["smooth", "--model"])
            .arg(&model)
            .arg("--data")
            .arg(&data)
            .output()
            .unwrap();
        assert!(output.status.success());
        let json = stdout_json(&output);
        let seq = &json["sequences"][0];
        assert_eq!(seq["most_likely_states"], serde_json::json!([0, 0, 1, 1, 1]));
        assert_eq!(seq["smoothed_probs"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn filter_moment_form_reports_loglik() {
        let dir = TempDir::new().unwrap();
        let input = write(
            &dir,
            "filter.json",
            r#"{
                "params": {
                    "form": "moment",
                    "initial_mean": [0.0],
                    "initial_covariance": [[1.0]],
                    "dynamics_matrix": [[1.0]],
                    "dynamics_covariance": [[0.1]],
                    "emission_matrix": [[1.0]],
                    "emission_covariance": [[1.0]]
                },
                "emissions": [[2.0], [1.5], [1.8]]
            }"#,
        );
        let output = ssm_core(dir.path())
            .args(["filter", "--input"])
            .arg(&input)
            .output()
            .unwrap();
        assert!(output.status.success());
        let json = stdout_json(&output);
        assert_eq!(json["form"], "moment");
        assert!(json["marginal_loglik"].as_f64().unwrap().is_finite());
        let first = json["filtered_means"][0][0].as_f64().unwrap();
        assert!((first - 1.0).abs() < 1e-9);
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_uses_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let output = ssm_core(dir.path()).args(["config", "show"]).output().unwrap();
        assert!(output.status.success());
        let json = stdout_json(&output);
        assert_eq!(json["config"]["em"]["num_iterations"], 50);
        assert_eq!(json["snapshot"]["config_source"], "builtin default");
    }

    #[test]
    fn validate_accepts_good_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "good.json", r#"{"em": {"num_iterations": 10}}"#);
        ssm_core(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("valid"));
    }

    #[test]
    fn validate_rejects_bad_value() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.json", r#"{"em": {"convergence_tolerance": -1.0}}"#);
        ssm_core(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("ERR_CONFIG"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        ssm_core(dir.path())
            .args(["config", "show", "--config", "/nonexistent/fit.json"])
            .assert()
            .code(11);
    }
}

// ============================================================================
// Error exit codes
// ============================================================================

mod errors {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        let dir = TempDir::new().unwrap();
        ssm_core(dir.path())
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn invalid_model_is_model_error() {
        let dir = TempDir::new().unwrap();
        let model = write(
            &dir,
            "model.json",
            r#"{
                "initial_probs": [0.5, 0.5],
                "transition_matrix": [[0.5, 0.6], [0.5, 0.5]],
                "emission": {"family": "poisson", "rates": [[1.0], [2.0]]}
            }"#,
        );
        ssm_core(dir.path())
            .args(["sample", "--model"])
            .arg(&model)
            .assert()
            .code(12)
            .stderr(predicate::str::contains("ERR_MODEL"));
    }

    #[test]
    fn wrong_emission_width_is_data_error() {
        let dir = TempDir::new().unwrap();
        let model = write(&dir, "model.json", POISSON_MODEL);
        let data = write(&dir, "data.json", r#"{"sequences": [[[1, 2], [3, 4]]]}"#);
        ssm_core(dir.path())
            .args(["smooth", "--model"])
            .arg(&model)
            .arg("--data")
            .arg(&data)
            .assert()
            .code(13);
    }

    #[test]
    fn empty_batch_is_data_error() {
        let dir = TempDir::new().unwrap();
        let model = write(&dir, "model.json", POISSON_MODEL);
        let data = write(&dir, "data.json", r#"{"sequences": []}"#);
        ssm_core(dir.path())
            .args(["fit", "--model"])
            .arg(&model)
            .arg("--data")
            .arg(&data)
            .assert()
            .code(13);
    }

    #[test]
    fn missing_model_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        ssm_core(dir.path())
            .args(["sample", "--model", "/nonexistent/model.json"])
            .assert()
            .code(21);
    }

    #[test]
    fn zero_timesteps_is_args_error() {
        let dir = TempDir::new().unwrap();
        let model = write(&dir, "model.json", POISSON_MODEL);
        ssm_core(dir.path())
            .args(["sample", "--num-timesteps", "0", "--model"])
            .arg(&model)
            .assert()
            .code(10);
    }

    #[test]
    fn singular_covariance_is_numerical_error() {
        let dir = TempDir::new().unwrap();
        let input = write(
            &dir,
            "filter.json",
            r#"{
                "params": {
                    "form": "info",
                    "initial_mean": [0.0],
                    "initial_precision": [[1.0]],
                    "dynamics_matrix": [[1.0]],
                    "dynamics_precision": [[-10.0]],
                    "emission_matrix": [[1.0]],
                    "emission_precision": [[1.0]]
                },
                "emissions": [[1.0], [1.0], [1.0]]
            }"#,
        );
        ssm_core(dir.path())
            .args(["filter", "--input"])
            .arg(&input)
            .assert()
            .code(22)
            .stderr(predicate::str::contains("ERR_NUMERICAL"));
    }
}
