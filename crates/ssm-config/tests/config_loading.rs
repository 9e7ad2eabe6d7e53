//! Fit configuration loading, validation, and resolution tests against
//! real files on disk.

use ssm_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use ssm_config::{load_fit_config, validate_fit_config, FitConfig, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let mut saved = Vec::with_capacity(keys.len());
        for key in keys {
            saved.push(env::var(key).ok());
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn write_config(path: &Path, json: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config parent");
    }
    fs::write(path, json).expect("write config");
}

const CUSTOM: &str = r#"{
  "schema_version": "1.0.0",
  "description": "short runs",
  "em": { "num_iterations": 7, "parallel": false },
  "priors": { "bernoulli": { "alpha": 2.0, "beta": 2.0 } }
}"#;

#[test]
fn partial_config_fills_defaults() {
    let config = FitConfig::from_str(CUSTOM).expect("parse");
    assert_eq!(config.em.num_iterations, 7);
    assert!(!config.em.parallel);
    assert_eq!(config.em.convergence_tolerance, 1e-10);
    assert_eq!(config.priors.bernoulli.alpha, 2.0);
    assert_eq!(config.priors.poisson.shape, 1.1);
    assert!(validate_fit_config(&config).is_ok());
}

#[test]
fn empty_object_is_default_config() {
    let config = FitConfig::from_str("{}").expect("parse");
    assert_eq!(config, FitConfig::default());
}

#[test]
fn malformed_json_is_parse_error() {
    let err = FitConfig::from_str("{ not json").unwrap_err();
    assert!(matches!(err, ValidationError::ParseError(_)));
    assert_eq!(err.code(), 61);
}

#[test]
fn invalid_field_reports_field_name() {
    let config = FitConfig::from_str(r#"{ "priors": { "transition_concentration": 0.2 } }"#)
        .expect("parse");
    match validate_fit_config(&config) {
        Err(ValidationError::InvalidValue { field, .. }) => {
            assert_eq!(field, "priors.transition_concentration")
        }
        other => panic!("expected InvalidValue, got {:?}", other),
    }
}

#[test]
fn cli_path_wins_over_env() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let dir = TempDir::new().expect("tempdir");
        let cli = dir.path().join("cli.json");
        let from_env = dir.path().join("env.json");
        write_config(&cli, "{}");
        write_config(&from_env, "{}");
        env::set_var(ENV_CONFIG_PATH, &from_env);

        let paths = resolve_config(Some(&cli));
        assert_eq!(paths.fit.as_deref(), Some(cli.as_path()));
        assert_eq!(paths.fit_source, ConfigSource::CliArgument);
    });
}

#[test]
fn env_path_then_env_dir() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let dir = TempDir::new().expect("tempdir");
        let config_dir = dir.path().join("conf");
        let in_dir = config_dir.join("fit.json");
        write_config(&in_dir, CUSTOM);

        env::remove_var(ENV_CONFIG_PATH);
        env::set_var(ENV_CONFIG_DIR, &config_dir);
        let paths = resolve_config(None);
        assert_eq!(paths.fit.as_deref(), Some(in_dir.as_path()));
        assert_eq!(paths.fit_source, ConfigSource::Environment);

        let direct = dir.path().join("direct.json");
        write_config(&direct, "{}");
        env::set_var(ENV_CONFIG_PATH, &direct);
        let paths = resolve_config(None);
        assert_eq!(paths.fit.as_deref(), Some(direct.as_path()));
    });
}

#[test]
fn load_records_snapshot_provenance() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_CONFIG_DIR);
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("fit.json");
        write_config(&path, CUSTOM);

        let resolved = load_fit_config(Some(&path)).expect("load");
        assert_eq!(resolved.config.em.num_iterations, 7);

        let snapshot = resolved.snapshot();
        assert_eq!(snapshot.config_source, "CLI argument");
        assert_eq!(snapshot.summary.num_iterations, 7);
        assert!(snapshot.config_path.is_some());
        assert_eq!(snapshot.config_hash.len(), 64);
    });
}

#[test]
fn load_rejects_missing_explicit_path() {
    let dir = TempDir::new().expect("tempdir");
    let err = load_fit_config(Some(&dir.path().join("absent.json"))).unwrap_err();
    assert!(matches!(err, ValidationError::IoError(_)));
}

#[test]
fn load_rejects_semantically_invalid_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("fit.json");
    write_config(&path, r#"{ "em": { "num_iterations": 0 } }"#);
    let err = load_fit_config(Some(&path)).unwrap_err();
    assert_eq!(err.code(), 65);
}
