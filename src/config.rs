//! Run configuration.
//!
//! Configuration comes from two disjoint places:
//! - [`PersistedConfig`] lives in `<state_dir>/regress.toml` and is rewritten
//!   at the start of every run (after any `--set-*` flags are applied).
//! - [`SessionOverrides`] come from the command line and only affect the
//!   current run.
//!
//! [`RunConfig::merge`] combines the two. It is pure: no I/O, no globals.
//!
//! # Store format
//!
//! ```toml
//! recursions = 3
//! max_fails = 1
//! order_file = "order.csv"
//! jenkins_file = ""
//! ```
//!
//! Unknown keys are ignored when reading and dropped on the next write.

use crate::catalog::{TestId, TestPattern};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the state directory created inside the test directory.
pub const STATE_DIR_NAME: &str = ".regress";
/// Name of the persisted config store inside the state directory.
pub const CONFIG_FILE_NAME: &str = "regress.toml";
/// Name of the fails file inside the state directory.
pub const FAILS_FILE_NAME: &str = "fails.csv";

/// Settings that survive between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    /// Number of reruns used to classify a failure in dev mode
    #[serde(default = "default_recursions")]
    pub recursions: u32,
    /// Real failures tolerated before the session aborts
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
    /// Order file path; empty means "no order file"
    #[serde(default)]
    pub order_file: String,
    /// JUnit XML report path; empty means "no report"
    #[serde(default)]
    pub jenkins_file: String,
}

fn default_recursions() -> u32 {
    3
}

fn default_max_fails() -> u32 {
    1
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            recursions: default_recursions(),
            max_fails: default_max_fails(),
            order_file: String::new(),
            jenkins_file: String::new(),
        }
    }
}

impl PersistedConfig {
    /// Parse the store from a TOML string.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the store, or defaults if it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Rewrite the store with exactly the recognized keys.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `--set-*` flags, producing the values to write back.
    pub fn with_updates(&self, updates: &PersistedUpdates) -> Self {
        Self {
            recursions: updates.recursions.unwrap_or(self.recursions),
            max_fails: updates.max_fails.unwrap_or(self.max_fails),
            order_file: updates
                .order_file
                .clone()
                .unwrap_or_else(|| self.order_file.clone()),
            jenkins_file: updates
                .jenkins_file
                .clone()
                .unwrap_or_else(|| self.jenkins_file.clone()),
        }
    }
}

/// Values from `--set-*` flags. Written back to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedUpdates {
    pub recursions: Option<u32>,
    pub max_fails: Option<u32>,
    pub order_file: Option<String>,
    pub jenkins_file: Option<String>,
}

/// Per-invocation settings. Never written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOverrides {
    pub dev_mode: bool,
    pub keep_logs: bool,
    pub time_individual: bool,
    pub stop_on_first_fail: bool,
    pub exclude_fails: bool,
    pub generate_order_file: bool,
    pub include_tests: Vec<TestPattern>,
    pub exclude_tests: Vec<TestPattern>,
    pub begin_from_test: Option<TestId>,
    pub results_file: Option<PathBuf>,
    pub recursions: Option<u32>,
    pub max_fails: Option<u32>,
    pub order_file: Option<String>,
    pub jenkins_file: Option<String>,
    /// Program used to launch each test, e.g. `expect`
    pub interpreter: Option<String>,
}

impl Default for SessionOverrides {
    fn default() -> Self {
        Self {
            dev_mode: true,
            keep_logs: false,
            time_individual: false,
            stop_on_first_fail: false,
            exclude_fails: false,
            generate_order_file: false,
            include_tests: Vec::new(),
            exclude_tests: Vec::new(),
            begin_from_test: None,
            results_file: None,
            recursions: None,
            max_fails: None,
            order_file: None,
            jenkins_file: None,
            interpreter: None,
        }
    }
}

/// Filesystem layout of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub test_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl RunPaths {
    /// Default layout: state in `<test_dir>/.regress`, logs in `<state_dir>/logs`.
    pub fn new(test_dir: PathBuf, state_dir: Option<PathBuf>, log_dir: Option<PathBuf>) -> Self {
        let state_dir = state_dir.unwrap_or_else(|| test_dir.join(STATE_DIR_NAME));
        let log_dir = log_dir.unwrap_or_else(|| state_dir.join("logs"));
        Self {
            test_dir,
            state_dir,
            log_dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE_NAME)
    }

    pub fn fails_file(&self) -> PathBuf {
        self.state_dir.join(FAILS_FILE_NAME)
    }

    /// Resolve a configured path; relative paths are taken from the test dir.
    /// Empty strings mean "not configured".
    pub fn resolve(&self, configured: &str) -> Option<PathBuf> {
        if configured.trim().is_empty() {
            return None;
        }
        let path = PathBuf::from(configured);
        if path.is_absolute() {
            Some(path)
        } else {
            Some(self.test_dir.join(path))
        }
    }
}

/// Effective configuration of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub paths: RunPaths,
    pub recursions: u32,
    pub max_fails: u32,
    pub order_file: Option<PathBuf>,
    pub jenkins_file: Option<PathBuf>,
    pub dev_mode: bool,
    pub keep_logs: bool,
    pub time_individual: bool,
    pub stop_on_first_fail: bool,
    pub exclude_fails: bool,
    pub generate_order_file: bool,
    pub include_tests: Vec<TestPattern>,
    pub exclude_tests: Vec<TestPattern>,
    pub begin_from_test: Option<TestId>,
    pub results_file: Option<PathBuf>,
    pub interpreter: Option<String>,
}

impl RunConfig {
    /// Merge the persisted store with this invocation's overrides.
    ///
    /// Session values win. `max_fails` is never below 1.
    pub fn merge(persisted: &PersistedConfig, overrides: &SessionOverrides, paths: RunPaths) -> Self {
        let order_file = overrides
            .order_file
            .as_deref()
            .unwrap_or(&persisted.order_file);
        let jenkins_file = overrides
            .jenkins_file
            .as_deref()
            .unwrap_or(&persisted.jenkins_file);

        Self {
            recursions: overrides.recursions.unwrap_or(persisted.recursions),
            max_fails: overrides.max_fails.unwrap_or(persisted.max_fails).max(1),
            order_file: paths.resolve(order_file),
            jenkins_file: paths.resolve(jenkins_file),
            dev_mode: overrides.dev_mode,
            keep_logs: overrides.keep_logs,
            time_individual: overrides.time_individual,
            stop_on_first_fail: overrides.stop_on_first_fail,
            exclude_fails: overrides.exclude_fails,
            generate_order_file: overrides.generate_order_file,
            include_tests: overrides.include_tests.clone(),
            exclude_tests: overrides.exclude_tests.clone(),
            begin_from_test: overrides.begin_from_test,
            results_file: overrides.results_file.clone(),
            interpreter: overrides.interpreter.clone(),
            paths,
        }
    }

    /// Log file of a test's primary run.
    pub fn log_path(&self, id: TestId) -> PathBuf {
        self.paths.log_dir.join(id.log_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths() -> RunPaths {
        RunPaths::new(PathBuf::from("/suite"), None, None)
    }

    #[test]
    fn test_defaults() {
        let config = PersistedConfig::default();
        assert_eq!(config.recursions, 3);
        assert_eq!(config.max_fails, 1);
        assert!(config.order_file.is_empty());
        assert!(config.jenkins_file.is_empty());
    }

    #[test]
    fn test_parse_ignores_unknown_keys_and_fills_defaults() {
        let content = r#"
max_fails = 4
order_file = "order.csv"
mail_to = "someone@example.com"
"#;
        let config = PersistedConfig::parse(content, Path::new("regress.toml")).unwrap();
        assert_eq!(config.max_fails, 4);
        assert_eq!(config.recursions, 3);
        assert_eq!(config.order_file, "order.csv");
    }

    #[test]
    fn test_parse_invalid_is_error() {
        let result = PersistedConfig::parse("max_fails = \"many\"", Path::new("regress.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_save_and_load_roundtrip_drops_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "recursions = 5\nextra = true\n").unwrap();

        let loaded = PersistedConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.recursions, 5);
        loaded.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("extra"));
        assert!(content.contains("recursions = 5"));
        assert!(content.contains("max_fails = 1"));
        assert!(content.contains("order_file"));
        assert!(content.contains("jenkins_file"));
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempdir().unwrap();
        let config = PersistedConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, PersistedConfig::default());
    }

    #[test]
    fn test_updates_apply_only_given_values() {
        let base = PersistedConfig {
            order_file: "old.csv".into(),
            ..Default::default()
        };
        let updated = base.with_updates(&PersistedUpdates {
            max_fails: Some(7),
            ..Default::default()
        });
        assert_eq!(updated.max_fails, 7);
        assert_eq!(updated.order_file, "old.csv");
        assert_eq!(updated.recursions, 3);
    }

    #[test]
    fn test_merge_session_overrides_win() {
        let persisted = PersistedConfig {
            recursions: 2,
            max_fails: 5,
            order_file: "order.csv".into(),
            jenkins_file: String::new(),
        };
        let overrides = SessionOverrides {
            max_fails: Some(1),
            jenkins_file: Some("/reports/junit.xml".into()),
            ..Default::default()
        };
        let config = RunConfig::merge(&persisted, &overrides, paths());
        assert_eq!(config.recursions, 2);
        assert_eq!(config.max_fails, 1);
        assert_eq!(config.order_file, Some(PathBuf::from("/suite/order.csv")));
        assert_eq!(config.jenkins_file, Some(PathBuf::from("/reports/junit.xml")));
        assert!(config.dev_mode);
    }

    #[test]
    fn test_merge_does_not_touch_persisted() {
        let persisted = PersistedConfig::default();
        let overrides = SessionOverrides {
            max_fails: Some(9),
            ..Default::default()
        };
        let _ = RunConfig::merge(&persisted, &overrides, paths());
        assert_eq!(persisted.max_fails, 1);
    }

    #[test]
    fn test_merge_clamps_max_fails() {
        let overrides = SessionOverrides {
            max_fails: Some(0),
            ..Default::default()
        };
        let config = RunConfig::merge(&PersistedConfig::default(), &overrides, paths());
        assert_eq!(config.max_fails, 1);
    }

    #[test]
    fn test_empty_paths_are_unset() {
        let config = RunConfig::merge(
            &PersistedConfig::default(),
            &SessionOverrides::default(),
            paths(),
        );
        assert_eq!(config.order_file, None);
        assert_eq!(config.jenkins_file, None);
    }

    #[test]
    fn test_run_paths_layout() {
        let paths = paths();
        assert_eq!(paths.state_dir, PathBuf::from("/suite/.regress"));
        assert_eq!(paths.log_dir, PathBuf::from("/suite/.regress/logs"));
        assert_eq!(paths.config_file(), PathBuf::from("/suite/.regress/regress.toml"));
        assert_eq!(paths.fails_file(), PathBuf::from("/suite/.regress/fails.csv"));
    }

    #[test]
    fn test_log_path() {
        let config = RunConfig::merge(
            &PersistedConfig::default(),
            &SessionOverrides::default(),
            paths(),
        );
        assert_eq!(
            config.log_path(TestId::new(4, 2)),
            PathBuf::from("/suite/.regress/logs/test4.2.log")
        );
    }
}
