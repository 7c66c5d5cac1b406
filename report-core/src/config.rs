//! # Configuration Module
//!
//! Handles loading `report.toml` and merging `REPORT_*` environment variables into it.
//!
//! ## Configuration Loading Flow (block diagram)
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | REPORT_CONFIG env | --> | Path resolution   | --> | report.toml file  |
//! | (optional)        |     | or default ./     |     | (optional)        |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | Environment vars  | --> | REPORT_* keys     | --> | Config struct     |
//! | REPORT_KEY=value  |     | override the file |     | launch/log/...    |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Config File Location
//!
//! 1. If `REPORT_CONFIG` environment variable is set, load from that path
//! 2. Otherwise, load from `report.toml` in the current directory
//!
//! A missing `report.toml` is not an error: every key has a default.
//!
//! ## Configuration Structure
//!
//! ```toml
//! [launch]
//! name = "Regression"
//! project = "default"
//! endpoint = "http://localhost:8080"
//! token = "secret"
//! attributes = ["nightly"]
//!
//! [log]
//! level = "info"
//! capture = false
//!
//! [hierarchy]
//! ancestor_search = "first-branch"
//! ```
//!
//! ## Environment Variables
//!
//! | Variable           | Key                 |
//! |--------------------|---------------------|
//! | `REPORT_ENDPOINT`  | `launch.endpoint`   |
//! | `REPORT_PROJECT`   | `launch.project`    |
//! | `REPORT_TOKEN`     | `launch.token`      |
//! | `REPORT_LAUNCH`    | `launch.name`       |
//! | `REPORT_LOG_LEVEL` | `log.level`         |
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use toml::Value as TomlValue;
use tracing::*;

use crate::{
    hierarchy::AncestorSearch,
    launch::{LaunchInfo, Level},
    Error, Result,
};

/// Environment variable name for specifying the config file path.
pub const REPORT_CONFIG_ENV: &str = "REPORT_CONFIG";

/// Replacement for secrets when the configuration is displayed.
pub const MASK: &str = "*****";

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let _ = dotenv::dotenv();
    Config::load().unwrap_or_else(|e| {
        error!("falling back to the default configuration: {e}");
        Config::default()
    })
});

/// Process-wide configuration, loaded on first use.
pub fn get_config() -> &'static Config {
    &CONFIG
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub launch: LaunchConfig,
    pub log: LogConfig,
    pub hierarchy: HierarchyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Launch name shown by the reporting backend.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project: String,
    /// Base URL of the reporting backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub attributes: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            name: "report".to_string(),
            description: None,
            project: "default".to_string(),
            endpoint: None,
            token: None,
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level forwarded by `log`.
    pub level: Level,
    /// Install a tracing subscriber for the crate's own diagnostics.
    pub capture: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    pub ancestor_search: AncestorSearch,
}

impl Config {
    /// Load configuration from `path` and the environment. A missing file yields the
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(buf) => {
                let cfg: Config = toml::from_str(&buf).map_err(|e| {
                    Error::LoadError(format!(
                        "failed to deserialize {} into report::Config: {e}",
                        path.display()
                    ))
                })?;
                debug!("{} was successfully loaded: {cfg:#?}", path.display());
                cfg
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
                Config::default()
            }
            Err(e) => return Err(Error::LoadError(e.to_string())),
        };

        cfg.load_env()?;
        Ok(cfg)
    }

    /// Load configuration.
    ///
    /// Loading order:
    /// 1. If `REPORT_CONFIG` env var is set, load from that path
    /// 2. Otherwise, load from `report.toml` in the current directory
    pub fn load() -> Result<Config> {
        match std::env::var(REPORT_CONFIG_ENV) {
            Ok(path) => {
                if !looks_like_path(&path) {
                    return Err(Error::LoadError(format!(
                        "{REPORT_CONFIG_ENV} should be a path to a config file, not a config \
                         value. Got: {path:?}. Use REPORT_<KEY>=value for config values instead."
                    )));
                }

                let path = Path::new(&path);
                if !path.exists() {
                    return Err(Error::LoadError(format!(
                        "Config file specified by {REPORT_CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {REPORT_CONFIG_ENV}={path:?}");
                Config::load_from(path)
            }
            Err(_) => Config::load_from(Path::new("report.toml")),
        }
    }

    fn load_env(&mut self) -> Result<()> {
        debug!("Loading configuration from env");
        self.apply_env(std::env::vars())
    }

    /// Apply `REPORT_*` variables on top of this configuration.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix("REPORT_") else {
                continue;
            };
            match name {
                "ENDPOINT" => self.launch.endpoint = Some(value),
                "PROJECT" => self.launch.project = value,
                "TOKEN" => self.launch.token = Some(value),
                "LAUNCH" => self.launch.name = value,
                "LOG_LEVEL" => {
                    self.log.level = value.parse().map_err(|_| {
                        Error::LoadError(format!("REPORT_LOG_LEVEL has unknown level {value:?}"))
                    })?;
                }
                "CONFIG" => {
                    if !looks_like_path(&value) {
                        error!(
                            "{REPORT_CONFIG_ENV} is reserved for specifying the config file \
                             path, not a config value. Got: {REPORT_CONFIG_ENV}={value:?}"
                        );
                    }
                }
                _ => trace!("ignoring unknown variable {key}"),
            }
        }
        Ok(())
    }

    pub fn launch_info(&self) -> LaunchInfo {
        LaunchInfo {
            name: self.launch.name.clone(),
            description: self.launch.description.clone(),
            project: self.launch.project.clone(),
            attributes: self.launch.attributes.clone(),
        }
    }

    /// Copy of this configuration that is safe to display.
    pub fn masked(&self) -> Config {
        let mut cfg = self.clone();
        if cfg.launch.token.is_some() {
            cfg.launch.token = Some(MASK.to_string());
        }
        cfg
    }

    /// Value of a dotted key such as `launch.project`.
    pub fn get(&self, key: &str) -> Result<TomlValue> {
        let not_found = || Error::ValueNotFound(key.to_string());
        let root = TomlValue::try_from(self).map_err(|e| Error::LoadError(e.to_string()))?;
        key.split('.')
            .try_fold(&root, |value, part| value.get(part))
            .cloned()
            .ok_or_else(not_found)
    }

    pub fn get_str(&self, key: &str) -> Result<String> {
        Ok(match self.get(key)? {
            TomlValue::String(s) => s,
            other => other.to_string(),
        })
    }
}

fn looks_like_path(value: &str) -> bool {
    Path::new(value)
        .extension()
        .is_some_and(|ext| ext == "toml")
        || value.contains(std::path::MAIN_SEPARATOR)
        || value.contains('/')
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn sample_path() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../report-sample.toml")
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    #[serial_test::serial]
    fn load_sample_config() -> eyre::Result<()> {
        let cfg = Config::load_from(&sample_path())?;
        assert_eq!(cfg.launch.name, "Regression");
        assert_eq!(cfg.launch.project, "default");
        assert_eq!(cfg.launch.attributes, vec!["nightly"]);
        assert_eq!(cfg.log.level, Level::Info);
        assert!(!cfg.log.capture);
        assert_eq!(cfg.hierarchy.ancestor_search, AncestorSearch::FirstBranch);
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn missing_file_yields_defaults() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = Config::load_from(&dir.path().join("report.toml"))?;
        assert_eq!(cfg.launch.name, "report");
        assert_eq!(cfg.launch.project, "default");
        assert_eq!(cfg.hierarchy, HierarchyConfig::default());
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn malformed_file_is_a_load_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.toml");
        std::fs::write(&path, "[log]\nlevel = \"loud\"\n")?;
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::LoadError(_)), "unexpected error: {err}");
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> eyre::Result<()> {
        let cfg: Config = toml::from_str("[hierarchy]\nancestor_search = \"exhaustive\"\n")?;
        assert_eq!(cfg.hierarchy.ancestor_search, AncestorSearch::Exhaustive);
        assert_eq!(cfg.launch, LaunchConfig::default());
        Ok(())
    }

    #[test]
    fn env_overrides_file_values() -> eyre::Result<()> {
        let mut cfg = Config::default();
        cfg.apply_env(vars(&[
            ("REPORT_ENDPOINT", "http://rp:8080"),
            ("REPORT_PROJECT", "shop"),
            ("REPORT_TOKEN", "secret"),
            ("REPORT_LAUNCH", "Smoke"),
            ("REPORT_LOG_LEVEL", "WARN"),
            ("REPORT_UNKNOWN", "ignored"),
            ("PATH", "/usr/bin"),
        ]))?;

        assert_eq!(cfg.launch.endpoint.as_deref(), Some("http://rp:8080"));
        assert_eq!(cfg.launch.project, "shop");
        assert_eq!(cfg.launch.token.as_deref(), Some("secret"));
        assert_eq!(cfg.launch.name, "Smoke");
        assert_eq!(cfg.log.level, Level::Warn);
        Ok(())
    }

    #[test]
    fn unknown_env_level_is_rejected() {
        let err = Config::default()
            .apply_env(vars(&[("REPORT_LOG_LEVEL", "loud")]))
            .unwrap_err();
        assert!(matches!(err, Error::LoadError(_)));
    }

    #[test]
    fn masked_hides_the_token() {
        let mut cfg = Config::default();
        assert_eq!(cfg.masked().launch.token, None);
        cfg.launch.token = Some("secret".into());
        assert_eq!(cfg.masked().launch.token.as_deref(), Some(MASK));
        assert_eq!(cfg.launch.token.as_deref(), Some("secret"));
    }

    #[test_case("launch.project" => "default"; "string")]
    #[test_case("log.level" => "info"; "level")]
    #[test_case("log.capture" => "false"; "bool")]
    #[test_case("hierarchy.ancestor_search" => "first-branch"; "search mode")]
    fn get_dotted_key(key: &str) -> String {
        Config::default().get_str(key).unwrap()
    }

    #[test_case("launch.endpoint"; "unset option")]
    #[test_case("launch.nope"; "unknown key")]
    #[test_case("log.level.more"; "past a leaf")]
    fn get_missing_key(key: &str) {
        let err = Config::default().get(key).unwrap_err();
        assert_eq!(err, Error::ValueNotFound(key.to_string()));
    }

    #[test]
    fn launch_info_mirrors_launch_section() {
        let mut cfg = Config::default();
        cfg.launch.description = Some("nightly".into());
        let info = cfg.launch_info();
        assert_eq!(info.name, "report");
        assert_eq!(info.description.as_deref(), Some("nightly"));
    }

    mod report_config_env {
        use super::{sample_path, Config, REPORT_CONFIG_ENV};
        use pretty_assertions::assert_eq;
        use serial_test::serial;
        use test_case::test_case;

        #[test]
        #[serial]
        fn load_from_report_config_env() {
            std::env::set_var(REPORT_CONFIG_ENV, sample_path().to_str().unwrap());
            let cfg = Config::load().unwrap();
            std::env::remove_var(REPORT_CONFIG_ENV);

            assert_eq!(cfg.launch.name, "Regression");
        }

        #[test]
        #[serial]
        fn error_when_file_not_found() {
            std::env::set_var(REPORT_CONFIG_ENV, "/nonexistent/path/report.toml");
            let result = Config::load();
            std::env::remove_var(REPORT_CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(err.contains("not found"), "error should mention file not found: {err}");
        }

        #[test_case("true"; "boolean value")]
        #[test_case("123"; "numeric value")]
        #[test_case("some_value"; "string value")]
        #[serial]
        fn error_when_value_looks_like_config_value(value: &str) {
            std::env::set_var(REPORT_CONFIG_ENV, value);
            let result = Config::load();
            std::env::remove_var(REPORT_CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(
                err.contains("should be a path"),
                "error should guide user: {err}"
            );
        }

        #[test_case("config.toml"; "toml extension")]
        #[test_case("./report.toml"; "relative path with dot")]
        #[test_case("configs/report.toml"; "path with separator")]
        #[serial]
        fn accepts_valid_path_patterns(value: &str) {
            std::env::set_var(REPORT_CONFIG_ENV, value);
            let result = Config::load();
            std::env::remove_var(REPORT_CONFIG_ENV);

            let err = result.unwrap_err().to_string();
            assert!(
                err.contains("not found"),
                "valid path pattern should fail with 'not found': {err}"
            );
        }
    }
}
