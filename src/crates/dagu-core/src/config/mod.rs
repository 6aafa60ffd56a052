//! Runtime configuration (§6): where persisted state lives under
//! `$DAGU_HOME`, and settings loaded from its `config.yaml`, overlaid with
//! environment variables.

mod error;

pub use error::{ConfigError, Result};

use dagu_support::config::get_env_or;
use dagu_tooling::config::ConfigBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filesystem layout under `$DAGU_HOME`. Each directory can be relocated by
/// its own environment variable, independent of `DAGU_HOME`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub dags_dir: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
    pub suspend_dir: PathBuf,
    pub queue_dir: PathBuf,
    pub socket_dir: PathBuf,
}

impl Paths {
    pub fn from_env() -> Self {
        let home = PathBuf::from(get_env_or("DAGU_HOME", &default_home()));
        Self {
            dags_dir: env_path_or("DAGU_DAGS", &home, "dags"),
            log_dir: env_path_or("DAGU_LOG_DIR", &home, "logs"),
            data_dir: env_path_or("DAGU_DATA_DIR", &home, "data"),
            suspend_dir: env_path_or("DAGU_SUSPEND_FLAGS_DIR", &home, "suspend"),
            queue_dir: env_path_or("DAGU_QUEUE_DIR", &home, "queue"),
            socket_dir: home.join("proc"),
            home,
        }
    }

    pub fn base_config_path(&self) -> PathBuf {
        self.home.join("config.yaml")
    }

    /// Creates every directory this layout names, if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.dags_dir,
            &self.log_dir,
            &self.data_dir,
            &self.suspend_dir,
            &self.queue_dir,
            &self.socket_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn default_home() -> String {
    std::env::var("HOME")
        .map(|h| format!("{h}/.dagu"))
        .unwrap_or_else(|_| "/var/lib/dagu".to_string())
}

fn env_path_or(key: &str, home: &Path, default_subdir: &str) -> PathBuf {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => home.join(default_subdir),
    }
}

/// Home-wide defaults read from `config.yaml`. Anything a DAG file sets
/// itself takes precedence over these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default, rename = "defaultShell")]
    pub default_shell: Option<String>,

    #[serde(default, rename = "histRetentionDays")]
    pub hist_retention_days: Option<u32>,
}

impl ConfigBuilder for BaseConfig {
    fn from_env(_prefix: &str) -> dagu_tooling::Result<Self> {
        Ok(Self {
            timezone: std::env::var("DAGU_TZ").ok(),
            default_shell: std::env::var("SHELL").ok(),
            hist_retention_days: None,
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        if other.timezone.is_some() {
            self.timezone = other.timezone;
        }
        if other.default_shell.is_some() {
            self.default_shell = other.default_shell;
        }
        if other.hist_retention_days.is_some() {
            self.hist_retention_days = other.hist_retention_days;
        }
        self
    }
}

/// Loads `config.yaml` if it exists, then lets `DAGU_TZ`/`SHELL` override
/// whatever it set — environment always wins over the file.
pub fn load_base_config(paths: &Paths) -> Result<BaseConfig> {
    let path = paths.base_config_path();
    let mut config: BaseConfig = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&content)?
    } else {
        BaseConfig::default()
    };

    let env_overrides =
        BaseConfig::from_env("DAGU_").map_err(|e| ConfigError::Env(e.to_string()))?;
    config.merge(env_overrides);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(dir: &Path) -> Paths {
        Paths {
            home: dir.to_path_buf(),
            dags_dir: dir.join("dags"),
            log_dir: dir.join("logs"),
            data_dir: dir.join("data"),
            suspend_dir: dir.join("suspend"),
            queue_dir: dir.join("queue"),
            socket_dir: dir.join("proc"),
        }
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var("DAGU_TZ");
        let config = load_base_config(&paths(dir.path())).unwrap();
        assert_eq!(config.timezone, None);
    }

    #[test]
    fn file_values_are_overridden_by_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "timezone: America/New_York\ndefaultShell: /bin/bash\n",
        )
        .unwrap();

        std::env::set_var("DAGU_TZ", "UTC");
        let config = load_base_config(&paths(dir.path())).unwrap();
        std::env::remove_var("DAGU_TZ");

        assert_eq!(config.timezone, Some("UTC".to_string()));
        assert_eq!(config.default_shell, Some("/bin/bash".to_string()));
    }

    #[test]
    fn ensure_dirs_creates_the_full_layout() {
        let dir = tempfile::tempdir().unwrap();
        let p = paths(dir.path());
        p.ensure_dirs().unwrap();
        assert!(p.dags_dir.is_dir());
        assert!(p.queue_dir.is_dir());
        assert!(p.socket_dir.is_dir());
    }
}
