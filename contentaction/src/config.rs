//! src/config.rs
//! ============================================================================
//! # Config: Where Registries Live and How Hard to Wait
//!
//! Loaded from TOML at `$CONTENTACTION_CONFIG`, or `config.toml` in the
//! platform config directory resolved by
//! [`directories`](https://docs.rs/directories). A missing file is not an
//! error: every field has a default.
//!
//! ## Example
//! ```toml
//! registry_dirs = ["/usr/share/contentaction/actions"]
//! bus = "session"
//! call_timeout = "5s"
//! condition_timeout = "2s"
//!
//! [log]
//! log_level = "debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::Deserialize;
use tokio::fs as TokioFs;
use tracing::{debug, info};

use crate::dispatch::BusKind;
use crate::error::{ActionError, ActionResult};
use crate::logging::LoggerConfig;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "CONTENTACTION_CONFIG";

/// Colon separated registry directories, replacing `registry_dirs`.
pub const ACTIONS_ENV: &str = "CONTENTACTION_ACTIONS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Registry directories, read in order.
    pub registry_dirs: Vec<PathBuf>,

    /// Default action records file; platform data dir when unset.
    pub defaults_file: Option<PathBuf>,

    /// D-Bus `.service` directories used to find interface implementors.
    pub service_dirs: Vec<PathBuf>,

    pub bus: BusKind,

    /// Upper bound for delivering one trigger.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Upper bound for evaluating one semantic condition.
    #[serde(with = "humantime_serde")]
    pub condition_timeout: Duration,

    /// Command used to run condition queries; the query is appended.
    pub sparql_command: Option<Vec<String>>,

    pub log: LoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_dirs: xdg_data_dirs()
                .into_iter()
                .map(|d| d.join("contentaction").join("actions"))
                .collect(),
            defaults_file: None,
            service_dirs: xdg_data_dirs()
                .into_iter()
                .map(|d| d.join("dbus-1").join("services"))
                .collect(),
            bus: BusKind::Session,
            call_timeout: Duration::from_secs(5),
            condition_timeout: Duration::from_secs(2),
            sparql_command: None,
            log: LoggerConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_at(None).await
    }

    /// Load from `path`, or the default location when `None`, then apply
    /// environment overrides. An explicit path must exist.
    pub async fn load_at(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::read(path).await?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    async fn read(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            info!("Loading config from {}", path.display());
            return Self::load_from(path)
                .await
                .with_context(|| format!("loading {}", path.display()));
        }

        let path = Self::config_path()?;
        if path.exists() {
            info!("Loading config from {}", path.display());
            Ok(Self::load_from(&path).await?)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> ActionResult<Self> {
        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|source| ActionError::ConfigIo {
                path: path.to_path_buf(),
                source,
            })?;

        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ActionResult<()> {
        if self.call_timeout.is_zero() {
            return Err(ActionError::invalid_input("call_timeout", "must be greater than 0"));
        }
        if self.condition_timeout.is_zero() {
            return Err(ActionError::invalid_input(
                "condition_timeout",
                "must be greater than 0",
            ));
        }
        if let Some(command) = &self.sparql_command
            && command.is_empty()
        {
            return Err(ActionError::invalid_input("sparql_command", "must not be empty"));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var(ACTIONS_ENV) {
            self.registry_dirs = split_path_list(&value);
            debug!("Registry directories from {}: {:?}", ACTIONS_ENV, self.registry_dirs);
        }
    }

    /// `$CONTENTACTION_CONFIG`, or `config.toml` in the platform config dir.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        let proj_dirs = ProjectDirs::from("org", "contentaction", "contentaction")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

fn split_path_list(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// The user data dir followed by `$XDG_DATA_DIRS`.
pub fn xdg_data_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.data_dir().to_path_buf());
    }

    let system: String = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());

    for dir in split_path_list(&system) {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
registry_dirs = ["/opt/actions"]
bus = "system"
call_timeout = "750ms"

[log]
log_level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).await.unwrap();
        assert_eq!(config.registry_dirs, vec![PathBuf::from("/opt/actions")]);
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.call_timeout, Duration::from_millis(750));
        assert_eq!(config.condition_timeout, Duration::from_secs(2));
        assert_eq!(config.log.log_level, "debug");
    }

    #[tokio::test]
    async fn test_invalid_files_rejected() {
        let dir = TempDir::new().unwrap();

        let unknown = dir.path().join("unknown.toml");
        std::fs::write(&unknown, "theme = \"dark\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&unknown).await,
            Err(ActionError::Config(_))
        ));

        let zero = dir.path().join("zero.toml");
        std::fs::write(&zero, "call_timeout = \"0s\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&zero).await,
            Err(ActionError::InvalidInput { .. })
        ));

        assert!(matches!(
            Config::load_from(&dir.path().join("missing.toml")).await,
            Err(ActionError::ConfigIo { .. })
        ));
    }

    #[tokio::test]
    async fn test_actions_override_applies_to_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "registry_dirs = [\"/opt/actions\"]\n").unwrap();

        let mut config = Config::read(Some(&path)).await.unwrap();
        config.apply_overrides(|name| (name == ACTIONS_ENV).then(|| "/a:/b".to_string()));
        assert_eq!(
            config.registry_dirs,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );

        let mut untouched = Config::read(Some(&path)).await.unwrap();
        untouched.apply_overrides(|_| None);
        assert_eq!(untouched.registry_dirs, vec![PathBuf::from("/opt/actions")]);

        assert!(Config::read(Some(&dir.path().join("missing.toml"))).await.is_err());
    }

    #[test]
    fn test_path_list_parsing() {
        assert_eq!(
            split_path_list("/a::/b"),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(
            config
                .registry_dirs
                .iter()
                .all(|d| d.ends_with("contentaction/actions"))
        );
    }
}
