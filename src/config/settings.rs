use super::{default_state_root, ConfigError};
use crate::migration::catalog::validate_step_list;
use crate::migration::{DriverOptions, RetryPolicy};
use crate::shared::ids::{ActorId, ProfileId};
use crate::shared::serde_ext::{deserialize_duration, serialize_duration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err("store must be one of: file, sqlite".to_string()),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Absolute root for run documents, the sqlite database, and logs.
    /// Defaults to `~/.sitelift`.
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Identity used when `SITELIFT_ACTOR` is unset.
    #[serde(default)]
    pub actor: Option<ActorId>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub profiles: BTreeMap<ProfileId, Vec<ProfileStepConfig>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileStepConfig {
    pub name: String,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub estimated_duration: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_root: None,
            store: StoreBackend::default(),
            time_scale: default_time_scale(),
            actor: None,
            persistence: PersistenceConfig::default(),
            driver: DriverConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(state_root) = &self.state_root {
            if !state_root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }

        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(ConfigError::Settings(format!(
                "`time_scale` must be a positive number, got {}",
                self.time_scale
            )));
        }

        if self.persistence.max_attempts == 0 {
            return Err(ConfigError::Settings(
                "`persistence.max_attempts` must be at least 1".to_string(),
            ));
        }
        if self.persistence.max_backoff_ms < self.persistence.initial_backoff_ms {
            return Err(ConfigError::Settings(
                "`persistence.max_backoff_ms` must be >= `persistence.initial_backoff_ms`"
                    .to_string(),
            ));
        }

        if self.driver.max_consecutive_failures == 0 {
            return Err(ConfigError::Settings(
                "`driver.max_consecutive_failures` must be at least 1".to_string(),
            ));
        }

        for (profile, steps) in &self.profiles {
            validate_step_list(
                steps
                    .iter()
                    .map(|step| (step.name.as_str(), step.estimated_duration)),
            )
            .map_err(|reason| ConfigError::Settings(format!("profile `{profile}`: {reason}")))?;
        }

        Ok(())
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_root {
            Some(path) => Ok(path.clone()),
            None => default_state_root(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.persistence.max_attempts,
            initial_backoff: Duration::from_millis(self.persistence.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.persistence.max_backoff_ms),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            time_scale: self.time_scale,
            max_consecutive_failures: self.driver.max_consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings: Settings = serde_yaml::from_str("{}").expect("parse empty settings");
        settings.validate().expect("defaults are valid");
        assert_eq!(settings.store, StoreBackend::File);
        assert_eq!(settings.time_scale, 1.0);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.driver_options(), DriverOptions::default());
    }

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!(StoreBackend::parse(" SQLite "), Ok(StoreBackend::Sqlite));
        assert!(StoreBackend::parse("postgres").is_err());
    }
}
