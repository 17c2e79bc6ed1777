//! Runtime configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid configuration and a file
//! only needs the values it overrides.
//!
//! ```toml
//! [lock]
//! wait_timeout_ms = 10000
//!
//! [addressable]
//! scenes = [1001]
//! retry_count = 5
//! ```

use crate::address::SceneId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub lock: LockConfig,
    pub rpc: RpcConfig,
    pub addressable: AddressableConfig,
    pub roaming: RoamingConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Default wait timeout of every scene lock.
    pub wait_timeout_ms: u64,
    /// Slot count of the flow locks handed out by `Scene::new_flow_lock`.
    pub flow_slots: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 30_000,
            flow_slots: 8,
        }
    }
}

impl LockConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub call_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { call_timeout_ms: 30_000 }
    }
}

impl RpcConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressableConfig {
    /// Scenes hosting the directory. A key lives on `scenes[key mod len]`.
    pub scenes: Vec<SceneId>,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AddressableConfig {
    fn default() -> Self {
        Self {
            scenes: Vec::new(),
            retry_count: 20,
            retry_backoff_ms: 500,
        }
    }
}

impl AddressableConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoamingConfig {
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RoamingConfig {
    fn default() -> Self {
        Self {
            retry_count: 20,
            retry_backoff_ms: 100,
        }
    }
}

impl RoamingConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.lock.wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.rpc.call_timeout_ms, 30_000);
        assert_eq!(config.addressable.retry_count, 20);
        assert_eq!(config.addressable.retry_backoff_ms, 500);
        assert_eq!(config.roaming.retry_backoff_ms, 100);
    }

    #[test]
    fn overrides_keep_other_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [addressable]
            scenes = [1001, 2003]
            retry_count = 3

            [rpc]
            call_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.addressable.scenes, vec![SceneId::new(1, 1), SceneId::new(2, 3)]);
        assert_eq!(config.addressable.retry_count, 3);
        assert_eq!(config.addressable.retry_backoff_ms, 500);
        assert_eq!(config.rpc.call_timeout(), Duration::from_millis(250));
        assert_eq!(config.roaming, RoamingConfig::default());
    }

    #[test]
    fn invalid_scene_id_is_rejected() {
        let err = RuntimeConfig::from_toml_str("[addressable]\nscenes = [999999]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RuntimeConfig::load("/nonexistent/scene-router.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scene-router.toml"));
    }
}
