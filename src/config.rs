//! # Panel Configuration
//!
//! Startup defaults for the control panel, stored as TOML in the user's config
//! directory (`<config_dir>/mqtt-panel/config.toml`).
//!
//! The file only seeds the page. Whatever the operator types into the broker
//! fields lives for the current run and is never written back.
//!
//! Missing files are created with defaults on first start; missing keys fall
//! back to their defaults so older files keep loading.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mqtt::config::{BrokerConfig, MqttConfig};
use crate::session::controller::SessionSettings;
use crate::session::event_log::DEFAULT_LOG_CAPACITY;
use crate::session::session_worker::DEFAULT_REFRESH;

const CONFIG_DIR: &str = "mqtt-panel";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of log entries kept before the oldest is dropped
    pub log_capacity: usize,
    /// Inbound events buffered between the delivery loop and the session
    pub event_capacity: usize,
    /// How often the session drains inbound events, in milliseconds
    pub refresh_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_capacity: 100,
            refresh_ms: DEFAULT_REFRESH.as_millis() as u64,
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            log_capacity: self.log_capacity,
            event_capacity: self.event_capacity,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    /// Values pre-filled into the broker sidebar
    pub broker: BrokerConfig,
    /// Client options not exposed on the page
    pub mqtt: MqttConfig,
    pub session: SessionConfig,
}

impl PanelConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("No config directory found, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Writes a default config file if none exists at `path`.
    pub async fn ensure_default(path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            debug!("Config file found at {}", path.display());
            return Ok(());
        }

        info!("Creating default config at {}", path.display());
        PanelConfig::default().save(path).await
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Ensures the file exists and loads it. A broken file is reported and
    /// replaced by defaults for this run.
    pub async fn load_or_default(path: &Path) -> Self {
        if let Err(e) = Self::ensure_default(path).await {
            warn!("Could not create default config: {}", e);
            return Self::default();
        }
        match Self::load(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        PanelConfig::ensure_default(&path).await.unwrap();
        let loaded = PanelConfig::load(&path).await.unwrap();

        assert_eq!(loaded, PanelConfig::default());
    }

    #[tokio::test]
    async fn existing_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut custom = PanelConfig::default();
        custom.broker.host = "10.0.0.5".to_string();
        custom.save(&path).await.unwrap();

        PanelConfig::ensure_default(&path).await.unwrap();

        let loaded = PanelConfig::load(&path).await.unwrap();
        assert_eq!(loaded.broker.host, "10.0.0.5");
    }

    #[tokio::test]
    async fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[broker]\nport = 1884\n\n[mqtt]\nqos = 0\n")
            .await
            .unwrap();

        let loaded = PanelConfig::load(&path).await.unwrap();

        assert_eq!(loaded.broker.port, 1884);
        assert_eq!(loaded.broker.sensor_topic, "Sensores");
        assert_eq!(loaded.mqtt.qos, 0);
        assert_eq!(loaded.mqtt.client_id, "mqtt-control-panel");
        assert_eq!(loaded.session, SessionConfig::default());
    }

    #[tokio::test]
    async fn broken_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "broker = [").await.unwrap();

        assert!(PanelConfig::load(&path).await.is_err());
        assert_eq!(
            PanelConfig::load_or_default(&path).await,
            PanelConfig::default()
        );
    }
}
