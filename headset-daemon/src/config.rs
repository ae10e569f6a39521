use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::channel::HEADSET_CHANNEL;

#[derive(Debug, Deserialize, Serialize)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub channel: String,
    pub platform: PlatformConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlatformConfig {
    pub backend: Backend,
    pub fixture_path: Option<String>,
    #[serde(default = "default_bus_timeout_ms")]
    pub bus_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Fixture,
    Bluez,
}

fn default_bus_timeout_ms() -> u64 {
    2000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/headsetd/headsetd.sock".to_string(),
            channel: HEADSET_CHANNEL.to_string(),
            platform: PlatformConfig {
                backend: Backend::Bluez,
                fixture_path: None,
                bus_timeout_ms: default_bus_timeout_ms(),
            },
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).with_context(|| format!("parsing config {}", path))
            }
            Err(_) => {
                // Create default config if not found
                let config = Self::default();
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::warn!("Could not write default config to {}: {}", path, e);
                }
                Ok(config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headsetd.toml");
        let path = path.to_str().unwrap();

        let config = DaemonConfig::load(path).unwrap();
        assert_eq!(config.channel, HEADSET_CHANNEL);
        assert_eq!(config.platform.backend, Backend::Bluez);

        let written = fs::read_to_string(path).unwrap();
        assert!(written.contains("socket_path"));
        let reloaded = DaemonConfig::load(path).unwrap();
        assert_eq!(reloaded.socket_path, config.socket_path);
    }

    #[test]
    fn parses_fixture_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headsetd.toml");
        fs::write(
            &path,
            r#"
socket_path = "/tmp/headsetd.sock"
channel = "test/headset"

[platform]
backend = "fixture"
fixture_path = "fixtures/a2dp-buds.toml"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.channel, "test/headset");
        assert_eq!(config.platform.backend, Backend::Fixture);
        assert_eq!(
            config.platform.fixture_path.as_deref(),
            Some("fixtures/a2dp-buds.toml")
        );
        assert_eq!(config.platform.bus_timeout_ms, 2000);
    }

    #[test]
    fn rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headsetd.toml");
        fs::write(
            &path,
            "socket_path = \"/tmp/s\"\nchannel = \"c\"\n[platform]\nbackend = \"pulse\"\n",
        )
        .unwrap();
        assert!(DaemonConfig::load(path.to_str().unwrap()).is_err());
    }
}
