//! Configuration file management for the rebroadcast relay.
//!
//! Reads/writes `~/.basestation-relay/config.toml` with the BaseStation feed
//! to read, the per-sink queue depth, and the list of rebroadcast sinks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::enums::RebroadcastFormat;
use crate::types::{BaseStationError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messages queued per sink before new ones are dropped.
    pub queue_depth: usize,
    pub source: SourceConfig,
    pub sinks: Vec<SinkConfig>,
}

/// Where BaseStation lines are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub address: String,
    pub reconnect_secs: u64,
}

/// One rebroadcast server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub name: String,
    /// Address to accept clients on, e.g. `0.0.0.0:33001`.
    pub listen: String,
    pub format: RebroadcastFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_depth: 256,
            source: SourceConfig::default(),
            sinks: vec![
                SinkConfig {
                    name: "basestation".into(),
                    listen: "0.0.0.0:33003".into(),
                    format: RebroadcastFormat::Port30003,
                },
                SinkConfig {
                    name: "compressed".into(),
                    listen: "0.0.0.0:33004".into(),
                    format: RebroadcastFormat::CompressedVrs,
                },
            ],
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            address: "127.0.0.1:30003".into(),
            reconnect_secs: 5,
        }
    }
}

impl Config {
    /// Check the settings a relay cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(BaseStationError::Config("queue_depth must be at least 1".into()));
        }
        let mut names = HashSet::new();
        for sink in &self.sinks {
            if sink.name.is_empty() {
                return Err(BaseStationError::Config("sink name must not be empty".into()));
            }
            if !names.insert(sink.name.as_str()) {
                return Err(BaseStationError::Config(format!(
                    "duplicate sink name \"{}\"",
                    sink.name
                )));
            }
        }
        Ok(())
    }
}

/// Get the config directory path (`~/.basestation-relay/`).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".basestation-relay")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load config from `~/.basestation-relay/config.toml`.
///
/// Returns default config if the file doesn't exist or can't be parsed.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }
    load_config_from(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable config, using defaults");
        Config::default()
    })
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Save config to `~/.basestation-relay/config.toml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| BaseStationError::Config(e.to_string()))?;

    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let text = serialize_config(config)?;
    std::fs::write(path, text).map_err(|e| BaseStationError::Config(e.to_string()))
}

/// Parse TOML config text. Missing keys take their default values.
pub fn parse_config(text: &str) -> Result<Config> {
    toml::from_str(text).map_err(|e| BaseStationError::Config(e.to_string()))
}

/// Serialize config to TOML text.
pub fn serialize_config(config: &Config) -> Result<String> {
    let body = toml::to_string_pretty(config).map_err(|e| BaseStationError::Config(e.to_string()))?;
    Ok(format!("# basestation-relay configuration\n\n{body}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.queue_depth, 256);
        assert_eq!(config.source.address, "127.0.0.1:30003");
        assert_eq!(config.sinks.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
queue_depth = 64

[source]
address = "192.168.1.20:30003"
reconnect_secs = 10

[[sinks]]
name = "avr"
listen = "0.0.0.0:30002"
format = "Avr"

[[sinks]]
name = "vrs"
listen = "0.0.0.0:33004"
format = "CompressedVRS"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.source.address, "192.168.1.20:30003");
        assert_eq!(config.source.reconnect_secs, 10);
        assert_eq!(config.sinks[0].format, RebroadcastFormat::Avr);
        assert_eq!(config.sinks[1].format, RebroadcastFormat::CompressedVrs);
        assert_eq!(config.sinks[1].listen, "0.0.0.0:33004");
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let config = parse_config("[source]\naddress = \"feed:30003\"\n").unwrap();
        assert_eq!(config.source.address, "feed:30003");
        assert_eq!(config.source.reconnect_secs, 5);
        assert_eq!(config.queue_depth, 256);
    }

    #[test]
    fn test_unknown_format_is_kept() {
        let text = r#"
[[sinks]]
name = "x"
listen = "0.0.0.0:1"
format = "Sbs3"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.sinks[0].format, RebroadcastFormat::Unknown("Sbs3".into()));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_config("queue_depth = \"lots\""),
            Err(BaseStationError::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.sinks[1].name = config.sinks[0].name.clone();
        assert!(config.validate().is_err());

        let config = Config {
            queue_depth: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip() {
        let config = Config {
            queue_depth: 32,
            source: SourceConfig {
                address: "10.0.0.1:30003".into(),
                reconnect_secs: 1,
            },
            sinks: vec![SinkConfig {
                name: "pass".into(),
                listen: "127.0.0.1:30100".into(),
                format: RebroadcastFormat::Passthrough,
            }],
        };
        let text = serialize_config(&config).unwrap();
        assert!(text.contains("format = \"Passthrough\""));
        assert_eq!(parse_config(&text).unwrap(), config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
        assert!(matches!(
            load_config_from(&dir.path().join("missing.toml")),
            Err(BaseStationError::Io(_))
        ));
    }
}
