use serde::{Serialize, Deserialize};
use std::fs;
use std::path::Path;
use log::info;

mod committee;
mod rpc;

pub use committee::CommitteeConfig;
pub use rpc::RpcConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file: {0}")]
    Write(#[source] std::io::Error),
}

/// Main configuration for the RPC layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RPC client configuration
    pub rpc: RpcConfig,

    /// Committee client configuration
    pub committee: CommitteeConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config: Config = toml::from_str(&config_str)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str).map_err(ConfigError::Write)?;

        Ok(())
    }

    /// Generate a default configuration file if it doesn't exist
    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if path.exists() {
            info!("Config file already exists at {:?}", path);
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(ConfigError::Write)?;
            }
        }

        Config::default().save(path)?;

        info!("Generated default config at {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.rpc.request_write_deadline(), Duration::from_secs(5));
        assert_eq!(config.rpc.default_retry_interval(), Duration::from_secs(1));
        assert_eq!(config.committee.max_retries, 15);
        assert_eq!(config.committee.protocol_version, "1.0.0");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rpc.toml");

        let mut config = Config::default();
        config.rpc.default_retry_interval_ms = 250;
        config.committee.max_retries = 2;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[committee]\nmax_retries = 3\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.committee.max_retries, 3);
        assert_eq!(loaded.committee.max_response_time_ms, 5_000);
        assert_eq!(loaded.rpc, RpcConfig::default());
    }

    #[test]
    fn test_generate_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rpc.toml");

        Config::generate_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        // A second call leaves the existing file alone
        Config::generate_default(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
