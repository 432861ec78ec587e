//! Configuration system for natprobe CLI.

use natprobe_core::{ServerSource, TraversalConfig};
use natprobe_stun::{DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// natprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// STUN configuration
    #[serde(default)]
    pub stun: StunConfig,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// STUN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunConfig {
    /// Newline-delimited `host:port` server list
    #[serde(default = "default_server_list")]
    pub server_list: PathBuf,
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per STUN transaction
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Local IP to bind
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
    /// Local game port, used for classification and punching
    #[serde(default = "default_local_port")]
    pub local_port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_server_list() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("natprobe/stun_servers.txt")
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_local_port() -> u16 {
    27015
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            server_list: default_server_list(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            local_port: default_local_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("natprobe/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Parse bind IP
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_bind_ip(&self) -> anyhow::Result<IpAddr> {
        self.network
            .bind_ip
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid bind IP: {}", self.network.bind_ip))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_bind_ip()?;

        if self.stun.timeout_ms == 0 {
            anyhow::bail!("STUN timeout must be at least 1 ms");
        }

        if self.stun.retries == 0 {
            anyhow::bail!("STUN retries must be at least 1");
        }

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Build the library traversal config
    ///
    /// # Errors
    ///
    /// Returns an error if the bind IP is invalid.
    pub fn traversal(&self) -> anyhow::Result<TraversalConfig> {
        Ok(
            TraversalConfig::new(ServerSource::File(self.stun.server_list.clone()))
                .with_transaction(Duration::from_millis(self.stun.timeout_ms), self.stun.retries)
                .with_bind_ip(self.parse_bind_ip()?)
                .with_local_port(self.network.local_port),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stun.timeout_ms, 3000);
        assert_eq!(config.stun.retries, 3);
        assert_eq!(config.network.bind_ip, "0.0.0.0");
        assert_eq!(config.network.local_port, 27015);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.stun.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.stun.timeout_ms = 500;
        config.stun.retries = 0;
        assert!(config.validate().is_err());

        config.stun.retries = 2;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        config.network.bind_ip = "localhost".to_string();
        assert!(config.validate().is_err());

        config.network.bind_ip = "192.168.1.10".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [stun]
            server_list = "servers.txt"
            retries = 5

            [network]
            local_port = 7777
            "#,
        )
        .unwrap();

        assert_eq!(config.stun.server_list, PathBuf::from("servers.txt"));
        assert_eq!(config.stun.retries, 5);
        assert_eq!(config.stun.timeout_ms, 3000);
        assert_eq!(config.network.local_port, 7777);
        assert_eq!(config.network.bind_ip, "0.0.0.0");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.stun.timeout_ms = 750;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.stun.timeout_ms, 750);
        assert_eq!(loaded.stun.server_list, config.stun.server_list);
    }

    #[test]
    fn test_traversal_config() {
        let mut config = Config::default();
        config.stun.timeout_ms = 250;
        config.network.bind_ip = "127.0.0.1".to_string();

        let traversal = config.traversal().unwrap();
        assert_eq!(traversal.transaction.timeout, Duration::from_millis(250));
        assert_eq!(traversal.transaction.retries, 3);
        assert_eq!(traversal.bind_addr(9).to_string(), "127.0.0.1:9");
        assert_eq!(traversal.local_port, 27015);
        assert_eq!(
            traversal.servers,
            ServerSource::File(config.stun.server_list.clone())
        );
    }
}
