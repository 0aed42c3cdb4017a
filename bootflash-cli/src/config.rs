//! Configuration file support for bootflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BOOTFLASH_*)
//! 3. Local config file (./bootflash.toml)
//! 4. Global config file (~/.config/bootflash/config.toml)
//!
//! `--config <PATH>` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "bootflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Transfer defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashSettings {
    /// Skip the CRC header by default.
    pub no_crc: Option<bool>,
    /// Per-chunk acknowledgement timeout in milliseconds.
    pub chunk_timeout_ms: Option<u64>,
    /// Largest image the target accepts, in bytes.
    pub max_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashSettings,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bootflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Port config
        if other.port.connection.serial.is_some() {
            self.port.connection.serial = other.port.connection.serial;
        }
        if other.port.connection.baud.is_some() {
            self.port.connection.baud = other.port.connection.baud;
        }

        // Flash config
        if other.flash.no_crc.is_some() {
            self.flash.no_crc = other.flash.no_crc;
        }
        if other.flash.chunk_timeout_ms.is_some() {
            self.flash.chunk_timeout_ms = other.flash.chunk_timeout_ms;
        }
        if other.flash.max_size.is_some() {
            self.flash.max_size = other.flash.max_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.port.connection.serial.is_none());
        assert!(config.port.connection.baud.is_none());
        assert!(config.flash.no_crc.is_none());
        assert!(config.flash.chunk_timeout_ms.is_none());
        assert!(config.flash.max_size.is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_connection() {
        let mut base = Config::default();
        base.port.connection.baud = Some(9600);

        let mut other = Config::default();
        other.port.connection.serial = Some("/dev/ttyACM0".to_string());

        base.merge(other);
        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.port.connection.baud, Some(9600));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.port.connection.serial = Some("COM3".to_string());
        base.flash.chunk_timeout_ms = Some(250);
        base.flash.max_size = Some(110592);

        base.merge(Config::default());
        assert_eq!(base.port.connection.serial.as_deref(), Some("COM3"));
        assert_eq!(base.flash.chunk_timeout_ms, Some(250));
        assert_eq!(base.flash.max_size, Some(110592));
    }

    #[test]
    fn test_config_merge_flash_settings() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.flash.no_crc = Some(true);
        other.flash.chunk_timeout_ms = Some(2000);

        base.merge(other);
        assert_eq!(base.flash.no_crc, Some(true));
        assert_eq!(base.flash.chunk_timeout_ms, Some(2000));
    }

    #[test]
    fn test_config_merge_local_reenables_crc() {
        let mut base = Config::default();
        base.flash.no_crc = Some(true);

        let mut local = Config::default();
        local.flash.no_crc = Some(false);

        base.merge(local);
        assert_eq!(base.flash.no_crc, Some(false));

        base.merge(Config::default());
        assert_eq!(base.flash.no_crc, Some(false));
    }

    // ---- TOML parsing ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[port.connection]
serial = "/dev/ttyACM0"
baud = 115200

[flash]
no_crc = true
chunk_timeout_ms = 1000
max_size = 110592
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.port.connection.baud, Some(115200));
        assert_eq!(config.flash.no_crc, Some(true));
        assert_eq!(config.flash.chunk_timeout_ms, Some(1000));
        assert_eq!(config.flash.max_size, Some(110592));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.port.connection.serial.is_none());
        assert!(config.flash.no_crc.is_none());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: Config = toml::from_str("[flash]\nchunk_timeout_ms = 50\n").unwrap();
        assert!(config.port.connection.baud.is_none());
        assert_eq!(config.flash.chunk_timeout_ms, Some(50));
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let mut config = Config::default();
        config.port.connection.serial = Some("COM10".to_string());
        config.flash.max_size = Some(4096);

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.port.connection.serial.as_deref(), Some("COM10"));
        assert_eq!(parsed.flash.max_size, Some(4096));
    }

    // ---- load_from_path with tempfile ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[port.connection]\nserial = \"/dev/ttyUSB1\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_load_from_path_invalid_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.port.connection.serial.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.port.connection.serial.is_none());
        assert!(config.flash.max_size.is_none());
    }

    #[test]
    fn test_global_config_path_ends_with_config_toml() {
        if let Some(path) = Config::global_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
