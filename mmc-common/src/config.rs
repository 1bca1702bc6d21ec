//! Configuration loading
//!
//! Every option resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (both handled by the binaries' clap parsers)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP port for mmc-api
pub const DEFAULT_PORT: u16 = 8080;

/// Default writer busy timeout
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;

/// One layer of optional settings
///
/// The binaries build one layer from CLI/env and the TOML file provides another;
/// [`Config::resolve`] merges them over the compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub client_keys: Option<String>,
    pub media_manager: Option<String>,
    pub notifier_endpoint: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub export_path: Option<PathBuf>,
}

impl ConfigLayer {
    /// Fill every unset field from `lower`
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            port: self.port.or(lower.port),
            db_path: self.db_path.or(lower.db_path),
            client_keys: self.client_keys.or(lower.client_keys),
            media_manager: self.media_manager.or(lower.media_manager),
            notifier_endpoint: self.notifier_endpoint.or(lower.notifier_endpoint),
            busy_timeout_ms: self.busy_timeout_ms.or(lower.busy_timeout_ms),
            export_path: self.export_path.or(lower.export_path),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// Raw `system:env=key;...` string, parsed by [`crate::api::auth::parse_client_keys`]
    pub client_keys: String,
    /// Canonical origin of the media manager (event URLs, RDF URIs)
    pub media_manager: String,
    /// Event notifier endpoint; events are only logged when unset
    pub notifier_endpoint: Option<String>,
    pub busy_timeout: Duration,
    pub export_path: PathBuf,
}

impl Config {
    /// Merge the CLI/env layer with the TOML file and compiled defaults
    pub fn resolve(cli: ConfigLayer, config_file: Option<&Path>) -> Result<Config> {
        let file_layer = load_config_file(config_file)?;
        let merged = cli.or(file_layer);

        Ok(Config {
            port: merged.port.unwrap_or(DEFAULT_PORT),
            db_path: merged
                .db_path
                .unwrap_or_else(|| PathBuf::from("media.sqlite")),
            client_keys: merged.client_keys.unwrap_or_default(),
            media_manager: merged
                .media_manager
                .map(|m| m.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:8020".to_string()),
            notifier_endpoint: merged.notifier_endpoint.filter(|e| !e.trim().is_empty()),
            busy_timeout: Duration::from_millis(
                merged.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            ),
            export_path: merged
                .export_path
                .unwrap_or_else(|| PathBuf::from("export/metadata.ttl")),
        })
    }
}

/// Read the TOML layer
///
/// An explicit path must exist. Without one, the per-user config directory and
/// then `/etc/mmc/config.toml` are probed; finding neither yields an empty layer.
pub fn load_config_file(explicit: Option<&Path>) -> Result<ConfigLayer> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!("Config file not found: {:?}", path)));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(ConfigLayer::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    toml::from_str::<ConfigLayer>(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {:?}: {}", path, e)))
}

fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mmc").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/mmc/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_layer_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\nbusy_timeout_ms = 250\nmedia_manager = \"https://manager.example/\"").unwrap();

        let cli = ConfigLayer {
            port: Some(7000),
            ..Default::default()
        };
        let config = Config::resolve(cli, Some(file.path())).unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.media_manager, "https://manager.example");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/mmc.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# empty").unwrap();
        let config = Config::resolve(ConfigLayer::default(), Some(file.path())).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.busy_timeout, Duration::from_secs(10));
        assert!(config.notifier_endpoint.is_none());
    }
}
