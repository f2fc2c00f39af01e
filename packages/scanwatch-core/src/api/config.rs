use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Default scan service URL (the bundled local server).
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3008";

/// Environment variable name for server URL override
const ENV_SERVER_URL: &str = "SCANWATCH_SERVER_URL";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    server: Option<ServerConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfig {
    /// Scan service base URL (e.g., "http://scanner.lan:3008")
    url: Option<String>,
}

/// Runtime endpoint configuration
#[derive(Debug, Clone)]
pub struct ServerEndpointConfig {
    /// Base URL for API calls (no trailing slash)
    pub url: String,
    /// Source of the configuration (for logging)
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("scanwatch").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load server endpoint configuration with priority:
/// 1. Environment variable (SCANWATCH_SERVER_URL)
/// 2. Config file (~/.config/scanwatch/config.toml)
/// 3. Default values
pub fn load_server_config() -> ServerEndpointConfig {
    // Priority 1: Environment variable
    if let Ok(url) = std::env::var(ENV_SERVER_URL) {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() {
            tracing::info!("Using scan service URL from environment variable: {}", url);
            return ServerEndpointConfig {
                url: url.to_string(),
                source: ConfigSource::Environment,
            };
        }
    }

    // Priority 2: Config file
    if let Some(config) = load_config_file() {
        if let Some(server) = config.server {
            let url = server
                .url
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty());

            if let Some(url) = url {
                tracing::info!("Using scan service URL from config file: {}", url);
                return ServerEndpointConfig {
                    url,
                    source: ConfigSource::ConfigFile,
                };
            }
        }
    }

    // Priority 3: Default values
    tracing::debug!("Using default scan service URL: {}", DEFAULT_SERVER_URL);
    ServerEndpointConfig {
        url: DEFAULT_SERVER_URL.to_string(),
        source: ConfigSource::Default,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/scanwatch/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Scanwatch Configuration
# Place this file at: ~/.config/scanwatch/config.toml

[server]
# Base URL of the scan service
# Default: http://127.0.0.1:3008
# url = "http://scanner.lan:3008"
"#
    .to_string()
}
