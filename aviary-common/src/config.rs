//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "AVIARY_ROOT_FOLDER";

/// Config file name looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "aviary.toml";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "aviary.db";

/// Top-level service configuration (`aviary.toml`)
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AviaryConfig {
    /// Root folder holding the database; only honored from the user config file
    pub root_folder: Option<PathBuf>,
    /// Socket address the HTTP surface binds to
    pub bind_address: String,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

impl Default for AviaryConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: "127.0.0.1:5810".to_string(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// TTL cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller does not choose one
    pub default_ttl_secs: u64,
    /// Interval of the expired-entry sweep
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            sweep_interval_secs: 300,
        }
    }
}

/// Fixed-window limit: at most `max_requests` per `window_ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn window(&self) -> std::time::Duration {
        crate::time::millis_to_duration(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(100, 60_000)
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Interval of the stale-record sweep
    pub sweep_interval_secs: u64,
    /// Limit applied to every API request
    pub api: RateLimitConfig,
    /// Peers whose `X-Forwarded-For` header is believed; every other client is
    /// keyed by its socket address
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            api: RateLimitConfig::default(),
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AviaryConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration from a file
    ///
    /// A missing file is not an error: defaults are returned and a warning logged.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `aviary.toml` from the root folder, falling back to the user config file
    pub fn load_for_root(root_folder: &Path) -> Result<Self> {
        let in_root = root_folder.join(CONFIG_FILE_NAME);
        if in_root.exists() {
            return Self::load(&in_root);
        }

        match user_config_file() {
            Some(path) => Self::load(&path),
            None => Self::load(&in_root),
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the user TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = user_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = AviaryConfig::from_toml_str(&toml_content) {
                if let Some(root_folder) = config.root_folder {
                    return root_folder;
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// User-level config file, if present
fn user_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("aviary").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/aviary/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/aviary (or /var/lib/aviary for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("aviary"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/aviary"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("aviary"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/aviary"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("aviary"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\aviary"))
    } else {
        PathBuf::from("./aviary_data")
    }
}
