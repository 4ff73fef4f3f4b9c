// Configuration module for jellyfin-repair
// Locates the Jellyfin stores and holds the repair defaults

use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "jellyfin-repair";
const CONFIG_FILENAME: &str = "config.toml";
const DEFAULT_PROCESS_NAME: &str = "jellyfin";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Locations of the Jellyfin stores
    pub paths: PathsConfig,

    /// Server process detection
    pub server: ServerConfig,

    /// Repair pass defaults
    pub repair: RepairConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Jellyfin data directory (contains data/library.db and data/users.db)
    pub data_dir: Option<PathBuf>,

    /// Override library database path
    pub library_db: Option<PathBuf>,

    /// Override users database path
    pub users_db: Option<PathBuf>,

    /// Directory holding per-user policy.xml/config.xml folders
    pub users_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Process name of the media server (default: jellyfin)
    pub process_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Run each repair pass inside a single transaction (default: true)
    pub transactional: bool,

    /// Copy the database next to itself before mutating it (default: true)
    pub backup: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            transactional: true,
            backup: true,
        }
    }
}

/// Resolved store locations
#[derive(Debug, Clone)]
pub struct StorePaths {
    /// Jellyfin data directory
    pub data_dir: PathBuf,

    /// library.db (TypedBaseItems)
    pub library_db: PathBuf,

    /// users.db (LocalUsersv2)
    pub users_db: PathBuf,

    /// Per-user sidecar XML directory
    pub users_dir: PathBuf,
}

impl StorePaths {
    /// Resolve store paths
    ///
    /// Priority order:
    /// 1. Environment variables (JELLYFIN_DATA_DIR, JELLYFIN_USERS_DIR)
    /// 2. Config file overrides
    /// 3. Packaged Jellyfin layout for the platform
    pub fn new(config_overrides: &PathsConfig) -> Self {
        let data_dir = Self::resolve_data_dir(&config_overrides.data_dir);
        Self::with_data_dir(data_dir, config_overrides)
    }

    /// Derive every store path from a data directory, keeping explicit overrides
    pub fn with_data_dir(data_dir: PathBuf, config_overrides: &PathsConfig) -> Self {
        let library_db = config_overrides
            .library_db
            .clone()
            .unwrap_or_else(|| data_dir.join("data").join("library.db"));

        let users_db = config_overrides
            .users_db
            .clone()
            .unwrap_or_else(|| data_dir.join("data").join("users.db"));

        let users_dir = Self::resolve_users_dir(&config_overrides.users_dir, &data_dir);

        Self {
            data_dir,
            library_db,
            users_db,
            users_dir,
        }
    }

    fn resolve_data_dir(config_override: &Option<PathBuf>) -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = std::env::var("JELLYFIN_DATA_DIR") {
            return PathBuf::from(path);
        }

        // 2. Check config file override
        if let Some(ref path) = config_override {
            return path.clone();
        }

        // 3. Packaged layout
        default_data_dir()
    }

    fn resolve_users_dir(config_override: &Option<PathBuf>, data_dir: &Path) -> PathBuf {
        if let Ok(path) = std::env::var("JELLYFIN_USERS_DIR") {
            return PathBuf::from(path);
        }

        if let Some(ref path) = config_override {
            return path.clone();
        }

        if cfg!(target_os = "linux") {
            PathBuf::from("/etc/jellyfin/users")
        } else {
            data_dir.join("config").join("users")
        }
    }

    /// Log the resolved paths
    pub fn log_paths(&self) {
        tracing::debug!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Library database: {}", self.library_db.display());
        tracing::debug!("Users database: {}", self.users_db.display());
        tracing::debug!("Users directory: {}", self.users_dir.display());
    }
}

fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/lib/jellyfin");
    }

    // Windows: %LOCALAPPDATA%\jellyfin, macOS: ~/Library/Application Support/jellyfin
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("jellyfin");
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Store locations
    pub paths: StorePaths,

    /// Server process name to look for
    pub process_name: String,

    /// Wrap repair passes in a transaction
    pub transactional: bool,

    /// Back up databases before mutating them
    pub backup: bool,

    /// Raw path overrides, kept for rebasing onto a CLI data dir
    path_overrides: PathsConfig,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file (explicit path, else the config directory)
    /// 3. Default values
    pub fn load(config_path: Option<&Path>) -> Self {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::find_config_dir().join(CONFIG_FILENAME));

        let config_file = Self::load_config_file(&config_path);

        Self::build(config_file)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        // Environment variable takes priority
        if let Ok(path) = std::env::var("JELLYFIN_REPAIR_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        // Then XDG config dir
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        // Fallback to current directory
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_path: &Path) -> ConfigFile {
        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile) -> Self {
        let paths = StorePaths::new(&config_file.paths);

        // Process name: env > config > default
        let process_name = std::env::var("JELLYFIN_REPAIR_PROCESS_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(config_file.server.process_name);

        Self {
            paths,
            process_name,
            transactional: config_file.repair.transactional,
            backup: config_file.repair.backup,
            path_overrides: config_file.paths,
        }
    }

    /// Point every default store path at a different data directory
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.paths = StorePaths::with_data_dir(data_dir, &self.path_overrides);
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::debug!("Server process name: {}", self.process_name);
        if !self.transactional {
            tracing::warn!("Transactions disabled: a failed pass may leave partial changes");
        }
        if !self.backup {
            tracing::debug!("Database backups disabled");
        }
    }
}
