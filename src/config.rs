use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "maville.toml";

/// Immutable engine configuration, built once at startup and passed down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub pagination: PageBounds,
    pub validation: ValidationConfig,
    pub ids: IdConfig,
    pub locking: LockingConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PageBounds {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub min_description_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IdConfig {
    pub start: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LockingConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub db_file: PathBuf,
    pub live_capacity: usize,
    pub auto_subscribe_reporter: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            server: ServerConfig::default(),
            pagination: PageBounds::default(),
            validation: ValidationConfig::default(),
            ids: IdConfig::default(),
            locking: LockingConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7000,
        }
    }
}

impl Default for PageBounds {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_description_length: 10,
        }
    }
}

impl Default for IdConfig {
    fn default() -> Self {
        Self { start: 1 }
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            db_file: PathBuf::from("notifications.sqlite"),
            live_capacity: 256,
            auto_subscribe_reporter: true,
        }
    }
}

impl EngineConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Loads `path` when given, else `maville.toml` in the working directory if
    /// it exists, else defaults. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.default_page_size == 0 || self.pagination.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "pagination sizes must be greater than zero".to_string(),
            ));
        }
        if self.pagination.max_page_size < self.pagination.default_page_size {
            return Err(ConfigError::Invalid(
                "pagination.max_page_size must be >= pagination.default_page_size".to_string(),
            ));
        }
        if self.ids.start == 0 {
            return Err(ConfigError::Invalid("ids.start must be >= 1".to_string()));
        }
        if self.notifications.live_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notifications.live_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.locking.timeout_ms)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(".maville.lock")
    }

    pub fn notifications_db_path(&self) -> PathBuf {
        if self.notifications.db_file.is_absolute() {
            self.notifications.db_file.clone()
        } else {
            self.data_dir.join(&self.notifications.db_file)
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Render(toml::ser::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "unable to read config '{}': {}", path.display(), source)
            }
            ConfigError::Parse(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::Render(err) => write!(f, "unable to render config: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Render(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Parse(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        ConfigError::Render(value)
    }
}
