//! TOML-based service configuration.
//!
//! Loaded from the file named by `CLASSROOM_API_CONFIG` (default
//! `config.toml`). A missing file means defaults. A handful of environment
//! variables override the file afterwards:
//!
//! - `CLASSROOM_API_BIND` → `server.bind`
//! - `CLASSROOM_API_DB` → `database.path`
//! - `LESSON_PLAN_SERVICE_URL` → `lesson_plan.base_url`

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonPlanConfig {
    #[serde(default = "default_lesson_plan_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent upstream when a request leaves `subSubject` out.
    #[serde(default = "default_sub_subject")]
    pub sub_subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lesson_plan: LessonPlanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/classroom.db")
}

fn default_lesson_plan_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_sub_subject() -> String {
    "Civics".to_string()
}

fn default_log_filter() -> String {
    "info,tower_http=info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LessonPlanConfig {
    fn default() -> Self {
        Self {
            base_url: default_lesson_plan_url(),
            timeout_secs: default_timeout_secs(),
            sub_subject: default_sub_subject(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load from the configured path, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CLASSROOM_API_CONFIG").unwrap_or_else(|_| "config.toml".into());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CLASSROOM_API_BIND") {
            self.server.bind = bind.parse().map_err(|e| ConfigError::InvalidValue {
                key: "CLASSROOM_API_BIND".to_string(),
                message: format!("{e}"),
            })?;
        }
        if let Some(path) = lookup("CLASSROOM_API_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("LESSON_PLAN_SERVICE_URL") {
            self.lesson_plan.base_url = url;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lesson_plan.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "lesson_plan.base_url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.lesson_plan.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lesson_plan.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
