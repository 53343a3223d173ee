//! Configuration schema (mangosql.toml)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Database driver the generated client targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverConfig {
    /// lib/pq
    Pq,

    /// jackc/pgx
    #[default]
    Pgx,

    /// SQLite
    Sqlite,

    /// MySQL
    Mysql,

    /// MariaDB
    Mariadb,
}

impl DriverConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pq => "pq",
            Self::Pgx => "pgx",
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
        }
    }
}

impl FromStr for DriverConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pq" => Ok(Self::Pq),
            "pgx" => Ok(Self::Pgx),
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            "mariadb" => Ok(Self::Mariadb),
            _ => Err(ConfigError::UnknownDriver(s.to_string())),
        }
    }
}

impl std::fmt::Display for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logger the generated client wires in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerConfig {
    #[default]
    None,
    Zap,
    Logrus,
    Zerolog,
    Console,
}

impl LoggerConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zap => "zap",
            Self::Logrus => "logrus",
            Self::Zerolog => "zerolog",
            Self::Console => "console",
        }
    }
}

impl FromStr for LoggerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zap" => Ok(Self::Zap),
            "logrus" => Ok(Self::Logrus),
            "zerolog" => Ok(Self::Zerolog),
            "console" => Ok(Self::Console),
            _ => Err(ConfigError::UnknownLogger(s.to_string())),
        }
    }
}

impl std::fmt::Display for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How schema and query sources are located
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// File holding hand-written queries, next to the schema source
    pub queries_file: String,

    /// Line that opens the "up" section of a migration file
    pub up_marker: String,

    /// Line that opens the "down" section of a migration file
    pub down_marker: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            queries_file: "queries.sql".to_string(),
            up_marker: "-- +goose Up".to_string(),
            down_marker: "-- +goose Down".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target driver
    #[serde(default)]
    pub driver: DriverConfig,

    /// Target logger
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Input discovery
    #[serde(default)]
    pub input: InputConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            logger: LoggerConfig::default(),
            input: InputConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject values the input loader cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("input.queries_file", &self.input.queries_file),
            ("input.up_marker", &self.input.up_marker),
            ("input.down_marker", &self.input.down_marker),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        if self.input.up_marker.trim() == self.input.down_marker.trim() {
            return Err(ConfigError::InvalidValue {
                field: "input.down_marker".to_string(),
                message: "must differ from input.up_marker".to_string(),
            });
        }

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Unknown driver '{0}' (expected pq, pgx, sqlite, mysql or mariadb)")]
    UnknownDriver(String),

    #[error("Unknown logger '{0}' (expected none, zap, logrus, zerolog or console)")]
    UnknownLogger(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.driver, DriverConfig::Pgx);
        assert_eq!(config.logger, LoggerConfig::None);
        assert_eq!(config.input.queries_file, "queries.sql");
        assert_eq!(config.input.up_marker, "-- +goose Up");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
driver = "sqlite"

[input]
queries_file = "sql/queries.sql"
"#,
        )
        .unwrap();

        assert_eq!(config.driver, DriverConfig::Sqlite);
        assert_eq!(config.logger, LoggerConfig::None);
        assert_eq!(config.input.queries_file, "sql/queries.sql");
        assert_eq!(config.input.down_marker, "-- +goose Down");
    }

    #[test]
    fn unknown_driver_rejected() {
        assert!(Config::from_toml("driver = \"oracle\"").is_err());
        assert!(matches!(
            "oracle".parse::<DriverConfig>(),
            Err(ConfigError::UnknownDriver(_))
        ));
        assert_eq!("ZeroLog".parse::<LoggerConfig>().unwrap(), LoggerConfig::Zerolog);
    }

    #[test]
    fn empty_marker_rejected() {
        let result = Config::from_toml("[input]\nup_marker = \"\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config {
            driver: DriverConfig::Mariadb,
            logger: LoggerConfig::Zap,
            ..Config::default()
        };
        let toml = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config.driver, parsed.driver);
        assert_eq!(config.logger, parsed.logger);
        assert_eq!(config.input, parsed.input);
    }
}
