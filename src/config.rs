use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use loro_mirror_core::InferOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Store behavior settings with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// Validate every state update against the schema
    pub validate_updates: ConfigValue<bool>,
    /// Reject invalid updates instead of logging and applying them
    pub throw_on_validation_error: ConfigValue<bool>,
    /// Log container registration failures
    pub debug: ConfigValue<bool>,
    /// Store schemaless strings as collaborative text
    pub default_loro_text: ConfigValue<bool>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    validate_updates: Option<bool>,
    throw_on_validation_error: Option<bool>,
    debug: Option<bool>,
    default_loro_text: Option<bool>,
}

pub const ENV_VALIDATE_UPDATES: &str = "LORO_MIRROR_VALIDATE_UPDATES";
pub const ENV_THROW_ON_VALIDATION_ERROR: &str = "LORO_MIRROR_THROW_ON_VALIDATION_ERROR";
pub const ENV_DEBUG: &str = "LORO_MIRROR_DEBUG";
pub const ENV_DEFAULT_LORO_TEXT: &str = "LORO_MIRROR_DEFAULT_LORO_TEXT";

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            validate_updates: ConfigValue::new(true, ConfigSource::Default),
            throw_on_validation_error: ConfigValue::new(false, ConfigSource::Default),
            debug: ConfigValue::new(false, ConfigSource::Default),
            default_loro_text: ConfigValue::new(false, ConfigSource::Default),
            config_file: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |name| std::env::var(name).ok())
    }

    /// Like [`StoreConfig::load`], reading environment variables through `env`.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config.config_file = Some(path.clone());

            if let Some(v) = file_config.validate_updates {
                config.validate_updates = ConfigValue::new(v, ConfigSource::File);
            }
            if let Some(v) = file_config.throw_on_validation_error {
                config.throw_on_validation_error = ConfigValue::new(v, ConfigSource::File);
            }
            if let Some(v) = file_config.debug {
                config.debug = ConfigValue::new(v, ConfigSource::File);
            }
            if let Some(v) = file_config.default_loro_text {
                config.default_loro_text = ConfigValue::new(v, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        let overrides = [
            (ENV_VALIDATE_UPDATES, &mut config.validate_updates),
            (ENV_THROW_ON_VALIDATION_ERROR, &mut config.throw_on_validation_error),
            (ENV_DEBUG, &mut config.debug),
            (ENV_DEFAULT_LORO_TEXT, &mut config.default_loro_text),
        ];
        for (name, target) in overrides {
            if let Some(raw) = env(name) {
                let value = parse_bool(&raw)
                    .ok_or_else(|| ConfigError::InvalidEnvVar(name.to_string(), raw.clone()))?;
                *target = ConfigValue::new(value, ConfigSource::Environment);
            }
        }

        tracing::debug!(
            config_file = ?config.config_file,
            validate_updates = config.validate_updates.value,
            throw_on_validation_error = config.throw_on_validation_error.value,
            "loaded store config"
        );
        Ok(config)
    }

    pub fn infer_options(&self) -> InferOptions {
        InferOptions {
            default_loro_text: self.default_loro_text.value,
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/loro-mirror/
    /// - macOS: ~/Library/Application Support/loro-mirror/
    /// - Windows: %APPDATA%/loro-mirror/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loro-mirror")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnvVar(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnvVar(name, value) => {
                write!(f, "Invalid boolean '{}' in {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = StoreConfig::load_with_env(Some(config_path), no_env).unwrap();
        assert!(config.validate_updates.value);
        assert_eq!(config.validate_updates.source, ConfigSource::Default);
        assert!(!config.throw_on_validation_error.value);
        assert!(!config.debug.value);
        assert!(!config.infer_options().default_loro_text);
        assert_eq!(config.config_file, None);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "throw_on_validation_error: true").unwrap();
        writeln!(file, "default_loro_text: true").unwrap();

        let config = StoreConfig::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert!(config.throw_on_validation_error.value);
        assert_eq!(config.throw_on_validation_error.source, ConfigSource::File);
        assert!(config.infer_options().default_loro_text);
        assert_eq!(config.validate_updates.source, ConfigSource::Default);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "debug: false").unwrap();

        let env: HashMap<&str, &str> = [(ENV_DEBUG, "yes")].into_iter().collect();
        let config =
            StoreConfig::load_with_env(Some(config_path), |name| env.get(name).map(|v| v.to_string()))
                .unwrap();
        assert!(config.debug.value);
        assert_eq!(config.debug.source, ConfigSource::Environment);
    }

    #[test]
    fn test_invalid_env_value() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let result = StoreConfig::load_with_env(Some(config_path), |name| {
            (name == ENV_VALIDATE_UPDATES).then(|| "maybe".to_string())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains(ENV_VALIDATE_UPDATES));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = StoreConfig::load_with_env(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
