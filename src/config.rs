use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use hunt_link_core::safety::MonitorConfig;
use hunt_link_core::{AlertSettings, CooldownConfig, SessionConfig, TrackingSettings};

/// Fallback relay address for local development.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";

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

/// Safety evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Seconds between evaluations of the group picture
    pub check_interval_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Relay URL (e.g., "ws://localhost:8080" or "wss://relay.example.com")
    pub server_url: ConfigValue<String>,
    /// Hunting group to join
    pub group_id: ConfigValue<String>,
    /// Member identifier within the group
    pub user_id: ConfigValue<String>,
    /// Name shown to other members (defaults to the user id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Safety evaluation settings
    pub safety: SafetyConfig,
    /// Position sharing settings
    pub tracking: TrackingSettings,
    /// Notification preferences
    pub alerts: AlertSettings,
    /// Duplicate-suppression windows per alert kind
    pub cooldowns: CooldownConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    group_id: Option<String>,
    user_id: Option<String>,
    display_name: Option<String>,
    safety: Option<SafetyConfig>,
    tracking: Option<TrackingSettings>,
    alerts: Option<AlertSettings>,
    cooldowns: Option<CooldownConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut group_id = ConfigValue::new("default".to_string(), ConfigSource::Default);
        let mut user_id = ConfigValue::new("default".to_string(), ConfigSource::Default);
        let mut display_name = None;
        let mut config_file = None;
        let mut safety = SafetyConfig::default();
        let mut tracking = TrackingSettings::default();
        let mut alerts = AlertSettings::default();
        let mut cooldowns = CooldownConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(group) = file_config.group_id {
                group_id = ConfigValue::new(group, ConfigSource::File);
            }
            if let Some(user) = file_config.user_id {
                user_id = ConfigValue::new(user, ConfigSource::File);
            }
            if let Some(name) = file_config.display_name {
                display_name = Some(name);
            }
            if let Some(section) = file_config.safety {
                safety = section;
            }
            if let Some(section) = file_config.tracking {
                tracking = section;
            }
            if let Some(section) = file_config.alerts {
                alerts = section;
            }
            if let Some(section) = file_config.cooldowns {
                cooldowns = section;
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("HUNTLINK_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(group) = std::env::var("HUNTLINK_GROUP_ID") {
            group_id = ConfigValue::new(group, ConfigSource::Environment);
        }
        if let Ok(user) = std::env::var("HUNTLINK_USER_ID") {
            user_id = ConfigValue::new(user, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            group_id,
            user_id,
            display_name,
            config_file,
            safety,
            tracking,
            alerts,
            cooldowns,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/huntlink/
    /// - macOS: ~/Library/Application Support/huntlink/
    /// - Windows: %APPDATA%/huntlink/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("huntlink")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }

    /// Build the session settings this configuration describes.
    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(
            self.server_url.value.clone(),
            self.group_id.value.clone(),
            self.user_id.value.clone(),
        );
        if let Some(name) = &self.display_name {
            session = session.with_display_name(name.clone());
        }
        session.tracking = self.tracking.clone();
        // Zero would make the monitor spin.
        session.monitor = MonitorConfig {
            interval: Duration::from_secs(self.safety.check_interval_secs.max(1)),
        };
        session.alert_settings = self.alerts.clone();
        session.cooldowns = self.cooldowns.clone();
        session
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
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
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use hunt_link_core::TrackingMode;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.server_url.value, DEFAULT_SERVER_URL);
        assert_eq!(config.server_url.source, ConfigSource::Default);
        assert_eq!(config.group_id.value, "default");
        assert_eq!(config.user_id.value, "default");
        assert!(config.display_name.is_none());
        assert_eq!(config.safety.check_interval_secs, 5);
        assert!(config.tracking.share_exact_position);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "server_url: wss://relay.example.com").unwrap();
        writeln!(file, "group_id: elk-camp").unwrap();
        writeln!(file, "user_id: hunter-7").unwrap();
        writeln!(file, "display_name: Dana").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.server_url.value, "wss://relay.example.com");
        assert_eq!(config.server_url.source, ConfigSource::File);
        assert_eq!(config.group_id.value, "elk-camp");
        assert_eq!(config.group_id.source, ConfigSource::File);
        assert_eq!(config.user_id.value, "hunter-7");
        assert_eq!(config.display_name.as_deref(), Some("Dana"));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "user_id: fromfile").unwrap();

        // Set env var
        std::env::set_var("HUNTLINK_USER_ID", "fromenv");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.user_id.value, "fromenv");
        assert_eq!(config.user_id.source, ConfigSource::Environment);

        // Clean up
        std::env::remove_var("HUNTLINK_USER_ID");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_partial_file_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "group_id: elk-camp").unwrap();
        // server_url and user_id not specified

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.server_url.source, ConfigSource::Default);
        assert_eq!(config.group_id.value, "elk-camp");
        assert_eq!(config.group_id.source, ConfigSource::File);
        assert_eq!(config.user_id.source, ConfigSource::Default);
    }

    #[test]
    fn test_session_config_mapping() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "user_id: hunter-7").unwrap();
        writeln!(file, "display_name: Dana").unwrap();
        writeln!(file, "safety:").unwrap();
        writeln!(file, "  check_interval_secs: 2").unwrap();
        writeln!(file, "tracking:").unwrap();
        writeln!(file, "  mode: manual").unwrap();
        writeln!(file, "  share_exact_position: false").unwrap();
        writeln!(file, "  update_interval_ms: 15000").unwrap();
        writeln!(file, "alerts:").unwrap();
        writeln!(file, "  proximity_threshold_m: 150.0").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        let session = config.session_config();
        assert_eq!(session.user_id, "hunter-7");
        assert_eq!(session.display_name, "Dana");
        assert_eq!(session.monitor.interval, Duration::from_secs(2));
        assert_eq!(session.tracking.mode, TrackingMode::Manual);
        assert!(!session.tracking.share_exact_position);
        assert_eq!(session.tracking.update_interval_ms, 15000);
        assert_eq!(session.alert_settings.proximity_threshold_m, 150.0);
    }
}
