//! Configuration file support for Medtrack.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/medtrack/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reminders: RemindersConfig,

    #[serde(default)]
    pub dosing: DosingConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Reminder scheduling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Global on/off gate for reminder trigger creation
    #[serde(default = "default_reminders_enabled")]
    pub enabled: bool,

    /// How many minutes before a scheduled dose the trigger fires
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,

    /// Rolling horizon of concrete triggers, in calendar days
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,

    /// Delay for immediate catch-up triggers, in seconds
    #[serde(default = "default_catch_up_delay_seconds")]
    pub catch_up_delay_seconds: u32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: default_reminders_enabled(),
            lead_minutes: default_lead_minutes(),
            horizon_days: default_horizon_days(),
            catch_up_delay_seconds: default_catch_up_delay_seconds(),
        }
    }
}

/// Dose classification configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DosingConfig {
    /// Hours before a scheduled dose during which it becomes actionable
    #[serde(default = "default_action_window_hours")]
    pub action_window_hours: f64,

    /// Minutes of scheduled/taken divergence that suggest re-anchoring
    #[serde(default = "default_reanchor_threshold_minutes")]
    pub reanchor_threshold_minutes: i64,
}

impl Default for DosingConfig {
    fn default() -> Self {
        Self {
            action_window_hours: default_action_window_hours(),
            reanchor_threshold_minutes: default_reanchor_threshold_minutes(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME").expect("HOME environment variable not set");
        PathBuf::from(home).join(".local/share")
    });
    base.join("medtrack")
}

fn default_reminders_enabled() -> bool {
    true
}

fn default_lead_minutes() -> i64 {
    5
}

fn default_horizon_days() -> i64 {
    7
}

fn default_catch_up_delay_seconds() -> u32 {
    5
}

fn default_action_window_hours() -> f64 {
    4.0
}

fn default_reanchor_threshold_minutes() -> i64 {
    20
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            let home = std::env::var("HOME").expect("HOME environment variable not set");
            PathBuf::from(home).join(".config")
        });
        base.join("medtrack").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.reminders.enabled);
        assert_eq!(config.reminders.lead_minutes, 5);
        assert_eq!(config.reminders.horizon_days, 7);
        assert_eq!(config.dosing.action_window_hours, 4.0);
        assert_eq!(config.dosing.reanchor_threshold_minutes, 20);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.reminders.lead_minutes, parsed.reminders.lead_minutes);
        assert_eq!(
            config.dosing.action_window_hours,
            parsed.dosing.action_window_hours
        );
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[reminders]
enabled = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.reminders.enabled);
        assert_eq!(config.reminders.lead_minutes, 5); // default
        assert_eq!(config.dosing.action_window_hours, 4.0); // default
    }
}
