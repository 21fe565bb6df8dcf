//! Application configuration, persisted as TOML through confy.

use std::path::PathBuf;

use everlog_types::{MeterSettings, TimerSettings};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_directory: String,
    /// Restrict discovery to one server's logs; empty means any.
    pub server: String,
    pub spells_file: String,
    pub whitelist_file: Option<String>,
    /// Overrides the default learned-items location.
    pub learned_items_file: Option<String>,
    pub default_level: u8,
    pub timers: TimerSettings,
    pub meter: MeterSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            log_directory: home.join("everquest/Logs").to_string_lossy().into_owned(),
            server: String::new(),
            spells_file: home
                .join("everquest/spells_us.txt")
                .to_string_lossy()
                .into_owned(),
            whitelist_file: None,
            learned_items_file: None,
            default_level: 60,
            timers: TimerSettings::default(),
            meter: MeterSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the stored config, falling back to defaults on any failure.
    pub fn load() -> Self {
        match confy::load("everlog", None) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn store(&self) -> Result<(), confy::ConfyError> {
        confy::store("everlog", None, self)
    }

    pub fn server_filter(&self) -> Option<&str> {
        if self.server.is_empty() {
            None
        } else {
            Some(self.server.as_str())
        }
    }

    /// Where learned item associations live: the configured path, or the
    /// platform data directory.
    pub fn learned_items_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.learned_items_file {
            return Some(PathBuf::from(path));
        }
        let dir = dirs::data_dir()?.join("everlog");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create data directory");
            return None;
        }
        Some(dir.join("learned_items.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.default_level, 60);
        assert_eq!(parsed.timers.cast_window_secs, config.timers.cast_window_secs);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: AppConfig = toml::from_str("default_level = 34").unwrap();
        assert_eq!(parsed.default_level, 34);
        assert_eq!(parsed.meter.window_secs, MeterSettings::default().window_secs);
    }

    #[test]
    fn empty_server_means_no_filter() {
        let mut config = AppConfig::default();
        assert!(config.server_filter().is_none());
        config.server = "project1999".to_string();
        assert_eq!(config.server_filter(), Some("project1999"));
    }
}
