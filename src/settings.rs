// src/settings.rs
//
// Monitor settings, persisted as TOML in the user's config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::{LinkConfig, Parity};
use crate::sessions::SessionTiming;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    #[serde(default = "default_read_interval_ms")]
    pub read_interval_ms: u64,
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,
    #[serde(default = "default_catalog_refresh_interval_ms")]
    pub catalog_refresh_interval_ms: u64,

    // Line settings, as configured on the scale
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,

    #[serde(default = "default_record_path")]
    pub record_path: String,

    // How long transient messages stay visible
    #[serde(default = "default_info_message_ms")]
    pub info_message_ms: u64,
    #[serde(default = "default_error_message_ms")]
    pub error_message_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String, // "error" | "warn" | "info" | "debug" | "trace"
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_read_interval_ms() -> u64 {
    100
}
fn default_save_interval_ms() -> u64 {
    1000
}
fn default_catalog_refresh_interval_ms() -> u64 {
    5000
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_record_path() -> String {
    "data.txt".to_string()
}
fn default_info_message_ms() -> u64 {
    1000
}
fn default_error_message_ms() -> u64 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            read_interval_ms: default_read_interval_ms(),
            save_interval_ms: default_save_interval_ms(),
            catalog_refresh_interval_ms: default_catalog_refresh_interval_ms(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::None,
            record_path: default_record_path(),
            info_message_ms: default_info_message_ms(),
            error_message_ms: default_error_message_ms(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.read_interval_ms == 0 {
            return Err("read_interval_ms must be greater than zero".to_string());
        }
        if self.save_interval_ms == 0 {
            return Err("save_interval_ms must be greater than zero".to_string());
        }
        if self.catalog_refresh_interval_ms == 0 {
            return Err("catalog_refresh_interval_ms must be greater than zero".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("data_bits must be 5 to 8, got {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.record_path.trim().is_empty() {
            return Err("record_path must not be empty".to_string());
        }
        Ok(())
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    /// 90% of the read interval, so a blocked read never runs into the next tick
    pub fn read_timeout(&self) -> Duration {
        self.read_interval() * 9 / 10
    }

    pub fn timing(&self) -> SessionTiming {
        SessionTiming {
            read_interval: self.read_interval(),
            save_interval: Duration::from_millis(self.save_interval_ms),
            catalog_refresh_interval: Duration::from_millis(self.catalog_refresh_interval_ms),
            info_message: Duration::from_millis(self.info_message_ms),
            error_message: Duration::from_millis(self.error_message_ms),
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: self.read_timeout(),
        }
    }

    pub fn record_path(&self) -> PathBuf {
        PathBuf::from(&self.record_path)
    }
}

/// `<config dir>/scalelog/settings.toml`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| "Failed to get config dir".to_string())?;
    Ok(config_dir.join("scalelog").join("settings.toml"))
}

/// Read and validate settings. The file must exist.
pub fn load_settings(path: &Path) -> Result<MonitorSettings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;

    let settings: MonitorSettings = toml::from_str(&content)
        .map_err(|e| format!("Failed to parse settings {}: {}", path.display(), e))?;

    settings
        .validate()
        .map_err(|e| format!("Invalid settings in {}: {}", path.display(), e))?;

    Ok(settings)
}

/// Read settings, writing the defaults first if the file does not exist yet.
pub fn load_or_init_settings(path: &Path) -> Result<MonitorSettings, String> {
    if path.exists() {
        load_settings(path)
    } else {
        // First run: create default settings
        let settings = MonitorSettings::default();
        save_settings(path, &settings)?;
        log::info!("[settings] Wrote default settings to {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &MonitorSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;

    Ok(())
}
