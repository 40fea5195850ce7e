use crate::domain::models::{AddressPolicy, ChannelMap, PowerLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Legacy advertising interval limits (Bluetooth Core, 20 ms to 10.24 s)
pub const MIN_ADV_INTERVAL_MS: u16 = 20;
pub const MAX_ADV_INTERVAL_MS: u16 = 10240;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "axonapotamus".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error(
        "advertising interval {min_ms}..{max_ms} ms must be ordered and within {}..={} ms",
        MIN_ADV_INTERVAL_MS,
        MAX_ADV_INTERVAL_MS
    )]
    InvalidInterval { min_ms: u16, max_ms: u16 },
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,
    #[error("broadcast hold of {hold_ms} ms does not fit twice into the {tick_ms} ms tick")]
    HoldTooLong { hold_ms: u64, tick_ms: u64 },
}

/// Radio and cadence options, fixed for the lifetime of a controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconSettings {
    #[serde(default = "default_interval_ms")]
    pub min_interval_ms: u16,
    #[serde(default = "default_interval_ms")]
    pub max_interval_ms: u16,
    #[serde(default)]
    pub channel_map: ChannelMap,
    #[serde(default)]
    pub power_level: PowerLevel,
    #[serde(default)]
    pub address_policy: AddressPolicy,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Pulse length after each start; `None` keeps the radio on between ticks
    #[serde(default = "default_broadcast_hold_ms")]
    pub broadcast_hold_ms: Option<u64>,
    #[serde(default = "default_false")]
    pub announce_base_on_fuzz_tick: bool,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_interval_ms(),
            max_interval_ms: default_interval_ms(),
            channel_map: ChannelMap::default(),
            power_level: PowerLevel::default(),
            address_policy: AddressPolicy::default(),
            tick_interval_ms: default_tick_interval_ms(),
            broadcast_hold_ms: default_broadcast_hold_ms(),
            announce_base_on_fuzz_tick: false,
        }
    }
}

fn default_interval_ms() -> u16 {
    20
}
fn default_tick_interval_ms() -> u64 {
    500
}
fn default_broadcast_hold_ms() -> Option<u64> {
    Some(30)
}

impl BeaconSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let range = MIN_ADV_INTERVAL_MS..=MAX_ADV_INTERVAL_MS;
        if !range.contains(&self.min_interval_ms)
            || !range.contains(&self.max_interval_ms)
            || self.min_interval_ms > self.max_interval_ms
        {
            return Err(SettingsError::InvalidInterval {
                min_ms: self.min_interval_ms,
                max_ms: self.max_interval_ms,
            });
        }

        if self.tick_interval_ms == 0 {
            return Err(SettingsError::ZeroTickInterval);
        }

        // A fuzz tick may pulse twice (base + mutated)
        if let Some(hold_ms) = self.broadcast_hold_ms {
            if hold_ms.saturating_mul(2) >= self.tick_interval_ms {
                return Err(SettingsError::HoldTooLong {
                    hold_ms,
                    tick_ms: self.tick_interval_ms,
                });
            }
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn broadcast_hold(&self) -> Option<Duration> {
        self.broadcast_hold_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub beacon: BeaconSettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    load_error: Option<String>,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load_from(settings_path))
    }

    /// Load from an explicit path, falling back to defaults
    ///
    /// A file that exists but cannot be used is kept as [`Self::load_error`]
    /// so it can be reported once logging is up.
    pub fn load_from(settings_path: PathBuf) -> Self {
        let (settings, load_error) = match Self::load_from_file(&settings_path) {
            Ok(settings) => (settings, None),
            Err(e) if settings_path.exists() => (Settings::default(), Some(e.to_string())),
            Err(_) => (Settings::default(), None),
        };

        Self {
            settings,
            settings_path,
            load_error,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("Axonapotamus");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
