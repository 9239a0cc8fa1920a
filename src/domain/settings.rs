use crate::domain::models::{
    BufferFullPolicy, ProtocolVariant, Session, DEFAULT_ACTIVITY_NAME, HALL_METRIC_TYPE_CODE,
};
use crate::domain::telemetry::DEFAULT_FRAME_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Smallest frame buffer that can hold one worst-case record
pub const MIN_FRAME_CAPACITY: usize = 48;

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
    "hall_logger".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Range and slope of the simulated Hall sensor used by the host build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSensorSettings {
    #[serde(default = "default_sensor_min")]
    pub min: u32,
    #[serde(default = "default_sensor_max")]
    pub max: u32,
    #[serde(default = "default_sensor_step")]
    pub step: u32,
}

impl Default for SimulatedSensorSettings {
    fn default() -> Self {
        Self {
            min: default_sensor_min(),
            max: default_sensor_max(),
            step: default_sensor_step(),
        }
    }
}

fn default_sensor_min() -> u32 {
    0
}
fn default_sensor_max() -> u32 {
    1023 // 10-bit ADC
}
fn default_sensor_step() -> u32 {
    17
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub protocol: ProtocolVariant,
    /// Overrides the protocol's default tick when set
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,
    #[serde(default = "default_metric_type_code")]
    pub metric_type_code: i32,
    #[serde(default = "default_activity_name")]
    pub default_activity_name: String,
    #[serde(default)]
    pub buffer_full_policy: BufferFullPolicy,
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default)]
    pub simulated_sensor: SimulatedSensorSettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: ProtocolVariant::default(),
            tick_interval_ms: None,
            flush_interval_ms: default_flush_interval_ms(),
            frame_capacity: default_frame_capacity(),
            metric_type_code: default_metric_type_code(),
            default_activity_name: default_activity_name(),
            buffer_full_policy: BufferFullPolicy::default(),
            device_name: default_device_name(),
            simulated_sensor: SimulatedSensorSettings::default(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_frame_capacity() -> usize {
    DEFAULT_FRAME_CAPACITY
}
fn default_metric_type_code() -> i32 {
    HALL_METRIC_TYPE_CODE
}
fn default_activity_name() -> String {
    DEFAULT_ACTIVITY_NAME.to_string()
}
fn default_device_name() -> String {
    "Steering".to_string()
}

/// Runtime parameters of the device loop, derived from [`Settings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub protocol: ProtocolVariant,
    pub tick_interval_ms: u64,
    pub flush_interval_ms: u64,
    pub frame_capacity: usize,
    pub buffer_full_policy: BufferFullPolicy,
    pub session: Session,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let protocol = ProtocolVariant::default();
        Self {
            protocol,
            tick_interval_ms: protocol.default_tick_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            frame_capacity: default_frame_capacity(),
            buffer_full_policy: BufferFullPolicy::default(),
            session: Session::default(),
        }
    }
}

impl Settings {
    /// Validate and derive the device configuration
    pub fn device_config(&self) -> anyhow::Result<DeviceConfig> {
        if self.frame_capacity < MIN_FRAME_CAPACITY {
            anyhow::bail!(
                "frame_capacity {} is too small, need at least {} bytes",
                self.frame_capacity,
                MIN_FRAME_CAPACITY
            );
        }
        let tick_interval_ms = self
            .tick_interval_ms
            .unwrap_or_else(|| self.protocol.default_tick_ms());
        if tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than zero");
        }
        if self.simulated_sensor.min > self.simulated_sensor.max {
            anyhow::bail!(
                "simulated_sensor.min ({}) exceeds max ({})",
                self.simulated_sensor.min,
                self.simulated_sensor.max
            );
        }

        Ok(DeviceConfig {
            protocol: self.protocol,
            tick_interval_ms,
            flush_interval_ms: self.flush_interval_ms,
            frame_capacity: self.frame_capacity,
            buffer_full_policy: self.buffer_full_policy,
            session: Session {
                activity_name: self.default_activity_name.clone(),
                metric_type_code: self.metric_type_code,
                elapsed_origin_ms: 0,
            },
        })
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    created: bool,
}

impl SettingsService {
    /// Load from the per-user config directory, writing defaults on first run
    pub fn new() -> anyhow::Result<Self> {
        Self::load_or_create(Self::get_settings_path()?)
    }

    /// Load `path`, or write the defaults there if it does not exist yet.
    ///
    /// An existing but unreadable file falls back to defaults and is left
    /// untouched so a hand edit is never overwritten.
    pub fn load_or_create(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = path.into();
        if settings_path.exists() {
            let settings = Self::load_from_file(&settings_path).unwrap_or_default();
            return Ok(Self {
                settings,
                settings_path,
                created: false,
            });
        }

        let service = Self {
            settings: Settings::default(),
            settings_path,
            created: true,
        };
        service.save().map_err(|e| {
            anyhow::anyhow!(
                "Could not write default settings to {}: {}",
                service.settings_path.display(),
                e
            )
        })?;
        Ok(service)
    }

    /// Load from an explicit file; a missing or invalid file is an error
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = path.into();
        let settings = Self::load_from_file(&settings_path).map_err(|e| {
            anyhow::anyhow!("Could not load settings from {}: {}", settings_path.display(), e)
        })?;

        Ok(Self {
            settings,
            settings_path,
            created: false,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("HallLogger");
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

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Whether this load wrote a fresh default file
    pub fn created(&self) -> bool {
        self.created
    }
}
