use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded controller command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stop recording
    Stop,
    /// Start (or re-arm) recording
    Start,
    /// Set the activity name of the current session
    Rename(String),
}

/// Wire protocol spoken with the paired controller.
///
/// The three variants are not wire-compatible; exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// `0=Stop, 1=Start`, one record sent per tick
    Simple,
    /// `0=Stop, 1=Start`, records batched and flushed on an interval
    #[default]
    Batched,
    /// `0=Stop, 1=Name, 2=Start`, one record sent per tick
    Extended,
}

impl ProtocolVariant {
    /// Map an action code to a command for this variant.
    ///
    /// `payload` is only consumed by `Rename`.
    pub fn command_for(&self, code: u8, payload: &str) -> Option<Command> {
        match (self, code) {
            (_, 0) => Some(Command::Stop),
            (Self::Simple | Self::Batched, 1) => Some(Command::Start),
            (Self::Extended, 1) => Some(Command::Rename(payload.to_string())),
            (Self::Extended, 2) => Some(Command::Start),
            _ => None,
        }
    }

    /// Whether records are accumulated and flushed on the flush timer
    pub fn batches(&self) -> bool {
        matches!(self, Self::Batched)
    }

    /// Default tick duration in milliseconds
    pub fn default_tick_ms(&self) -> u64 {
        match self {
            Self::Batched => 200,
            Self::Simple | Self::Extended => 500,
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "simple",
            Self::Batched => "batched",
            Self::Extended => "extended",
        };
        f.write_str(name)
    }
}

/// What to do when a record does not fit in the frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferFullPolicy {
    /// Discard the sample and keep going
    DropSample,
    /// Send what is buffered now, then retry the append once
    #[default]
    FlushAndRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Stopped,
    Recording,
}

/// Metadata of the activity being recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub activity_name: String,
    pub metric_type_code: i32,
    /// Clock reading when the last `Start` was applied
    pub elapsed_origin_ms: u64,
}

pub const DEFAULT_ACTIVITY_NAME: &str = "unnamed";

/// Metric type code of the linear Hall sensor
pub const HALL_METRIC_TYPE_CODE: i32 = 1;

impl Default for Session {
    fn default() -> Self {
        Self {
            activity_name: DEFAULT_ACTIVITY_NAME.to_string(),
            metric_type_code: HALL_METRIC_TYPE_CODE,
            elapsed_origin_ms: 0,
        }
    }
}

/// One sensor reading, timestamped relative to the session origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord {
    pub metric_type_code: i32,
    pub elapsed_ms: u64,
    pub sensor_value: u32,
}

impl fmt::Display for SampleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.metric_type_code, self.elapsed_ms, self.sensor_value
        )
    }
}

/// Link state change reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { peer_name: String },
    /// `reason` is the HCI status code of the disconnect
    Disconnected { reason: u8 },
}

/// Running counters kept by the telemetry path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub records_appended: u64,
    pub frames_sent: u64,
    pub samples_dropped: u64,
    pub forced_flushes: u64,
    pub send_failures: u64,
}
