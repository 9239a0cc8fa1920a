use crate::domain::models::{Command, RecordingState, SampleRecord, Session};
use tracing::info;

/// Recording state machine.
///
/// Owns the recording state and the session metadata. Both states are
/// reachable from each other indefinitely.
pub struct RecordingController {
    state: RecordingState,
    session: Session,
}

impl RecordingController {
    pub fn new(session: Session) -> Self {
        Self {
            state: RecordingState::Stopped,
            session,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Apply one decoded command
    pub fn apply(&mut self, command: Command, now_ms: u64) {
        match command {
            Command::Stop => {
                if self.is_recording() {
                    info!("Received STOP_RECORDING command");
                }
                self.state = RecordingState::Stopped;
            }
            Command::Start => {
                // Re-arms the elapsed origin even when already recording
                info!(
                    "Received START_RECORDING command (activity: {})",
                    self.session.activity_name
                );
                self.state = RecordingState::Recording;
                self.session.elapsed_origin_ms = now_ms;
            }
            Command::Rename(name) => {
                // Stored as received, an empty name included
                info!("Activity renamed to {:?}", name);
                self.session.activity_name = name;
            }
        }
    }

    /// Take a sample when recording.
    ///
    /// `read_sensor` is only invoked in the recording state.
    pub fn sample_if_recording<F>(&self, read_sensor: F, now_ms: u64) -> Option<SampleRecord>
    where
        F: FnOnce() -> u32,
    {
        if !self.is_recording() {
            return None;
        }

        Some(SampleRecord {
            metric_type_code: self.session.metric_type_code,
            elapsed_ms: now_ms.saturating_sub(self.session.elapsed_origin_ms),
            sensor_value: read_sensor(),
        })
    }
}
