//! Device aggregate and the per-tick step.
//!
//! One [`Device`] owns all mutable state of the logger. It is only ever
//! touched from the cooperative loop, so nothing here needs a lock.

use crate::domain::commands::CommandChannel;
use crate::domain::controller::RecordingController;
use crate::domain::models::{
    BufferFullPolicy, Command, LinkEvent, RecordingState, SampleRecord, Session, TelemetryStats,
};
use crate::domain::settings::DeviceConfig;
use crate::domain::telemetry::{FlushOutcome, TelemetryBatcher, TelemetryError};
use crate::infrastructure::bluetooth::Transport;
use crate::infrastructure::hardware::{Clock, Sensor};
use tracing::{info, warn};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub command: Option<Command>,
    pub sample: Option<SampleRecord>,
    pub flush: Option<FlushOutcome>,
    /// Early flush made by the buffer-full policy to fit this tick's sample
    pub forced_flush: Option<FlushOutcome>,
}

pub struct Device<T, S, C> {
    config: DeviceConfig,
    channel: CommandChannel,
    controller: RecordingController,
    batcher: TelemetryBatcher,
    transport: T,
    sensor: S,
    clock: C,
}

impl<T, S, C> Device<T, S, C>
where
    T: Transport,
    S: Sensor,
    C: Clock,
{
    pub fn new(config: DeviceConfig, transport: T, sensor: S, clock: C) -> Self {
        let now = clock.now_ms();
        Self {
            channel: CommandChannel::new(config.protocol),
            controller: RecordingController::new(config.session.clone()),
            batcher: TelemetryBatcher::new(config.frame_capacity, config.flush_interval_ms, now),
            config,
            transport,
            sensor,
            clock,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        self.controller.state()
    }

    pub fn session(&self) -> &Session {
        self.controller.session()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.batcher.stats()
    }

    /// Records buffered but not yet sent, with their delimiters
    pub fn buffered(&self) -> &[u8] {
        self.batcher.buffer().as_bytes()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run one iteration of the device loop
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        self.report_link_events();
        self.drain_input();

        if let Some(command) = self.channel.try_decode() {
            self.controller.apply(command.clone(), self.clock.now_ms());
            report.command = Some(command);
        }

        let now = self.clock.now_ms();
        let sensor = &mut self.sensor;
        if let Some(record) = self.controller.sample_if_recording(|| sensor.read(), now) {
            report.forced_flush = self.record(record, now);
            report.sample = Some(record);
        }

        let now = self.clock.now_ms();
        if !self.config.protocol.batches() || self.batcher.should_flush(now) {
            report.flush = Some(self.flush(now));
        }

        report
    }

    fn report_link_events(&mut self) {
        while let Some(event) = self.transport.poll_link_event() {
            match event {
                LinkEvent::Connected { peer_name } => info!("Connected to {}", peer_name),
                LinkEvent::Disconnected { reason } => {
                    info!("Disconnected, reason = 0x{:02X}", reason)
                }
            }
        }
    }

    fn drain_input(&mut self) {
        while self.transport.available() {
            let Some(byte) = self.transport.read_byte() else {
                break;
            };
            if let Err(e) = self.channel.feed(byte) {
                warn!("{}", e);
            }
        }
    }

    /// Append a record, applying the buffer-full policy when it does not fit.
    /// Returns the outcome of the early flush, if the policy made one.
    fn record(&mut self, record: SampleRecord, now: u64) -> Option<FlushOutcome> {
        let err = match self.batcher.append(&record) {
            Ok(()) => return None,
            Err(e) => e,
        };

        match (err, self.config.buffer_full_policy) {
            (TelemetryError::BufferFull { .. }, BufferFullPolicy::FlushAndRetry) => {
                warn!("Frame buffer full, flushing early");
                self.batcher.note_forced_flush();
                let outcome = self.flush(now);
                if let Err(e) = self.batcher.append(&record) {
                    warn!("Dropping sample {} after forced flush: {}", record, e);
                    self.batcher.note_dropped();
                }
                Some(outcome)
            }
            (e, _) => {
                warn!("Dropping sample {}: {}", record, e);
                self.batcher.note_dropped();
                None
            }
        }
    }

    fn flush(&mut self, now: u64) -> FlushOutcome {
        let transport = &mut self.transport;
        self.batcher.flush(now, |frame| transport.write(frame))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::domain::commands::MAX_COMMAND_LEN;
    use crate::domain::models::ProtocolVariant;

    type TestDevice = Device<RecordingTransport, ScriptedSensor, ManualClock>;

    fn device(config: DeviceConfig, readings: Vec<u32>) -> (TestDevice, ManualClock) {
        let clock = ManualClock::at(0);
        let device = Device::new(
            config,
            RecordingTransport::default(),
            ScriptedSensor::new(readings),
            clock.clone(),
        );
        (device, clock)
    }

    fn config(protocol: ProtocolVariant) -> DeviceConfig {
        DeviceConfig {
            protocol,
            tick_interval_ms: protocol.default_tick_ms(),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_stop_then_start_scenario() {
        let cfg = DeviceConfig {
            flush_interval_ms: 60_000,
            ..config(ProtocolVariant::Batched)
        };
        let (mut device, clock) = device(cfg, vec![42]);

        device.transport_mut().push(b"01");
        let report = device.tick();
        assert_eq!(report.command, Some(Command::Stop));
        assert_eq!(device.state(), RecordingState::Stopped);
        assert!(report.sample.is_none());
        assert!(device.buffered().is_empty());

        clock.set(1000);
        device.transport_mut().push(b"1");
        let report = device.tick();
        assert_eq!(report.command, Some(Command::Start));
        assert_eq!(device.state(), RecordingState::Recording);
        assert_eq!(device.session().elapsed_origin_ms, 1000);
        assert_eq!(report.sample.map(|r| r.elapsed_ms), Some(0));

        clock.set(1200);
        device.tick();
        assert_eq!(device.buffered(), b"1:0:42;1:200:42;");
    }

    #[test]
    fn test_extended_start_and_rename() {
        let (mut device, clock) = device(config(ProtocolVariant::Extended), vec![10, 11]);

        device.transport_mut().push(b"1:Hill repeats");
        device.tick();
        assert_eq!(device.session().activity_name, "Hill repeats");
        assert_eq!(device.state(), RecordingState::Stopped);

        clock.set(500);
        device.transport_mut().push(b"21");
        device.tick();
        assert_eq!(device.state(), RecordingState::Recording);

        clock.set(1000);
        device.tick();
        assert_eq!(device.transport().sent_text(), vec!["1:0:10", "1:500:11"]);
    }

    #[test]
    fn test_simple_sends_every_tick_without_delimiter() {
        let (mut device, clock) = device(config(ProtocolVariant::Simple), vec![3, 4, 5]);
        device.transport_mut().push(b"1");
        for _ in 0..3 {
            device.tick();
            clock.advance(500);
        }
        assert_eq!(
            device.transport().sent_text(),
            vec!["1:0:3", "1:500:4", "1:1000:5"]
        );
        assert!(device.buffered().is_empty());
    }

    #[test]
    fn test_simple_sends_nothing_while_stopped() {
        let (mut device, clock) = device(config(ProtocolVariant::Simple), vec![1]);
        for _ in 0..4 {
            device.tick();
            clock.advance(500);
        }
        assert!(device.transport().sent.is_empty());
        assert!(device.tick().sample.is_none());
    }

    #[test]
    fn test_batched_flushes_on_interval() {
        let (mut device, clock) = device(config(ProtocolVariant::Batched), (1..=7).collect());
        device.transport_mut().push(b"1");

        // Ticks at 0, 200, ..., 1000: a tie with the interval does not flush
        for _ in 0..6 {
            let report = device.tick();
            assert!(report.flush.is_none());
            clock.advance(200);
        }
        assert!(device.transport().sent.is_empty());

        // t = 1200 > 1000
        let report = device.tick();
        assert_eq!(report.flush, Some(FlushOutcome::Sent(55)));
        assert_eq!(
            device.transport().sent_text(),
            vec!["1:0:1;1:200:2;1:400:3;1:600:4;1:800:5;1:1000:6;1:1200:7"]
        );
        assert!(device.buffered().is_empty());
    }

    #[test]
    fn test_batched_empty_flush_advances_timer() {
        let (mut device, clock) = device(config(ProtocolVariant::Batched), vec![]);
        clock.set(1001);
        let report = device.tick();
        assert_eq!(report.flush, Some(FlushOutcome::Empty));
        assert!(device.transport().sent.is_empty());

        clock.set(1500);
        assert!(device.tick().flush.is_none());
    }

    #[test]
    fn test_restart_rearms_origin() {
        let (mut device, clock) = device(config(ProtocolVariant::Simple), vec![9]);
        device.transport_mut().push(b"1");
        device.tick();

        clock.set(3000);
        device.transport_mut().push(b"1");
        let report = device.tick();
        assert_eq!(device.session().elapsed_origin_ms, 3000);
        assert_eq!(report.sample.map(|r| r.elapsed_ms), Some(0));
    }

    #[test]
    fn test_unknown_command_leaves_state_alone() {
        let (mut device, clock) = device(config(ProtocolVariant::Batched), vec![1]);
        device.transport_mut().push(b"1");
        device.tick();

        clock.set(100);
        device.transport_mut().push(b"7");
        let report = device.tick();
        assert!(report.command.is_none());
        assert_eq!(device.state(), RecordingState::Recording);
        assert_eq!(device.session().elapsed_origin_ms, 0);
    }

    #[test]
    fn test_oversized_input_is_dropped() {
        let (mut device, _clock) = device(config(ProtocolVariant::Extended), vec![]);
        let mut burst = b"1:".to_vec();
        burst.resize(MAX_COMMAND_LEN * 2, b'x');
        device.transport_mut().push(&burst);

        let report = device.tick();
        assert!(report.command.is_none());
        assert!(device.transport().inbound.is_empty());
        assert_eq!(device.session().activity_name, "unnamed");

        device.transport_mut().push(b"2");
        assert_eq!(device.tick().command, Some(Command::Start));
    }

    #[test]
    fn test_buffer_full_flush_and_retry() {
        let cfg = DeviceConfig {
            frame_capacity: 48,
            flush_interval_ms: 60_000,
            buffer_full_policy: BufferFullPolicy::FlushAndRetry,
            ..config(ProtocolVariant::Batched)
        };
        let (mut device, clock) = device(cfg, vec![7]);
        device.transport_mut().push(b"1");

        clock.set(100);
        let mut reports = Vec::new();
        for _ in 0..7 {
            reports.push(device.tick());
            clock.advance(100);
        }

        // Six records fill 46 of 48 bytes; the seventh forces a flush
        assert!(reports[..6].iter().all(|r| r.forced_flush.is_none()));
        assert_eq!(reports[6].forced_flush, Some(FlushOutcome::Sent(45)));
        assert_eq!(reports[6].flush, None);
        assert_eq!(device.transport().sent.len(), 1);
        assert_eq!(
            device.transport().sent_text()[0],
            "1:0:7;1:100:7;1:200:7;1:300:7;1:400:7;1:500:7"
        );
        assert_eq!(device.buffered(), b"1:600:7;");
        assert_eq!(device.stats().forced_flushes, 1);
        assert_eq!(device.stats().samples_dropped, 0);
    }

    #[test]
    fn test_buffer_full_drop_sample() {
        let cfg = DeviceConfig {
            frame_capacity: 48,
            flush_interval_ms: 60_000,
            buffer_full_policy: BufferFullPolicy::DropSample,
            ..config(ProtocolVariant::Batched)
        };
        let (mut device, clock) = device(cfg, vec![7]);
        device.transport_mut().push(b"1");

        clock.set(100);
        let mut reports = Vec::new();
        for _ in 0..7 {
            reports.push(device.tick());
            clock.advance(100);
        }

        assert!(reports.iter().all(|r| r.forced_flush.is_none()));
        assert!(device.transport().sent.is_empty());
        assert_eq!(device.buffered().len(), 46);
        assert_eq!(device.stats().samples_dropped, 1);
        assert_eq!(device.stats().records_appended, 6);
    }

    #[test]
    fn test_send_failure_does_not_stall() {
        let (mut device, clock) = device(config(ProtocolVariant::Simple), vec![1, 2]);
        device.transport_mut().fail_writes = true;
        device.transport_mut().push(b"1");
        assert_eq!(device.tick().flush, Some(FlushOutcome::Failed));

        device.transport_mut().fail_writes = false;
        clock.advance(500);
        assert_eq!(device.tick().flush, Some(FlushOutcome::Sent(7)));
        assert_eq!(device.transport().sent_text(), vec!["1:500:2"]);
        assert_eq!(device.stats().send_failures, 1);
    }

    #[test]
    fn test_link_events_do_not_touch_state() {
        let (mut device, _clock) = device(config(ProtocolVariant::Batched), vec![]);
        device.transport_mut().events.push_back(LinkEvent::Connected {
            peer_name: "phone".to_string(),
        });
        device
            .transport_mut()
            .events
            .push_back(LinkEvent::Disconnected { reason: 0x13 });

        device.tick();
        assert!(device.transport().events.is_empty());
        assert_eq!(device.state(), RecordingState::Stopped);
    }
}
