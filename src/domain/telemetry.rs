//! Batched telemetry framing
//!
//! Samples are captured faster than they can be sent over the link, so
//! they are collected into a fixed-size frame buffer and sent together.
//!
//! ## Frame Format
//!
//! ```text
//! 1:0:512;1:200:530;1:400:548
//! │ │ │  │
//! │ │ │  └─ record delimiter (not sent after the last record)
//! │ │ └─ sensor value (unsigned decimal)
//! │ └─ elapsed ms since Start (unsigned decimal)
//! └─ metric type code (signed decimal)
//! ```

use crate::domain::models::{SampleRecord, TelemetryStats};
use heapless::String;
use std::fmt::{Display, Write};
use thiserror::Error;
use tracing::{debug, error, trace};

pub const RECORD_DELIMITER: u8 = b';';

/// Longest possible formatted record including its delimiter
const MAX_RECORD_LEN: usize = 48;

/// Default frame buffer size in bytes
pub const DEFAULT_FRAME_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("frame buffer full: record needs {needed} bytes, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },
    #[error("record does not fit the format buffer")]
    RecordTooLong,
}

/// Fixed-capacity byte region holding complete, delimited records
pub struct FrameBuffer {
    region: Box<[u8]>,
    cursor: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            region: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Everything written so far, including the trailing delimiter
    pub fn as_bytes(&self) -> &[u8] {
        &self.region[..self.cursor]
    }

    /// Payload as it goes on the wire: one trailing delimiter removed
    pub fn frame(&self) -> &[u8] {
        let bytes = self.as_bytes();
        match bytes.split_last() {
            Some((&RECORD_DELIMITER, rest)) => rest,
            _ => bytes,
        }
    }

    /// Write `bytes` entirely or not at all
    fn write(&mut self, bytes: &[u8]) -> Result<(), TelemetryError> {
        if bytes.len() > self.remaining() {
            return Err(TelemetryError::BufferFull {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.region[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    fn reset(&mut self) {
        self.region.fill(0);
        self.cursor = 0;
    }
}

/// Decides when the buffered frame is due
#[derive(Debug, Clone, Copy)]
pub struct FlushTimer {
    last_flush_ms: u64,
    interval_ms: u64,
}

impl FlushTimer {
    pub fn new(interval_ms: u64, now_ms: u64) -> Self {
        Self {
            last_flush_ms: now_ms,
            interval_ms,
        }
    }

    pub fn last_flush_ms(&self) -> u64 {
        self.last_flush_ms
    }

    /// Strictly greater than the interval; a tie does not flush
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_flush_ms) > self.interval_ms
    }

    fn reset(&mut self, now_ms: u64) {
        self.last_flush_ms = now_ms;
    }
}

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A frame of this many bytes was handed to the transport
    Sent(usize),
    /// Nothing was buffered
    Empty,
    /// The transport rejected the frame; it was dropped
    Failed,
}

/// Accumulates sample records and hands complete frames to the transport
pub struct TelemetryBatcher {
    buffer: FrameBuffer,
    timer: FlushTimer,
    stats: TelemetryStats,
}

impl TelemetryBatcher {
    pub fn new(capacity: usize, flush_interval_ms: u64, now_ms: u64) -> Self {
        Self {
            buffer: FrameBuffer::new(capacity),
            timer: FlushTimer::new(flush_interval_ms, now_ms),
            stats: TelemetryStats::default(),
        }
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn timer(&self) -> &FlushTimer {
        &self.timer
    }

    pub fn stats(&self) -> TelemetryStats {
        self.stats
    }

    /// Append `"<code>:<elapsed>:<value>;"` if it fits in the remaining space.
    ///
    /// On failure the buffer is left untouched.
    pub fn append(&mut self, record: &SampleRecord) -> Result<(), TelemetryError> {
        let formatted = format_record(record)?;
        self.buffer.write(formatted.as_bytes())?;
        self.stats.records_appended += 1;
        trace!("Buffered record {} ({} bytes left)", record, self.buffer.remaining());
        Ok(())
    }

    pub fn should_flush(&self, now_ms: u64) -> bool {
        self.timer.is_due(now_ms)
    }

    /// Send the buffered frame (if any) and reset the buffer and timer.
    ///
    /// The timer is advanced even when nothing was sent.
    pub fn flush<F, E>(&mut self, now_ms: u64, send: F) -> FlushOutcome
    where
        F: FnOnce(&[u8]) -> Result<(), E>,
        E: Display,
    {
        let outcome = if self.buffer.is_empty() {
            FlushOutcome::Empty
        } else {
            let frame = self.buffer.frame();
            let len = frame.len();
            match send(frame) {
                Ok(()) => {
                    self.stats.frames_sent += 1;
                    debug!("Sent frame ({} bytes)", len);
                    FlushOutcome::Sent(len)
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    error!("Failed to send frame ({} bytes dropped): {}", len, e);
                    FlushOutcome::Failed
                }
            }
        };

        self.buffer.reset();
        self.timer.reset(now_ms);
        outcome
    }

    pub(crate) fn note_dropped(&mut self) {
        self.stats.samples_dropped += 1;
    }

    pub(crate) fn note_forced_flush(&mut self) {
        self.stats.forced_flushes += 1;
    }
}

fn format_record(record: &SampleRecord) -> Result<String<MAX_RECORD_LEN>, TelemetryError> {
    let mut out = String::new();
    write!(out, "{}{}", record, RECORD_DELIMITER as char)
        .map_err(|_| TelemetryError::RecordTooLong)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn record(elapsed_ms: u64, sensor_value: u32) -> SampleRecord {
        SampleRecord {
            metric_type_code: 1,
            elapsed_ms,
            sensor_value,
        }
    }

    fn flush_to_vec(batcher: &mut TelemetryBatcher, now_ms: u64) -> (FlushOutcome, Vec<Vec<u8>>) {
        let mut sent = Vec::new();
        let outcome = batcher.flush(now_ms, |frame| {
            sent.push(frame.to_vec());
            Ok::<(), Infallible>(())
        });
        (outcome, sent)
    }

    #[test]
    fn test_append_formats_record() {
        let mut batcher = TelemetryBatcher::new(64, 1000, 0);
        batcher.append(&record(200, 42)).unwrap();
        assert_eq!(batcher.buffer().as_bytes(), b"1:200:42;");
        assert_eq!(batcher.buffer().len() + batcher.buffer().remaining(), 64);
    }

    #[test]
    fn test_flush_strips_final_delimiter() {
        let mut batcher = TelemetryBatcher::new(DEFAULT_FRAME_CAPACITY, 1000, 0);
        batcher.append(&record(0, 5)).unwrap();
        batcher.append(&record(200, 7)).unwrap();

        let (outcome, sent) = flush_to_vec(&mut batcher, 1001);
        assert_eq!(sent, vec![b"1:0:5;1:200:7".to_vec()]);
        assert_eq!(outcome, FlushOutcome::Sent(13));
        assert!(batcher.buffer().is_empty());
        assert_eq!(batcher.buffer().remaining(), DEFAULT_FRAME_CAPACITY);
        assert_eq!(batcher.timer().last_flush_ms(), 1001);
        assert_eq!(batcher.stats().frames_sent, 1);
    }

    #[test]
    fn test_flush_empty_sends_nothing_but_advances_timer() {
        let mut batcher = TelemetryBatcher::new(64, 1000, 0);
        let (outcome, sent) = flush_to_vec(&mut batcher, 1500);
        assert_eq!(outcome, FlushOutcome::Empty);
        assert!(sent.is_empty());
        assert_eq!(batcher.timer().last_flush_ms(), 1500);
        assert!(!batcher.should_flush(2500));
        assert!(batcher.should_flush(2501));
    }

    #[test]
    fn test_should_flush_is_strict() {
        let batcher = TelemetryBatcher::new(64, 1000, 0);
        assert!(!batcher.should_flush(999));
        assert!(!batcher.should_flush(1000));
        assert!(batcher.should_flush(1001));
    }

    #[test]
    fn test_full_buffer_rejects_without_partial_write() {
        // "1:200:42;" is 9 bytes
        let mut batcher = TelemetryBatcher::new(20, 1000, 0);
        batcher.append(&record(200, 42)).unwrap();
        batcher.append(&record(200, 42)).unwrap();
        let before = batcher.buffer().as_bytes().to_vec();

        let err = batcher.append(&record(200, 42)).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::BufferFull {
                needed: 9,
                remaining: 2
            }
        );
        assert_eq!(batcher.buffer().as_bytes(), before.as_slice());
        assert_eq!(batcher.buffer().len(), 18);
        assert_eq!(batcher.stats().records_appended, 2);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let capacity = 100;
        let mut batcher = TelemetryBatcher::new(capacity, 1000, 0);
        for i in 0..50u64 {
            let _ = batcher.append(&record(i * 200, (i * 37) as u32));
            let buffer = batcher.buffer();
            assert!(buffer.len() <= capacity);
            assert_eq!(buffer.len() + buffer.remaining(), capacity);
            // Only whole records are ever buffered
            assert_eq!(buffer.as_bytes().last().copied(), Some(RECORD_DELIMITER));
            for part in buffer.frame().split(|b| *b == RECORD_DELIMITER) {
                let text = std::str::from_utf8(part).unwrap();
                assert_eq!(text.split(':').count(), 3, "bad record {text:?}");
            }
        }
    }

    #[test]
    fn test_send_failure_drops_frame() {
        let mut batcher = TelemetryBatcher::new(64, 1000, 0);
        batcher.append(&record(0, 1)).unwrap();
        let outcome = batcher.flush(1001, |_| Err("link down"));
        assert_eq!(outcome, FlushOutcome::Failed);
        assert!(batcher.buffer().is_empty());
        assert_eq!(batcher.timer().last_flush_ms(), 1001);
        assert_eq!(batcher.stats().send_failures, 1);
    }

    #[test]
    fn test_reset_zeroes_region() {
        let mut batcher = TelemetryBatcher::new(32, 1000, 0);
        batcher.append(&record(1, 1)).unwrap();
        let _ = flush_to_vec(&mut batcher, 2000);
        assert!(batcher.buffer().region.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_same_inputs_produce_identical_frames() {
        let readings = [(0, 512), (200, 530), (400, 548), (600, 561)];
        let run = || {
            let mut batcher = TelemetryBatcher::new(DEFAULT_FRAME_CAPACITY, 1000, 0);
            for (elapsed, value) in readings {
                batcher.append(&record(elapsed, value)).unwrap();
            }
            flush_to_vec(&mut batcher, 1001).1
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(first, vec![b"1:0:512;1:200:530;1:400:548;1:600:561".to_vec()]);
    }

    #[test]
    fn test_extreme_values_fit_format_buffer() {
        let mut batcher = TelemetryBatcher::new(DEFAULT_FRAME_CAPACITY, 1000, 0);
        let extreme = SampleRecord {
            metric_type_code: i32::MIN,
            elapsed_ms: u64::MAX,
            sensor_value: u32::MAX,
        };
        batcher.append(&extreme).unwrap();
        assert_eq!(
            batcher.buffer().as_bytes(),
            b"-2147483648:18446744073709551615:4294967295;"
        );
    }
}
