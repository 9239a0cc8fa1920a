//! Sensor and clock abstractions

use crate::domain::settings::SimulatedSensorSettings;
use std::time::Instant;

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin (power-on)
    fn now_ms(&self) -> u64;
}

/// Analog sensor sampled once per tick
pub trait Sensor {
    /// Raw ADC reading
    fn read(&mut self) -> u32;
}

/// Clock backed by `Instant`, starting at zero when created
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Linear Hall sensor stand-in producing a triangle wave.
///
/// Emulates a magnet sweeping toward and away from the sensor.
pub struct SimulatedHallSensor {
    min: u32,
    max: u32,
    step: u32,
    value: u32,
    rising: bool,
}

impl SimulatedHallSensor {
    pub fn new(settings: &SimulatedSensorSettings) -> Self {
        let (min, max) = (settings.min, settings.max.max(settings.min));
        Self {
            min,
            max,
            step: settings.step.max(1),
            value: min + (max - min) / 2,
            rising: true,
        }
    }
}

impl Sensor for SimulatedHallSensor {
    fn read(&mut self) -> u32 {
        let current = self.value;

        if self.rising {
            let next = self.value.saturating_add(self.step);
            if next >= self.max {
                self.value = self.max;
                self.rising = false;
            } else {
                self.value = next;
            }
        } else {
            let next = self.value.saturating_sub(self.step);
            if next <= self.min {
                self.value = self.min;
                self.rising = true;
            } else {
                self.value = next;
            }
        }

        current
    }
}
