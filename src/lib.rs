//! Hall sensor data logger
//!
//! A peripheral that samples a linear Hall effect sensor while a paired
//! controller has recording switched on, and streams the samples back as
//! `code:elapsed:value` records.
//!
//! # Example
//! ```no_run
//! use hall_logger::{app, device::Device};
//! use hall_logger::domain::settings::Settings;
//! use hall_logger::infrastructure::bluetooth::UartService;
//! use hall_logger::infrastructure::hardware::{SimulatedHallSensor, SystemClock};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let (uart, _central) = UartService::new();
//!     let mut device = Device::new(
//!         settings.device_config()?,
//!         uart,
//!         SimulatedHallSensor::new(&settings.simulated_sensor),
//!         SystemClock::new(),
//!     );
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     app::run(&mut device, shutdown).await;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod device;
pub mod domain;
pub mod infrastructure;
