//! Bluetooth Module
//!
//! Byte-stream link to the paired controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   UartInput    ┌──────────────┐   Transport   ┌────────┐
//! │  UartHandle  │ ─────────────▶ │  UartService │ ◀──────────── │ Device │
//! │  (central)   │ ◀───────────── │ (peripheral) │               │  loop  │
//! └──────────────┘    frames      └──────────────┘               └────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Transport trait and errors
//! - [`service`] - Channel-backed UART service

pub mod protocol;
pub mod service;

pub use protocol::{Transport, TransportError};
pub use service::{UartHandle, UartInput, UartService};
