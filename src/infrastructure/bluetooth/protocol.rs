//! Transport boundary
//!
//! The BLE UART link is treated as an opaque bidirectional byte stream.
//! Advertising, pairing and service discovery happen below this trait; the
//! device only sees bytes and link up/down notifications.

use crate::domain::models::LinkEvent;
use thiserror::Error;

/// HCI status code: remote user terminated connection
pub const HCI_REMOTE_USER_TERMINATED: u8 = 0x13;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no central connected")]
    NotConnected,
    #[error("transport closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bidirectional byte stream to the paired controller
pub trait Transport {
    /// Whether at least one inbound byte can be read without waiting
    fn available(&mut self) -> bool;

    /// Next inbound byte, if any
    fn read_byte(&mut self) -> Option<u8>;

    /// Send one complete message
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Next pending connection change, if any
    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        None
    }
}
